use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::render::{
    Buffer, MeshBuffer, PipelineKey, RenderCtx, ShaderProgram, Vertex, MVP_UNIFORM_SIZE,
};

use super::Renderer;

/// Per-mesh `u_mvp` storage.
struct MvpUniform {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// A drawable: vertex buffers, a shader program and a local transform.
///
/// The local transform is `T(position) * R(rotation) * S(scale) * T(origin)`;
/// `origin` shifts the geometry before scaling and rotation, so it acts as the
/// pivot. Setters only flag the transform; it is rebuilt on the next render.
pub struct Mesh {
    transform: Mat4,
    origin: Vec3,
    position: Vec3,
    scale: Vec3,
    rotation: Quat,

    visible: bool,
    transform_dirty: bool,
    shader_dirty: bool,
    delete: bool,

    buffers: Vec<Box<dyn MeshBuffer>>,
    shader: Option<Arc<ShaderProgram>>,
    uniform: Option<MvpUniform>,

    /// Pipelines resolved by the last `prepare`, parallel to `buffers`.
    frame_pipelines: Vec<Option<wgpu::RenderPipeline>>,
    warned_pipeline: bool,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            origin: Vec3::ZERO,
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            visible: true,
            transform_dirty: true,
            shader_dirty: true,
            delete: false,
            buffers: Vec::new(),
            shader: None,
            uniform: None,
            frame_pipelines: Vec::new(),
            warned_pipeline: false,
        }
    }
}

impl Mesh {
    /// Creates a mesh with one empty buffer of vertex type `V`.
    pub fn new<V: Vertex>() -> Self {
        Self::with_buffer(Buffer::<V>::new())
    }

    /// Creates a mesh around an existing buffer.
    pub fn with_buffer<V: Vertex>(buffer: Buffer<V>) -> Self {
        let mut mesh = Self::default();
        mesh.push_buffer(buffer);
        mesh
    }

    pub fn push_buffer<V: Vertex>(&mut self, buffer: Buffer<V>) {
        self.buffers.push(Box::new(buffer));
    }

    /// The last buffer, if it holds vertices of type `V`.
    pub fn buffer<V: Vertex>(&self) -> Option<&Buffer<V>> {
        self.buffers.last()?.as_any().downcast_ref()
    }

    /// The last buffer, if it holds vertices of type `V`.
    pub fn buffer_mut<V: Vertex>(&mut self) -> Option<&mut Buffer<V>> {
        self.buffers.last_mut()?.as_any_mut().downcast_mut()
    }

    /// All buffers holding vertices of type `V`, in draw order.
    pub fn buffers<V: Vertex>(&self) -> impl Iterator<Item = &Buffer<V>> {
        self.buffers.iter().filter_map(|b| b.as_any().downcast_ref())
    }

    pub fn buffers_mut<V: Vertex>(&mut self) -> impl Iterator<Item = &mut Buffer<V>> {
        self.buffers
            .iter_mut()
            .filter_map(|b| b.as_any_mut().downcast_mut())
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total vertices across all buffers.
    pub fn vertex_count(&self) -> usize {
        self.buffers.iter().map(|b| b.len()).sum()
    }

    /// Appends a vertex to the last buffer.
    ///
    /// A new buffer with the same primitive and storage hint is started once
    /// the last one holds [`Renderer::MAX_BUFFER_SIZE`] vertices (rounded down
    /// to whole primitives). Strip buffers are never split.
    pub fn add_vertex<V: Vertex>(&mut self, vertex: V) {
        let next = match self.buffer::<V>() {
            None => Some(Buffer::<V>::new()),
            Some(last) => match last.primitive().chunk_len(Renderer::MAX_BUFFER_SIZE) {
                Some(limit) if last.len() >= limit => {
                    let mut b = Buffer::<V>::with_primitive(last.primitive());
                    b.set_storage_hint(last.storage_hint());
                    Some(b)
                }
                _ => None,
            },
        };
        if let Some(b) = next {
            self.push_buffer(b);
        }
        if let Some(b) = self.buffer_mut::<V>() {
            b.add_vertex(vertex);
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.transform_dirty = true;
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.transform_dirty = true;
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.transform_dirty = true;
    }

    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
        self.transform_dirty = true;
    }

    #[inline]
    pub fn is_transform_dirty(&self) -> bool {
        self.transform_dirty
    }

    /// Recomputes the local transform from position, rotation, scale and origin.
    pub fn build_transform(&mut self) {
        self.transform = Mat4::from_translation(self.position)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scale)
            * Mat4::from_translation(self.origin);
        self.transform_dirty = false;
    }

    /// Local transform, rebuilt first if any component changed.
    pub fn transform(&mut self) -> Mat4 {
        if self.transform_dirty {
            self.build_transform();
        }
        self.transform
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Flags the mesh for removal; the renderer frees it on its next pass.
    pub fn mark_for_deletion(&mut self) {
        self.delete = true;
    }

    #[inline]
    pub fn is_marked_for_deletion(&self) -> bool {
        self.delete
    }

    #[inline]
    pub fn shader_program(&self) -> Option<&Arc<ShaderProgram>> {
        self.shader.as_ref()
    }

    pub fn set_shader_program(&mut self, program: Arc<ShaderProgram>) {
        self.shader = Some(program);
        self.shader_dirty = true;
        self.warned_pipeline = false;
    }

    /// Resolves `u_mvp` in the current program and creates this mesh's uniform for it.
    ///
    /// Programs without `u_mvp` leave the mesh without a uniform; the transform is
    /// then simply not uploaded.
    pub fn update_shader_locations(&mut self, device: &wgpu::Device) {
        if let Some(old) = self.uniform.take() {
            old.buffer.destroy();
        }
        self.shader_dirty = false;

        let Some(shader) = self.shader.as_ref() else { return };
        let (Some(binding), Some(layout)) = (shader.mvp_binding(), shader.bind_group_layout()) else {
            log::debug!("program `{}` has no u_mvp; mesh transform unused", shader.label());
            return;
        };

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trellis mesh mvp ubo"),
            size: MVP_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trellis mesh mvp bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            }],
        });

        self.uniform = Some(MvpUniform { buffer, bind_group });
    }

    /// Brings GPU state up to date for drawing with `global` as the parent transform.
    ///
    /// Returns `true` if at least one buffer is ready to draw.
    pub fn prepare(&mut self, ctx: &RenderCtx<'_>, global: Mat4) -> bool {
        self.frame_pipelines.clear();

        if !self.visible {
            return false;
        }
        let Some(shader) = self.shader.clone() else { return false };

        if self.transform_dirty {
            self.build_transform();
        }
        if self.shader_dirty {
            self.update_shader_locations(ctx.device);
        }

        if let Some(uniform) = self.uniform.as_ref() {
            let mvp = global * self.transform;
            ctx.queue
                .write_buffer(&uniform.buffer, 0, bytemuck::cast_slice(&mvp.to_cols_array()));
        }

        for buffer in self.buffers.iter_mut() {
            if !buffer.prepare(ctx.device, ctx.queue) || buffer.is_empty() {
                self.frame_pipelines.push(None);
                continue;
            }

            let key = PipelineKey {
                color_format: ctx.surface_format,
                depth_format: ctx.depth_format,
                topology: buffer.primitive().topology(),
                vertex_type: buffer.vertex_type(),
            };

            match shader.pipeline(ctx.device, key, buffer.vertex_layout()) {
                Ok(pipeline) => self.frame_pipelines.push(Some(pipeline)),
                Err(err) => {
                    if !self.warned_pipeline {
                        log::error!("mesh skipped, program `{}`: {err}", shader.label());
                        self.warned_pipeline = true;
                    }
                    self.frame_pipelines.push(None);
                }
            }
        }

        self.frame_pipelines.iter().any(Option::is_some)
    }

    /// Records draw calls for the buffers resolved by the last [`prepare`](Self::prepare).
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        for (buffer, pipeline) in self.buffers.iter().zip(&self.frame_pipelines) {
            let Some(pipeline) = pipeline else { continue };
            pass.set_pipeline(pipeline);
            if let Some(uniform) = self.uniform.as_ref() {
                pass.set_bind_group(0, &uniform.bind_group, &[]);
            }
            buffer.draw(pass);
        }
    }

    /// Releases every GPU resource held by the mesh. CPU data is kept.
    pub fn free_gpu_resources(&mut self) {
        for buffer in self.buffers.iter_mut() {
            buffer.destroy();
        }
        if let Some(uniform) = self.uniform.take() {
            uniform.buffer.destroy();
        }
        self.frame_pipelines.clear();
        self.shader_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{noop_device, COLOR_FORMAT, DEPTH_FORMAT};
    use crate::render::{Primitive, VertexData};

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    fn v(x: f32) -> VertexData {
        VertexData::new([x, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0; 4])
    }

    #[test]
    fn default_transform_is_identity() {
        let mut m = Mesh::new::<VertexData>();
        assert!(m.is_transform_dirty());
        assert_eq!(m.transform(), Mat4::IDENTITY);
        assert!(!m.is_transform_dirty());
    }

    #[test]
    fn setters_flag_transform() {
        let mut m = Mesh::new::<VertexData>();
        m.build_transform();

        m.set_position(Vec3::X);
        assert!(m.is_transform_dirty());
        m.build_transform();

        m.set_scale(Vec3::splat(2.0));
        assert!(m.is_transform_dirty());
        m.build_transform();

        m.set_rotation(Quat::from_rotation_z(1.0));
        assert!(m.is_transform_dirty());
        m.build_transform();

        m.set_origin(Vec3::Y);
        assert!(m.is_transform_dirty());
    }

    #[test]
    fn transform_composes_translate_rotate_scale_origin() {
        let mut m = Mesh::new::<VertexData>();
        let p = Vec3::new(1.0, 2.0, 3.0);
        let q = Quat::from_rotation_y(0.7);
        let s = Vec3::new(2.0, 3.0, 4.0);
        let o = Vec3::new(-0.5, 0.0, 0.25);
        m.set_position(p);
        m.set_rotation(q);
        m.set_scale(s);
        m.set_origin(o);

        let expected = Mat4::from_translation(p)
            * Mat4::from_quat(q)
            * Mat4::from_scale(s)
            * Mat4::from_translation(o);
        assert!(approx(m.transform(), expected));
    }

    #[test]
    fn origin_is_applied_before_scale() {
        let mut m = Mesh::new::<VertexData>();
        m.set_scale(Vec3::splat(2.0));
        m.set_origin(Vec3::new(1.0, 0.0, 0.0));
        m.set_position(Vec3::new(0.0, 5.0, 0.0));

        let p = m.transform().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(2.0, 5.0, 0.0), 1e-6));
    }

    #[test]
    fn rotation_turns_about_the_position() {
        let mut m = Mesh::new::<VertexData>();
        m.set_position(Vec3::new(10.0, 0.0, 0.0));
        m.set_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));

        let p = m.transform().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(10.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn typed_buffer_access() {
        let mut m = Mesh::new::<VertexData>();
        m.buffer_mut::<VertexData>().unwrap().add_vertex(v(1.0));
        assert_eq!(m.buffer::<VertexData>().unwrap().len(), 1);
        assert_eq!(m.buffers::<VertexData>().count(), 1);
        assert_eq!(m.vertex_count(), 1);
    }

    #[test]
    fn add_vertex_on_empty_mesh_creates_buffer() {
        let mut m = Mesh::default();
        assert_eq!(m.buffer_count(), 0);
        m.add_vertex(v(0.0));
        assert_eq!(m.buffer_count(), 1);
        assert!(m.buffer::<VertexData>().unwrap().is_dirty());
    }

    #[test]
    fn add_vertex_starts_new_buffer_when_full() {
        let mut m = Mesh::with_buffer(Buffer::<VertexData>::with_primitive(Primitive::Lines));
        let limit = Primitive::Lines
            .chunk_len(Renderer::MAX_BUFFER_SIZE)
            .unwrap();
        m.buffer_mut::<VertexData>()
            .unwrap()
            .data_mut()
            .resize(limit, v(0.0));

        m.add_vertex(v(1.0));

        assert_eq!(m.buffer_count(), 2);
        let last = m.buffer::<VertexData>().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last.primitive(), Primitive::Lines);
        assert_eq!(m.vertex_count(), limit + 1);
    }

    #[test]
    fn strip_buffers_are_not_split() {
        let mut m = Mesh::with_buffer(Buffer::<VertexData>::with_primitive(Primitive::TriangleStrip));
        m.buffer_mut::<VertexData>()
            .unwrap()
            .data_mut()
            .resize(Renderer::MAX_BUFFER_SIZE, v(0.0));
        m.add_vertex(v(1.0));
        assert_eq!(m.buffer_count(), 1);
    }

    #[test]
    fn free_gpu_resources_keeps_cpu_data() {
        let mut m = Mesh::new::<VertexData>();
        m.add_vertex(v(0.0));
        m.free_gpu_resources();
        assert_eq!(m.vertex_count(), 1);
        assert!(m.buffer::<VertexData>().unwrap().is_dirty());
    }

    #[test]
    fn deletion_flag() {
        let mut m = Mesh::new::<VertexData>();
        assert!(!m.is_marked_for_deletion());
        m.mark_for_deletion();
        assert!(m.is_marked_for_deletion());
    }

    fn triangle() -> Mesh {
        Mesh::with_buffer(Buffer::from_vertices(
            Primitive::Triangles,
            vec![v(0.0), v(1.0), v(2.0)],
        ))
    }

    #[test]
    fn prepare_uploads_buffers_and_mvp() {
        let (device, queue) = noop_device();
        let ctx = RenderCtx::new(&device, &queue, COLOR_FORMAT, Some(DEPTH_FORMAT));
        let mut m = triangle();
        m.set_shader_program(Arc::new(ShaderProgram::basic(&device).unwrap()));

        assert!(m.prepare(&ctx, Mat4::IDENTITY));
        assert!(m.uniform.is_some());
        assert!(!m.is_transform_dirty());
        let buffer = m.buffer::<VertexData>().unwrap();
        assert!(buffer.is_generated());
        assert!(!buffer.is_dirty());

        m.free_gpu_resources();
        assert!(m.uniform.is_none());
        assert!(!m.buffer::<VertexData>().unwrap().is_generated());
    }

    #[test]
    fn hidden_or_unshaded_meshes_are_not_prepared() {
        let (device, queue) = noop_device();
        let ctx = RenderCtx::new(&device, &queue, COLOR_FORMAT, None);

        let mut unshaded = triangle();
        assert!(!unshaded.prepare(&ctx, Mat4::IDENTITY));
        assert!(!unshaded.buffer::<VertexData>().unwrap().is_generated());

        let mut hidden = triangle();
        hidden.set_shader_program(Arc::new(ShaderProgram::basic(&device).unwrap()));
        hidden.set_visible(false);
        assert!(!hidden.prepare(&ctx, Mat4::IDENTITY));
    }

    #[test]
    fn incompatible_program_skips_mesh() {
        let src = r#"
@vertex
fn vs_main(@location(0) p: vec3<u32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(vec3<f32>(p), 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;
        let (device, queue) = noop_device();
        let ctx = RenderCtx::new(&device, &queue, COLOR_FORMAT, Some(DEPTH_FORMAT));
        let mut m = triangle();
        m.set_shader_program(Arc::new(ShaderProgram::from_wgsl(&device, "uint input", src).unwrap()));

        assert!(!m.prepare(&ctx, Mat4::IDENTITY));
        assert!(m.warned_pipeline);
        assert!(!m.prepare(&ctx, Mat4::IDENTITY));
    }
}
