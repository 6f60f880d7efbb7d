use std::any::{Any, TypeId};
use std::ops::Range;

use super::{Primitive, StorageHint, Vertex};

/// Object-safe view of a [`Buffer`], independent of its vertex type.
///
/// Meshes hold their buffers through this trait; typed access goes through
/// `as_any`/`as_any_mut` downcasts.
pub trait MeshBuffer: Any + Send + Sync {
    /// Releases the GPU allocation. The CPU data is kept and re-uploaded on next use.
    fn destroy(&mut self);

    /// Makes sure a GPU allocation exists. Returns `false` if none could be made.
    fn bind(&mut self, device: &wgpu::Device) -> bool;

    /// Writes pending CPU changes to the GPU.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue);

    /// Records the draw call for this buffer into `pass`.
    fn draw(&self, pass: &mut wgpu::RenderPass<'_>);

    fn primitive(&self) -> Primitive;
    fn vertex_layout(&self) -> wgpu::VertexBufferLayout<'static>;
    fn vertex_type(&self) -> TypeId;
    fn len(&self) -> usize;
    fn is_dirty(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds then uploads. Returns `true` when the buffer is ready to draw.
    fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        if !self.bind(device) {
            return false;
        }
        self.upload(device, queue);
        true
    }
}

struct GpuAllocation {
    vbo: wgpu::Buffer,
    /// Capacity in elements.
    capacity: usize,
}

/// Vertex storage with dirty tracking and a lazily created GPU buffer.
///
/// CPU-side edits only flag the buffer; the GPU copy is refreshed by
/// [`upload`](Self::upload) right before drawing.
pub struct Buffer<V: Vertex> {
    data: Vec<V>,
    gpu: Option<GpuAllocation>,

    /// First vertex to draw.
    geometry_offset: u32,
    storage_hint: StorageHint,
    primitive: Primitive,

    dirty: bool,
    generated: bool,
}

impl<V: Vertex> Default for Buffer<V> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            gpu: None,
            geometry_offset: 0,
            storage_hint: StorageHint::default(),
            primitive: Primitive::default(),
            dirty: true,
            generated: false,
        }
    }
}

impl<V: Vertex> Buffer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primitive(primitive: Primitive) -> Self {
        Self {
            primitive,
            ..Self::default()
        }
    }

    pub fn from_vertices(primitive: Primitive, data: Vec<V>) -> Self {
        Self {
            primitive,
            data,
            ..Self::default()
        }
    }

    /// Read-only access to the vertices. Does not flag the buffer.
    #[inline]
    pub fn data(&self) -> &[V] {
        &self.data
    }

    /// Mutable access to the vertices. Flags the buffer for re-upload.
    #[inline]
    pub fn data_mut(&mut self) -> &mut Vec<V> {
        self.dirty = true;
        &mut self.data
    }

    #[inline]
    pub fn add_vertex(&mut self, vertex: V) {
        self.dirty = true;
        self.data.push(vertex);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    #[inline]
    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn set_primitive(&mut self, primitive: Primitive) {
        self.primitive = primitive;
    }

    #[inline]
    pub fn geometry_offset(&self) -> u32 {
        self.geometry_offset
    }

    pub fn set_geometry_offset(&mut self, offset: u32) {
        self.geometry_offset = offset;
    }

    #[inline]
    pub fn storage_hint(&self) -> StorageHint {
        self.storage_hint
    }

    /// Changes the storage hint. The GPU buffer is reallocated on the next upload.
    pub fn set_storage_hint(&mut self, hint: StorageHint) {
        if self.storage_hint != hint {
            self.storage_hint = hint;
            self.gpu = None;
            self.generated = false;
            self.dirty = true;
        }
    }

    /// GPU capacity in elements, `0` when not generated.
    pub fn gpu_capacity(&self) -> usize {
        self.gpu.as_ref().map_or(0, |g| g.capacity)
    }

    /// Vertex range to draw: `geometry_offset..len`, or `None` if nothing remains.
    pub fn draw_range(&self) -> Option<Range<u32>> {
        let len = self.data.len() as u32;
        (self.geometry_offset < len).then(|| self.geometry_offset..len)
    }

    /// Creates the GPU buffer sized for the current data.
    pub fn generate(&mut self, device: &wgpu::Device) {
        let capacity = self.storage_hint.capacity_for(self.data.len());
        self.gpu = Some(allocate::<V>(device, capacity));
        self.generated = true;
        self.dirty = true;
    }

    /// Generates the GPU buffer on first use.
    pub fn bind(&mut self, device: &wgpu::Device) -> bool {
        if !self.generated {
            self.generate(device);
        }
        self.gpu.is_some()
    }

    /// Writes the vertices to the GPU if they changed since the last upload.
    ///
    /// Grows the allocation according to the storage hint when the data no longer fits.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.dirty {
            return;
        }
        if self.data.is_empty() {
            self.dirty = false;
            return;
        }

        let required = self.data.len();
        if self.gpu_capacity() < required {
            let capacity = self.storage_hint.capacity_for(required);
            log::trace!(
                "reallocating vertex buffer: {} -> {} elements",
                self.gpu_capacity(),
                capacity
            );
            self.gpu = Some(allocate::<V>(device, capacity));
            self.generated = true;
        }

        let Some(gpu) = self.gpu.as_ref() else { return };
        queue.write_buffer(&gpu.vbo, 0, bytemuck::cast_slice(&self.data));
        self.dirty = false;
    }

    /// Releases the GPU buffer and flags the data for re-upload.
    pub fn destroy(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.vbo.destroy();
        }
        self.generated = false;
        self.dirty = true;
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some(gpu) = self.gpu.as_ref() else { return };
        let Some(range) = self.draw_range() else { return };

        let byte_len = (self.data.len() * std::mem::size_of::<V>()) as wgpu::BufferAddress;
        pass.set_vertex_buffer(0, gpu.vbo.slice(..byte_len));
        pass.draw(range, 0..1);
    }
}

fn allocate<V: Vertex>(device: &wgpu::Device, capacity: usize) -> GpuAllocation {
    let size = (capacity * std::mem::size_of::<V>()) as wgpu::BufferAddress;
    let vbo = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("trellis vertex buffer"),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    GpuAllocation { vbo, capacity }
}

impl<V: Vertex> MeshBuffer for Buffer<V> {
    fn destroy(&mut self) {
        Buffer::destroy(self);
    }

    fn bind(&mut self, device: &wgpu::Device) -> bool {
        Buffer::bind(self, device)
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        Buffer::upload(self, device, queue);
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        Buffer::draw(self, pass);
    }

    fn primitive(&self) -> Primitive {
        self.primitive
    }

    fn vertex_layout(&self) -> wgpu::VertexBufferLayout<'static> {
        V::layout()
    }

    fn vertex_type(&self) -> TypeId {
        TypeId::of::<V>()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
