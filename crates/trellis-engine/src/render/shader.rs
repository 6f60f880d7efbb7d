//! WGSL shader programs.
//!
//! A program is a vertex stage plus an optional fragment stage, each given as
//! WGSL source. Sources are parsed and validated on the CPU before any GPU
//! object is created, against the capabilities of the device's enabled
//! features, so compile errors come back as [`ShaderError`] values with the
//! full diagnostic. GPU object creation runs inside a validation error scope
//! and reports failures the same way.
//!
//! The only resource a program may declare is the `u_mvp` uniform
//! (`mat4x4<f32>` in group 0). Meshes bind their own copy of it.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Mutex, PoisonError};

/// Name of the model-view-projection uniform a program may declare.
pub const MVP_UNIFORM_NAME: &str = "u_mvp";

/// Size in bytes of the `u_mvp` uniform.
pub(crate) const MVP_UNIFORM_SIZE: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("{0} shaders are not supported")]
    UnsupportedStage(ShaderStage),

    #[error("failed to compile {stage} shader:\n{message}")]
    Compile { stage: ShaderStage, message: String },

    #[error("{stage} shader source has no {stage} entry point")]
    MissingEntryPoint { stage: ShaderStage },

    #[error("unsupported resource `{name}` at group {group}, binding {binding}")]
    UnsupportedBinding {
        name: String,
        group: u32,
        binding: u32,
    },

    #[error("`u_mvp` must be a `var<uniform>` of type mat4x4<f32> in group 0")]
    InvalidMvpUniform,

    #[error("`u_mvp` is bound at binding {vertex} in the vertex stage but {fragment} in the fragment stage")]
    MvpBindingMismatch { vertex: u32, fragment: u32 },

    #[error("vertex shader reads location {location}, which the vertex layout does not provide")]
    MissingAttribute { location: u32 },

    #[error("vertex shader reads location {location} as {expected:?}, but the layout provides {format:?}")]
    AttributeType {
        location: u32,
        expected: InputKind,
        format: wgpu::VertexFormat,
    },

    #[error("failed to create render pipeline for `{label}`:\n{message}")]
    Pipeline { label: String, message: String },
}

/// Numeric class of a vertex input, as seen by the shader.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InputKind {
    Float,
    Sint,
    Uint,
}

impl InputKind {
    fn of_scalar(kind: naga::ScalarKind) -> Self {
        match kind {
            naga::ScalarKind::Sint | naga::ScalarKind::AbstractInt => InputKind::Sint,
            naga::ScalarKind::Uint => InputKind::Uint,
            _ => InputKind::Float,
        }
    }

    /// Class a shader must declare to read `format`. Normalized formats read as floats.
    pub fn of_format(format: wgpu::VertexFormat) -> Self {
        use wgpu::VertexFormat as F;
        match format {
            F::Uint8 | F::Uint8x2 | F::Uint8x4 | F::Uint16 | F::Uint16x2 | F::Uint16x4 | F::Uint32
            | F::Uint32x2 | F::Uint32x3 | F::Uint32x4 => InputKind::Uint,
            F::Sint8 | F::Sint8x2 | F::Sint8x4 | F::Sint16 | F::Sint16x2 | F::Sint16x4 | F::Sint32
            | F::Sint32x2 | F::Sint32x3 | F::Sint32x4 => InputKind::Sint,
            _ => InputKind::Float,
        }
    }
}

/// One `@location` input of the vertex entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexInput {
    pub location: u32,
    pub kind: InputKind,
}

/// Validator capabilities matching the shader features enabled on a device.
pub fn shader_capabilities(features: wgpu::Features) -> naga::valid::Capabilities {
    use naga::valid::Capabilities as Caps;
    use wgpu::Features as F;

    let mut caps = Caps::default();
    for (cap, feature) in [
        (Caps::IMMEDIATES, F::IMMEDIATES),
        (Caps::FLOAT64, F::SHADER_F64),
        (Caps::SHADER_FLOAT16, F::SHADER_F16),
        (Caps::SHADER_INT64, F::SHADER_INT64),
        (Caps::PRIMITIVE_INDEX, F::SHADER_PRIMITIVE_INDEX),
        (Caps::CLIP_DISTANCE, F::CLIP_DISTANCES),
        (Caps::MULTIVIEW, F::MULTIVIEW),
        (Caps::EARLY_DEPTH_TEST, F::SHADER_EARLY_DEPTH_TEST),
        (Caps::DUAL_SOURCE_BLENDING, F::DUAL_SOURCE_BLENDING),
        (Caps::SUBGROUP, F::SUBGROUP),
        (Caps::SUBGROUP_BARRIER, F::SUBGROUP_BARRIER),
        (Caps::SUBGROUP_VERTEX_STAGE, F::SUBGROUP_VERTEX),
        (Caps::STORAGE_TEXTURE_16BIT_NORM_FORMATS, F::TEXTURE_FORMAT_16BIT_NORM),
    ] {
        caps.set(cap, features.contains(feature));
    }
    caps
}

/// Runs `create` inside a validation error scope.
fn scoped<T>(device: &wgpu::Device, create: impl FnOnce() -> T) -> Result<T, wgpu::Error> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let out = create();
    match pollster::block_on(scope.pop()) {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// WGSL sources of a program.
#[derive(Debug, Copy, Clone)]
pub struct ShaderSources<'a> {
    pub vertex: &'a str,
    pub fragment: Option<&'a str>,
    /// Accepted for interface parity; always rejected by [`ShaderProgram::load`].
    pub geometry: Option<&'a str>,
}

impl<'a> ShaderSources<'a> {
    pub fn new(vertex: &'a str, fragment: Option<&'a str>) -> Self {
        Self {
            vertex,
            fragment,
            geometry: None,
        }
    }

    /// One source providing both the vertex and the fragment entry points.
    pub fn combined(source: &'a str) -> Self {
        Self::new(source, Some(source))
    }

    fn fragment_is_shared(&self) -> bool {
        self.fragment == Some(self.vertex)
    }
}

/// What a single WGSL source exposes to the program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    /// First `@vertex` entry point.
    pub vertex_entry: Option<String>,
    /// First `@fragment` entry point.
    pub fragment_entry: Option<String>,
    /// Inputs of the vertex entry point, sorted by location.
    pub vertex_inputs: Vec<VertexInput>,
    /// Binding index of `u_mvp` within group 0, if declared.
    pub mvp_binding: Option<u32>,
}

impl ShaderReflection {
    /// Parses and validates `source` with every capability enabled.
    pub fn parse(stage: ShaderStage, source: &str) -> Result<Self, ShaderError> {
        Self::parse_with(stage, source, naga::valid::Capabilities::all())
    }

    /// Parses and validates `source` against `caps`, then records its interface.
    ///
    /// `stage` only labels errors; every entry point in the source is reflected.
    pub fn parse_with(
        stage: ShaderStage,
        source: &str,
        caps: naga::valid::Capabilities,
    ) -> Result<Self, ShaderError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
            stage,
            message: e.emit_to_string(source),
        })?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            caps,
        )
        .validate(&module)
        .map_err(|e| ShaderError::Compile {
            stage,
            message: e.emit_to_string(source),
        })?;

        let mut out = Self::default();

        for ep in &module.entry_points {
            match ep.stage {
                naga::ShaderStage::Vertex if out.vertex_entry.is_none() => {
                    out.vertex_entry = Some(ep.name.clone());
                    for arg in &ep.function.arguments {
                        collect_locations(&module, arg.ty, arg.binding.as_ref(), &mut out.vertex_inputs);
                    }
                }
                naga::ShaderStage::Fragment if out.fragment_entry.is_none() => {
                    out.fragment_entry = Some(ep.name.clone());
                }
                _ => {}
            }
        }
        out.vertex_inputs.sort_unstable_by_key(|i| i.location);
        out.vertex_inputs.dedup_by_key(|i| i.location);

        for (_, var) in module.global_variables.iter() {
            let Some(rb) = var.binding.as_ref() else { continue };
            let name = var.name.clone().unwrap_or_default();

            if name != MVP_UNIFORM_NAME {
                return Err(ShaderError::UnsupportedBinding {
                    name,
                    group: rb.group,
                    binding: rb.binding,
                });
            }

            let is_mat4 = matches!(
                module.types[var.ty].inner,
                naga::TypeInner::Matrix {
                    columns: naga::VectorSize::Quad,
                    rows: naga::VectorSize::Quad,
                    scalar,
                } if scalar == naga::Scalar::F32
            );
            if rb.group != 0 || !is_mat4 || !matches!(var.space, naga::AddressSpace::Uniform) {
                return Err(ShaderError::InvalidMvpUniform);
            }
            out.mvp_binding = Some(rb.binding);
        }

        Ok(out)
    }
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<VertexInput>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            let kind = match module.types[ty].inner {
                naga::TypeInner::Scalar(s) | naga::TypeInner::Vector { scalar: s, .. } => {
                    InputKind::of_scalar(s.kind)
                }
                _ => InputKind::Float,
            };
            out.push(VertexInput {
                location: *location,
                kind,
            });
        }
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for m in members {
                    collect_locations(module, m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

/// Combined interface of a program's stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: Option<String>,
    pub vertex_inputs: Vec<VertexInput>,
    /// `u_mvp` binding index and the stages that declare it.
    pub mvp: Option<(u32, wgpu::ShaderStages)>,
}

impl ProgramInterface {
    /// Reflects every stage of `sources` without touching the GPU.
    pub fn reflect(sources: &ShaderSources<'_>) -> Result<Self, ShaderError> {
        Self::reflect_with(sources, naga::valid::Capabilities::all())
    }

    /// Like [`reflect`](Self::reflect), validating against `caps` only.
    pub fn reflect_with(
        sources: &ShaderSources<'_>,
        caps: naga::valid::Capabilities,
    ) -> Result<Self, ShaderError> {
        if sources.geometry.is_some() {
            return Err(ShaderError::UnsupportedStage(ShaderStage::Geometry));
        }

        let vs = ShaderReflection::parse_with(ShaderStage::Vertex, sources.vertex, caps)?;
        let vertex_entry = vs
            .vertex_entry
            .clone()
            .ok_or(ShaderError::MissingEntryPoint { stage: ShaderStage::Vertex })?;

        let fs = match sources.fragment {
            Some(_) if sources.fragment_is_shared() => Some(vs.clone()),
            Some(src) => Some(ShaderReflection::parse_with(ShaderStage::Fragment, src, caps)?),
            None => None,
        };
        let fragment_entry = fs
            .as_ref()
            .map(|f| {
                f.fragment_entry
                    .clone()
                    .ok_or(ShaderError::MissingEntryPoint { stage: ShaderStage::Fragment })
            })
            .transpose()?;

        let fs_mvp = fs.as_ref().and_then(|f| f.mvp_binding);
        let mvp = match (vs.mvp_binding, fs_mvp) {
            (Some(v), Some(f)) if v != f => {
                return Err(ShaderError::MvpBindingMismatch { vertex: v, fragment: f });
            }
            (Some(v), Some(_)) => Some((v, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT)),
            (Some(v), None) => Some((v, wgpu::ShaderStages::VERTEX)),
            (None, Some(f)) => Some((f, wgpu::ShaderStages::FRAGMENT)),
            (None, None) => None,
        };

        Ok(Self {
            vertex_entry,
            fragment_entry,
            vertex_inputs: vs.vertex_inputs,
            mvp,
        })
    }

    /// Checks that `attributes` feed every location the vertex stage reads,
    /// with a format of the same numeric class.
    pub fn check_vertex_layout(&self, attributes: &[wgpu::VertexAttribute]) -> Result<(), ShaderError> {
        for input in &self.vertex_inputs {
            let Some(attr) = attributes.iter().find(|a| a.shader_location == input.location) else {
                return Err(ShaderError::MissingAttribute { location: input.location });
            };
            if InputKind::of_format(attr.format) != input.kind {
                return Err(ShaderError::AttributeType {
                    location: input.location,
                    expected: input.kind,
                    format: attr.format,
                });
            }
        }
        Ok(())
    }
}

/// Identifies a render pipeline built from one program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PipelineKey {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub topology: wgpu::PrimitiveTopology,
    pub vertex_type: TypeId,
}

/// A compiled vertex (+ fragment) program with its pipeline cache.
///
/// Shared between meshes through `Arc`. Pipelines are created on first use per
/// [`PipelineKey`] and reused afterwards.
pub struct ShaderProgram {
    label: String,
    interface: ProgramInterface,

    vertex_module: wgpu::ShaderModule,
    fragment_module: Option<wgpu::ShaderModule>,

    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,

    pipelines: Mutex<HashMap<PipelineKey, wgpu::RenderPipeline>>,
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("label", &self.label)
            .field("interface", &self.interface)
            .finish_non_exhaustive()
    }
}

impl ShaderProgram {
    /// Compiles `sources` into a program.
    ///
    /// Errors are logged with their diagnostic before being returned.
    pub fn load(
        device: &wgpu::Device,
        label: &str,
        sources: ShaderSources<'_>,
    ) -> Result<Self, ShaderError> {
        Self::compile(device, label, sources).inspect_err(|e| {
            log::error!("shader program `{label}`: {e}");
        })
    }

    fn compile(
        device: &wgpu::Device,
        label: &str,
        sources: ShaderSources<'_>,
    ) -> Result<Self, ShaderError> {
        let caps = shader_capabilities(device.features());
        let interface = ProgramInterface::reflect_with(&sources, caps)?;

        let vertex_module = create_module(device, ShaderStage::Vertex, label, sources.vertex)?;
        let fragment_module = match sources.fragment {
            Some(_) if sources.fragment_is_shared() => Some(vertex_module.clone()),
            Some(src) => Some(create_module(device, ShaderStage::Fragment, label, src)?),
            None => None,
        };

        let bind_group_layout = interface.mvp.map(|(binding, visibility)| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label} bgl")),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(MVP_UNIFORM_SIZE),
                    },
                    count: None,
                }],
            })
        });

        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = bind_group_layout.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} pipeline layout")),
            bind_group_layouts: &bind_group_layouts,
            immediate_size: 0,
        });

        log::debug!(
            "shader program `{label}` loaded (vs: {}, fs: {:?}, u_mvp: {:?})",
            interface.vertex_entry,
            interface.fragment_entry,
            interface.mvp.map(|(b, _)| b)
        );

        Ok(Self {
            label: label.to_string(),
            interface,
            vertex_module,
            fragment_module,
            bind_group_layout,
            pipeline_layout,
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    /// Compiles a single WGSL source holding both stages.
    pub fn from_wgsl(device: &wgpu::Device, label: &str, source: &str) -> Result<Self, ShaderError> {
        Self::load(device, label, ShaderSources::combined(source))
    }

    /// The built-in vertex-color program.
    pub fn basic(device: &wgpu::Device) -> Result<Self, ShaderError> {
        Self::from_wgsl(device, "trellis basic", super::BASIC_SHADER)
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Binding index of `u_mvp`, or `None` if the program does not declare it.
    #[inline]
    pub fn mvp_binding(&self) -> Option<u32> {
        self.interface.mvp.map(|(b, _)| b)
    }

    /// Layout for the per-mesh `u_mvp` bind group.
    #[inline]
    pub fn bind_group_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.bind_group_layout.as_ref()
    }

    pub fn check_vertex_layout(&self, attributes: &[wgpu::VertexAttribute]) -> Result<(), ShaderError> {
        self.interface.check_vertex_layout(attributes)
    }

    /// Returns the pipeline for `key`, creating and caching it on first use.
    pub fn pipeline(
        &self,
        device: &wgpu::Device,
        key: PipelineKey,
        vertex_layout: wgpu::VertexBufferLayout<'static>,
    ) -> Result<wgpu::RenderPipeline, ShaderError> {
        let mut cache = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = cache.get(&key) {
            return Ok(p.clone());
        }

        self.check_vertex_layout(vertex_layout.attributes)?;

        let targets = [Some(wgpu::ColorTargetState {
            format: key.color_format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let fragment = match (self.fragment_module.as_ref(), self.interface.fragment_entry.as_deref()) {
            (Some(module), Some(entry)) => Some(wgpu::FragmentState {
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                targets: &targets,
            }),
            _ => None,
        };

        let label = format!("{} pipeline", self.label);
        let desc = wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&self.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: Some(&self.interface.vertex_entry),
                compilation_options: Default::default(),
                buffers: &[vertex_layout],
            },

            fragment,

            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        };

        let pipeline = scoped(device, || device.create_render_pipeline(&desc)).map_err(|e| {
            ShaderError::Pipeline {
                label: self.label.clone(),
                message: e.to_string(),
            }
        })?;

        log::debug!("created pipeline for `{}`: {:?}", self.label, key);
        cache.insert(key, pipeline.clone());
        Ok(pipeline)
    }
}

fn create_module(
    device: &wgpu::Device,
    stage: ShaderStage,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let label = format!("{label} {stage}");
    scoped(device, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })
    .map_err(|e| ShaderError::Compile {
        stage,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{noop_device, COLOR_FORMAT, DEPTH_FORMAT};
    use crate::render::{Vertex, VertexData, BASIC_SHADER};

    fn locations(iface: &ProgramInterface) -> Vec<u32> {
        iface.vertex_inputs.iter().map(|i| i.location).collect()
    }

    fn key(depth_format: Option<wgpu::TextureFormat>) -> PipelineKey {
        PipelineKey {
            color_format: COLOR_FORMAT,
            depth_format,
            topology: wgpu::PrimitiveTopology::TriangleList,
            vertex_type: TypeId::of::<VertexData>(),
        }
    }

    const VS_ONLY: &str = r#"
@group(0) @binding(0) var<uniform> u_mvp: mat4x4<f32>;

@vertex
fn main_vs(@location(0) i_position: vec3<f32>, @location(2) i_color: vec4<f32>) -> @builtin(position) vec4<f32> {
    return u_mvp * vec4<f32>(i_position, i_color.a);
}
"#;

    const FS_ONLY: &str = r#"
@fragment
fn main_fs() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 1.0, 1.0);
}
"#;

    const NO_MVP: &str = r#"
@vertex
fn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(p, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

    #[test]
    fn basic_shader_reflects_all_inputs() {
        let iface = ProgramInterface::reflect(&ShaderSources::combined(BASIC_SHADER)).unwrap();
        assert_eq!(iface.vertex_entry, "vs_main");
        assert_eq!(iface.fragment_entry.as_deref(), Some("fs_main"));
        assert_eq!(locations(&iface), vec![0, 1, 2]);
        assert_eq!(
            iface.mvp,
            Some((0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT))
        );
        iface.check_vertex_layout(VertexData::ATTRIBUTES).unwrap();
    }

    #[test]
    fn separate_sources_are_reflected_per_stage() {
        let iface = ProgramInterface::reflect(&ShaderSources::new(VS_ONLY, Some(FS_ONLY))).unwrap();
        assert_eq!(iface.vertex_entry, "main_vs");
        assert_eq!(iface.fragment_entry.as_deref(), Some("main_fs"));
        assert_eq!(locations(&iface), vec![0, 2]);
        assert_eq!(iface.mvp, Some((0, wgpu::ShaderStages::VERTEX)));
    }

    #[test]
    fn fragment_stage_is_optional() {
        let iface = ProgramInterface::reflect(&ShaderSources::new(VS_ONLY, None)).unwrap();
        assert_eq!(iface.fragment_entry, None);
    }

    #[test]
    fn missing_mvp_is_not_an_error() {
        let iface = ProgramInterface::reflect(&ShaderSources::combined(NO_MVP)).unwrap();
        assert_eq!(iface.mvp, None);
    }

    #[test]
    fn geometry_stage_is_rejected() {
        let sources = ShaderSources {
            vertex: VS_ONLY,
            fragment: Some(FS_ONLY),
            geometry: Some(FS_ONLY),
        };
        let err = ProgramInterface::reflect(&sources).unwrap_err();
        assert!(matches!(err, ShaderError::UnsupportedStage(ShaderStage::Geometry)));
    }

    #[test]
    fn syntax_error_reports_stage_and_message() {
        let err = ProgramInterface::reflect(&ShaderSources::new(VS_ONLY, Some("fn broken( {"))).unwrap_err();
        match err {
            ShaderError::Compile { stage, message } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn type_error_fails_validation() {
        let src = r#"
@vertex
fn vs_main() -> @builtin(position) vec4<f32> {
    let x: f32 = true;
    return vec4<f32>(x);
}
"#;
        let err = ProgramInterface::reflect(&ShaderSources::new(src, None)).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Vertex, .. }));
    }

    #[test]
    fn vertex_source_needs_vertex_entry_point() {
        let err = ProgramInterface::reflect(&ShaderSources::new(FS_ONLY, None)).unwrap_err();
        assert!(matches!(err, ShaderError::MissingEntryPoint { stage: ShaderStage::Vertex }));
    }

    #[test]
    fn fragment_source_needs_fragment_entry_point() {
        let err = ProgramInterface::reflect(&ShaderSources::new(VS_ONLY, Some(VS_ONLY))).unwrap_err();
        assert!(matches!(err, ShaderError::MissingEntryPoint { stage: ShaderStage::Fragment }));
    }

    #[test]
    fn foreign_bindings_are_rejected() {
        let src = r#"
@group(0) @binding(1) var<uniform> u_tint: vec4<f32>;

@vertex
fn vs_main() -> @builtin(position) vec4<f32> {
    return u_tint;
}
"#;
        let err = ProgramInterface::reflect(&ShaderSources::new(src, None)).unwrap_err();
        match err {
            ShaderError::UnsupportedBinding { name, group, binding } => {
                assert_eq!(name, "u_tint");
                assert_eq!((group, binding), (0, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mvp_outside_group_zero_is_rejected() {
        let src = r#"
@group(1) @binding(0) var<uniform> u_mvp: mat4x4<f32>;

@vertex
fn vs_main() -> @builtin(position) vec4<f32> {
    return u_mvp[0];
}
"#;
        let err = ProgramInterface::reflect(&ShaderSources::new(src, None)).unwrap_err();
        assert!(matches!(err, ShaderError::InvalidMvpUniform));
    }

    #[test]
    fn mvp_binding_must_agree_across_stages() {
        let fs = r#"
@group(0) @binding(3) var<uniform> u_mvp: mat4x4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u_mvp[0];
}
"#;
        let err = ProgramInterface::reflect(&ShaderSources::new(VS_ONLY, Some(fs))).unwrap_err();
        assert!(matches!(err, ShaderError::MvpBindingMismatch { vertex: 0, fragment: 3 }));
    }

    #[test]
    fn layout_must_cover_vertex_inputs() {
        let iface = ProgramInterface::reflect(&ShaderSources::new(VS_ONLY, None)).unwrap();
        let attrs = wgpu::vertex_attr_array![0 => Float32x3];
        let err = iface.check_vertex_layout(&attrs).unwrap_err();
        assert!(matches!(err, ShaderError::MissingAttribute { location: 2 }));
    }

    const UINT_POSITION: &str = r#"
@vertex
fn vs_main(@location(0) p: vec3<u32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(vec3<f32>(p), 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

    const USES_F64: &str = r#"
@vertex
fn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {
    let x: f64 = 1.0lf;
    return vec4<f32>(p, f32(x));
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

    #[test]
    fn input_kinds_are_reflected() {
        let iface = ProgramInterface::reflect(&ShaderSources::combined(UINT_POSITION)).unwrap();
        assert_eq!(
            iface.vertex_inputs,
            vec![VertexInput {
                location: 0,
                kind: InputKind::Uint
            }]
        );
        let basic = ProgramInterface::reflect(&ShaderSources::combined(BASIC_SHADER)).unwrap();
        assert!(basic.vertex_inputs.iter().all(|i| i.kind == InputKind::Float));
    }

    #[test]
    fn layout_format_must_match_input_kind() {
        let iface = ProgramInterface::reflect(&ShaderSources::combined(UINT_POSITION)).unwrap();
        let err = iface.check_vertex_layout(VertexData::ATTRIBUTES).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::AttributeType {
                location: 0,
                expected: InputKind::Uint,
                format: wgpu::VertexFormat::Float32x3,
            }
        ));

        let attrs = wgpu::vertex_attr_array![0 => Uint32x3];
        iface.check_vertex_layout(&attrs).unwrap();
    }

    #[test]
    fn normalized_formats_read_as_float() {
        assert_eq!(InputKind::of_format(wgpu::VertexFormat::Unorm8x4), InputKind::Float);
        assert_eq!(InputKind::of_format(wgpu::VertexFormat::Sint16x2), InputKind::Sint);
        assert_eq!(InputKind::of_format(wgpu::VertexFormat::Uint32), InputKind::Uint);
    }

    #[test]
    fn capabilities_follow_device_features() {
        let none = shader_capabilities(wgpu::Features::empty());
        assert!(!none.contains(naga::valid::Capabilities::FLOAT64));
        assert!(none.contains(naga::valid::Capabilities::CUBE_ARRAY_TEXTURES));

        let f64 = shader_capabilities(wgpu::Features::SHADER_F64);
        assert!(f64.contains(naga::valid::Capabilities::FLOAT64));
    }

    #[test]
    fn unsupported_feature_is_a_compile_error() {
        ProgramInterface::reflect(&ShaderSources::combined(USES_F64)).unwrap();

        let caps = shader_capabilities(wgpu::Features::empty());
        let err = ProgramInterface::reflect_with(&ShaderSources::combined(USES_F64), caps).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Vertex, .. }));
    }

    #[test]
    fn load_rejects_shaders_the_device_cannot_run() {
        let (device, _queue) = noop_device();
        let err = ShaderProgram::from_wgsl(&device, "f64", USES_F64).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Vertex, .. }));
    }

    #[test]
    fn basic_program_builds_and_caches_pipelines() {
        let (device, _queue) = noop_device();
        let program = ShaderProgram::basic(&device).unwrap();
        assert_eq!(program.mvp_binding(), Some(0));
        assert!(program.bind_group_layout().is_some());

        let first = program.pipeline(&device, key(Some(DEPTH_FORMAT)), VertexData::layout());
        assert!(first.is_ok());
        let again = program.pipeline(&device, key(Some(DEPTH_FORMAT)), VertexData::layout());
        assert!(again.is_ok());
        assert_eq!(program.pipelines.lock().unwrap().len(), 1);

        program.pipeline(&device, key(None), VertexData::layout()).unwrap();
        assert_eq!(program.pipelines.lock().unwrap().len(), 2);
    }

    #[test]
    fn pipeline_type_mismatch_is_an_error() {
        let (device, _queue) = noop_device();
        let program = ShaderProgram::from_wgsl(&device, "uint position", UINT_POSITION).unwrap();
        let err = program.pipeline(&device, key(None), VertexData::layout()).unwrap_err();
        assert!(matches!(err, ShaderError::AttributeType { location: 0, .. }));
    }

    #[test]
    fn invalid_pipeline_state_is_reported_not_raised() {
        let (device, _queue) = noop_device();
        let program = ShaderProgram::basic(&device).unwrap();

        // A color format cannot back a depth attachment.
        let err = program
            .pipeline(&device, key(Some(COLOR_FORMAT)), VertexData::layout())
            .unwrap_err();
        assert!(matches!(err, ShaderError::Pipeline { .. }));
        assert!(program.pipelines.lock().unwrap().is_empty());
    }
}
