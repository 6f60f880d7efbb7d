use bytemuck::{Pod, Zeroable};

/// A vertex element type that can live in a [`Buffer`](super::Buffer).
///
/// Implementors are plain-old-data and describe their own attribute layout.
/// Attribute offsets must be the running sum of the preceding attribute sizes,
/// and `size_of::<Self>()` must be a multiple of 4 (wgpu copy alignment).
pub trait Vertex: Pod + Send + Sync + 'static {
    /// Attributes in declaration order, with their shader locations.
    const ATTRIBUTES: &'static [wgpu::VertexAttribute];

    /// Per-vertex buffer layout for pipeline creation.
    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: Self::ATTRIBUTES,
        }
    }
}

/// Shader locations of the [`VertexData`] attributes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum AttribId {
    Position = 0,
    Normal = 1,
    Color = 2,
}

impl AttribId {
    #[inline]
    pub const fn location(self) -> u32 {
        self as u32
    }
}

/// Default vertex: position, normal and straight-alpha RGBA color.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct VertexData {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl VertexData {
    #[inline]
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    /// Builds a vertex from glam types.
    #[inline]
    pub fn from_glam(position: glam::Vec3, normal: glam::Vec3, color: glam::Vec4) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            color: color.to_array(),
        }
    }
}

impl Vertex for VertexData {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x3, // normal
        2 => Float32x4  // color
    ];
}
