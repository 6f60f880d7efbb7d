/// How a buffer's vertices are assembled into primitives.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl Primitive {
    #[inline]
    pub const fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            Primitive::Points => wgpu::PrimitiveTopology::PointList,
            Primitive::Lines => wgpu::PrimitiveTopology::LineList,
            Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    /// Vertices consumed by one complete primitive (strips: by the first one).
    #[inline]
    pub const fn vertices_per_primitive(self) -> usize {
        match self {
            Primitive::Points => 1,
            Primitive::Lines | Primitive::LineStrip => 2,
            Primitive::Triangles | Primitive::TriangleStrip => 3,
        }
    }

    /// Largest vertex count `<= max` a buffer of this primitive can be cut at
    /// without splitting a primitive. Strips cannot be cut and return `None`.
    pub const fn chunk_len(self, max: usize) -> Option<usize> {
        match self {
            Primitive::LineStrip | Primitive::TriangleStrip => None,
            _ => {
                let n = self.vertices_per_primitive();
                Some(max - max % n)
            }
        }
    }
}

/// Expected update frequency of a buffer's contents.
///
/// Controls how the GPU allocation grows when the data outgrows it.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum StorageHint {
    /// Written once, drawn many times. Allocations are exact-size.
    #[default]
    Static,
    /// Rewritten occasionally. Capacity grows geometrically and is reused.
    Dynamic,
    /// Rewritten every frame. Same growth policy as `Dynamic`.
    Stream,
}

impl StorageHint {
    /// Minimum element capacity of a growable allocation.
    pub const MIN_GROWABLE_CAPACITY: usize = 64;

    /// Element capacity to allocate for `required` elements.
    pub fn capacity_for(self, required: usize) -> usize {
        let required = required.max(1);
        match self {
            StorageHint::Static => required,
            StorageHint::Dynamic | StorageHint::Stream => required
                .next_power_of_two()
                .max(Self::MIN_GROWABLE_CAPACITY),
        }
    }
}
