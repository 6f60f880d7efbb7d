//! GPU rendering subsystem.
//!
//! Owns the GPU-facing building blocks that meshes are made of:
//! - `vertex`: vertex element types and their attribute layouts
//! - `buffer`: CPU vertex storage with dirty tracking and lazy GPU upload
//! - `shader`: WGSL program loading, reflection and pipeline caching
//!
//! Convention:
//! - positions are in model space; the vertex shader multiplies by `u_mvp`
//! - clip space follows wgpu (depth in `0..1`)

mod buffer;
mod ctx;
mod primitive;
mod shader;
mod vertex;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{Buffer, MeshBuffer};
pub use ctx::{RenderCtx, RenderTarget};
pub use primitive::{Primitive, StorageHint};
pub use shader::{
    shader_capabilities, InputKind, PipelineKey, ProgramInterface, ShaderError, ShaderProgram,
    ShaderReflection, ShaderSources, ShaderStage, VertexInput, MVP_UNIFORM_NAME,
};
pub use vertex::{AttribId, Vertex, VertexData};

pub(crate) use shader::MVP_UNIFORM_SIZE;

/// WGSL source of the built-in flat-shaded vertex-color program.
pub const BASIC_SHADER: &str = include_str!("shaders/basic.wgsl");
