//! Scene: meshes and the renderer that draws them.
//!
//! Responsibilities:
//! - per-mesh transform state (position, rotation, scale, origin) with lazy rebuild
//! - per-mesh `u_mvp` uniform and shader binding
//! - a flat, insertion-ordered mesh list with deferred deletion

mod mesh;
mod renderer;

pub use mesh::Mesh;
pub use renderer::{MeshId, Renderer};
