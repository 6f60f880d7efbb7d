//! Trellis engine crate.
//!
//! A small mesh scene on top of wgpu: shader programs, vertex buffers with
//! dirty tracking, and meshes with per-mesh transforms drawn in a flat list.
//! The `device`, `window` and `core` modules provide the platform + GPU
//! runtime used to drive it.

pub mod core;
pub mod device;
pub mod logging;
pub mod render;
pub mod scene;
pub mod time;
pub mod window;

pub use glam;
