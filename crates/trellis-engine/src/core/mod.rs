//! Core engine-facing contracts.
//!
//! Defines the interface between the runtime (platform loop) and applications,
//! and the per-frame context handed to them.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::FrameCtx;
