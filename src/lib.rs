//! Browser model viewer: a WebGPU renderer with a CPU rasterizer fallback,
//! driven by keyboard camera controls.
//!
//! Everything outside `app` and the two concrete backends is plain Rust and
//! runs natively, which is how the tests exercise it.

pub mod utils;

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod math;
pub mod model;
pub mod packer;
pub mod performance;
pub mod selector;
pub mod session;
pub mod textures;

#[cfg(target_arch = "wasm32")]
mod app;

#[cfg(target_arch = "wasm32")]
pub use app::{start_viewer, Viewer};
pub use backend::{BackendKind, RenderBackend};
pub use config::ViewerConfig;
pub use engine::{CameraAxis, NumericEngine, ObjectHandle, SceneEngine};
pub use error::{Result, ViewerError};
pub use performance::PerformanceSnapshot;
pub use selector::{BackendSelector, BackendState};
pub use session::Session;
