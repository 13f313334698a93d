//! The two interchangeable ways of getting a frame onto the canvas.

#[cfg(target_arch = "wasm32")]
mod hardware;
#[cfg(target_arch = "wasm32")]
mod software;

#[cfg(target_arch = "wasm32")]
pub use hardware::HardwareBackend;
#[cfg(target_arch = "wasm32")]
pub use software::SoftwareBackend;

use crate::engine::{NumericEngine, ObjectHandle};
use crate::error::Result;
use crate::packer::{GeometryBuffers, UniformBlock};
use crate::textures::TextureSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hardware,
    Software,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Hardware => "WebGPU",
            BackendKind::Software => "Software (CPU)",
        }
    }
}

/// A rendering strategy. Exactly one is active per session and every
/// per-frame call goes through this trait.
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    /// Tells the engine what `compute` must produce for this backend and
    /// hands it whatever it needs to produce it.
    fn configure_engine(
        &self,
        engine: &mut dyn NumericEngine,
        object: ObjectHandle,
        textures: &TextureSet,
    );

    /// Replaces vertex and index buffers wholesale.
    fn update_vertex_data(&mut self, geometry: &GeometryBuffers) -> Result<()>;

    fn update_uniforms(&mut self, uniforms: &UniformBlock);

    /// Rebinds all four maps; missing ones get their 1×1 default.
    fn update_textures(&mut self, textures: &TextureSet) -> Result<()>;

    fn render(&mut self, engine: &dyn NumericEngine) -> Result<()>;

    fn resize(&mut self, width: u32, height: u32);
}

/// A GPU allocation that must be released explicitly before it is replaced.
pub trait GpuResource {
    fn release(&mut self);
}

impl GpuResource for wgpu::Buffer {
    fn release(&mut self) {
        self.destroy();
    }
}

impl GpuResource for wgpu::Texture {
    fn release(&mut self) {
        self.destroy();
    }
}

/// At most one live resource. Every `replace` releases the old resource
/// before storing the new one and bumps the generation.
#[derive(Debug)]
pub struct GpuSlot<T: GpuResource> {
    live: Option<T>,
    generation: u64,
}

impl<T: GpuResource> Default for GpuSlot<T> {
    fn default() -> Self {
        Self {
            live: None,
            generation: 0,
        }
    }
}

impl<T: GpuResource> GpuSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, resource: T) -> u64 {
        self.clear();
        self.live = Some(resource);
        self.generation += 1;
        self.generation
    }

    pub fn clear(&mut self) {
        if let Some(mut old) = self.live.take() {
            old.release();
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.live.as_ref()
    }
}
