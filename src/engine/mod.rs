//! The numeric engine contract: geometry storage, camera/model transforms,
//! and (optionally) CPU rasterization into an RGBA pixel buffer.
//!
//! The viewer only talks to the engine through [`NumericEngine`];
//! [`SceneEngine`] is the implementation shipped with the crate.

mod raster;
mod scene;

pub use raster::{AMBIENT, BACKGROUND, LIGHT_DIRECTION, SHININESS};
pub use scene::SceneEngine;

use crate::textures::{TextureImage, TextureSlot};

/// Opaque token for one mesh instance owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u32);

/// The five camera axes, identified on the wire by the ids 1, 2, 3, 11, 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CameraAxis {
    Right,
    Up,
    Forward,
    /// Positive values tilt the view down.
    Pitch,
    /// Positive values turn the view right.
    Yaw,
}

impl CameraAxis {
    pub const ALL: [CameraAxis; 5] = [
        CameraAxis::Right,
        CameraAxis::Up,
        CameraAxis::Forward,
        CameraAxis::Pitch,
        CameraAxis::Yaw,
    ];

    pub fn id(self) -> u32 {
        match self {
            CameraAxis::Right => 1,
            CameraAxis::Up => 2,
            CameraAxis::Forward => 3,
            CameraAxis::Pitch => 11,
            CameraAxis::Yaw => 12,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            CameraAxis::Right => 0,
            CameraAxis::Up => 1,
            CameraAxis::Forward => 2,
            CameraAxis::Pitch => 3,
            CameraAxis::Yaw => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown object handle {0:?}")]
    UnknownObject(ObjectHandle),

    #[error("face references vertex {index} but the object has {count} vertices")]
    VertexOutOfRange { index: u32, count: usize },
}

/// Operations the viewer needs from the geometry/transform engine.
///
/// `compute` is synchronous and updates every derived quantity; the getters
/// return the state produced by the most recent `compute` (geometry getters
/// reflect the latest `add_*` calls immediately).
pub trait NumericEngine {
    fn new_object(&mut self) -> ObjectHandle;

    fn add_vertex(&mut self, object: ObjectHandle, x: f32, y: f32, z: f32);
    fn add_vertex_normal(&mut self, object: ObjectHandle, x: f32, y: f32, z: f32);
    fn add_texture_vertex(&mut self, object: ObjectHandle, u: f32, v: f32, w: f32);

    /// Zero-based `[v0, vt0, vn0, v1, vt1, vn1, v2, vt2, vn2]`.
    fn add_face(&mut self, object: ObjectHandle, indices: [u32; 9]) -> Result<(), EngineError>;

    fn set_scale(&mut self, object: ObjectHandle, scale: f32);
    fn set_rotation(&mut self, object: ObjectHandle, angle_x: f32, angle_y: f32, angle_z: f32);
    fn set_texture(&mut self, object: ObjectHandle, slot: TextureSlot, image: Option<TextureImage>);

    /// Per-compute velocity along one camera axis.
    fn set_camera_param(&mut self, axis: CameraAxis, value: f32);

    /// Whether `compute` also rasterizes into the pixel buffer.
    fn set_raster_output(&mut self, enabled: bool);

    fn resize(&mut self, width: u32, height: u32);

    fn compute(&mut self);

    fn view_projection_matrix(&self) -> [f32; 16];
    fn model_matrix(&self, object: ObjectHandle) -> [f32; 16];
    fn camera_position(&self) -> [f32; 3];

    /// Interleaved `position(3) normal(3) texcoord(2)` records.
    fn vertex_data(&self, object: ObjectHandle) -> &[f32];
    fn index_data(&self, object: ObjectHandle) -> &[u32];

    fn frame_size(&self) -> (u32, u32);
    /// RGBA8, `width * height * 4` bytes while raster output is enabled;
    /// empty otherwise.
    fn pixels(&self) -> &[u8];
}
