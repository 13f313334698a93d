use crate::backend::RenderBackend;
use crate::config::ViewerConfig;
use crate::engine::{NumericEngine, ObjectHandle};
use crate::error::Result;
use crate::input::{CameraState, InputController, Key};
use crate::packer::{pack_uniforms, NormalMatrixCache, UniformBlock};
use crate::performance::FrameTimer;

/// Automatic spin of the model around its Y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRotation {
    pub enabled: bool,
    pub angle: f32,
    step: f32,
}

impl ModelRotation {
    pub fn new(enabled: bool, step: f32) -> Self {
        Self {
            enabled,
            angle: 0.0,
            step,
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    /// Moves the angle on by one step when enabled.
    pub fn advance(&mut self) -> f32 {
        if self.enabled {
            self.angle += self.step;
        }
        self.angle
    }
}

/// Everything one viewing session mutates between frames.
pub struct Session {
    object: ObjectHandle,
    input: InputController,
    camera: CameraState,
    rotation: ModelRotation,
    normals: NormalMatrixCache,
}

impl Session {
    pub fn new(object: ObjectHandle, config: &ViewerConfig) -> Self {
        Self {
            object,
            input: InputController::new(config.camera_speed),
            camera: CameraState::default(),
            rotation: ModelRotation::new(config.model_rotation, config.rotation_speed),
            normals: NormalMatrixCache::default(),
        }
    }

    pub fn object(&self) -> ObjectHandle {
        self.object
    }

    pub fn rotation(&self) -> &ModelRotation {
        &self.rotation
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn key_down(&mut self, key: Key) {
        let pressed = self.input.press(key);
        if pressed && key == Key::Space {
            self.rotation.toggle();
            log::info!(
                "model rotation {}",
                if self.rotation.enabled { "on" } else { "off" }
            );
        }
    }

    pub fn key_up(&mut self, key: Key) {
        self.input.release(key);
    }

    /// One tick of camera and model state: apply held keys, spin the model,
    /// run the engine and pack the resulting transforms.
    pub fn advance(&mut self, engine: &mut dyn NumericEngine) -> UniformBlock {
        self.input.apply(&mut self.camera);
        for (axis, value) in self.camera.iter() {
            if value != 0.0 {
                log::trace!("camera param {} = {value}", axis.id());
            }
            engine.set_camera_param(axis, value);
        }
        if self.rotation.enabled {
            let angle = self.rotation.advance();
            engine.set_rotation(self.object, 0.0, angle, 0.0);
        }
        engine.compute();
        pack_uniforms(engine, self.object, &mut self.normals)
    }
}

/// Runs one frame on the active backend and returns the instantaneous FPS.
pub fn run_frame(
    session: &mut Session,
    engine: &mut dyn NumericEngine,
    backend: &mut dyn RenderBackend,
    timer: &mut FrameTimer,
    now: f64,
) -> Result<Option<f64>> {
    let uniforms = session.advance(engine);
    backend.update_uniforms(&uniforms);
    backend.render(engine)?;
    Ok(timer.tick(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::engine::{CameraAxis, SceneEngine};
    use crate::packer::GeometryBuffers;
    use crate::textures::TextureSet;

    #[derive(Default)]
    struct RecordingBackend {
        uniforms: Vec<UniformBlock>,
        renders: usize,
    }

    impl RenderBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Software
        }

        fn configure_engine(
            &self,
            _engine: &mut dyn NumericEngine,
            _object: ObjectHandle,
            _textures: &TextureSet,
        ) {
        }

        fn update_vertex_data(&mut self, _geometry: &GeometryBuffers) -> Result<()> {
            Ok(())
        }

        fn update_uniforms(&mut self, uniforms: &UniformBlock) {
            self.uniforms.push(*uniforms);
        }

        fn update_textures(&mut self, _textures: &TextureSet) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, _engine: &dyn NumericEngine) -> Result<()> {
            self.renders += 1;
            Ok(())
        }

        fn resize(&mut self, _width: u32, _height: u32) {}
    }

    fn setup(config: &ViewerConfig) -> (Session, SceneEngine) {
        let mut engine = SceneEngine::new(16, 16);
        let object = engine.new_object();
        engine.set_scale(object, config.model_scale);
        (Session::new(object, config), engine)
    }

    #[test]
    fn double_toggle_restores_rotation_flag() {
        let (mut session, _) = setup(&ViewerConfig::default());
        assert!(!session.rotation().enabled);

        session.key_down(Key::Space);
        session.key_up(Key::Space);
        assert!(session.rotation().enabled);
        session.key_down(Key::Space);
        session.key_up(Key::Space);
        assert!(!session.rotation().enabled);
    }

    #[test]
    fn held_toggle_does_not_repeat() {
        let (mut session, _) = setup(&ViewerConfig::default());
        session.key_down(Key::Space);
        session.key_down(Key::Space);
        session.key_down(Key::Space);
        assert!(session.rotation().enabled);
    }

    #[test]
    fn rotation_advances_only_when_enabled() {
        let config = ViewerConfig {
            model_rotation: true,
            rotation_speed: 0.5,
            ..ViewerConfig::default()
        };
        let (mut session, mut engine) = setup(&config);
        session.advance(&mut engine);
        session.advance(&mut engine);
        assert_eq!(session.rotation().angle, 1.0);

        session.key_down(Key::Space);
        let frozen = session.advance(&mut engine);
        assert_eq!(session.rotation().angle, 1.0);
        assert_eq!(frozen.model, engine.model_matrix(session.object()));
    }

    #[test]
    fn camera_velocity_is_zero_without_keys() {
        let (mut session, mut engine) = setup(&ViewerConfig::default());
        session.key_down(Key::W);
        session.advance(&mut engine);
        assert_eq!(session.camera().get(CameraAxis::Forward), 0.05);

        session.key_up(Key::W);
        let block = session.advance(&mut engine);
        assert!(session.camera().iter().all(|(_, v)| v == 0.0));
        // The camera stays where the last held frame left it.
        assert_eq!(block.camera_position, engine.camera_position());
    }

    #[test]
    fn rotation_speed_does_not_change_camera_turning() {
        let config = ViewerConfig {
            camera_speed: 0.05,
            rotation_speed: 0.5,
            ..ViewerConfig::default()
        };
        let (mut session, mut engine) = setup(&config);
        session.key_down(Key::ArrowLeft);
        session.key_down(Key::ArrowDown);
        session.advance(&mut engine);

        assert_eq!(session.camera().get(CameraAxis::Yaw), -0.05);
        assert_eq!(session.camera().get(CameraAxis::Pitch), 0.05);
    }

    #[test]
    fn run_frame_feeds_the_active_backend() {
        let (mut session, mut engine) = setup(&ViewerConfig::default());
        let mut backend = RecordingBackend::default();
        let mut timer = FrameTimer::new();

        let first = run_frame(&mut session, &mut engine, &mut backend, &mut timer, 0.0).unwrap();
        let second = run_frame(&mut session, &mut engine, &mut backend, &mut timer, 16.0).unwrap();

        assert_eq!(first, None);
        assert_eq!(second.map(f64::round), Some(63.0));
        assert_eq!(backend.renders, 2);
        assert_eq!(backend.uniforms.len(), 2);
        assert_eq!(backend.uniforms[1].camera_position, [1.5, 1.5, 1.5]);
    }
}
