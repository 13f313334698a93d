use std::collections::BTreeSet;

use crate::engine::CameraAxis;

/// Keys the viewer reacts to, named after `KeyboardEvent.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    D,
    A,
    Q,
    E,
    W,
    S,
    ArrowUp,
    ArrowDown,
    ArrowRight,
    ArrowLeft,
    Space,
}

impl Key {
    pub fn from_code(code: &str) -> Option<Self> {
        let key = match code {
            "KeyD" => Key::D,
            "KeyA" => Key::A,
            "KeyQ" => Key::Q,
            "KeyE" => Key::E,
            "KeyW" => Key::W,
            "KeyS" => Key::S,
            "ArrowUp" => Key::ArrowUp,
            "ArrowDown" => Key::ArrowDown,
            "ArrowRight" => Key::ArrowRight,
            "ArrowLeft" => Key::ArrowLeft,
            "Space" => Key::Space,
            _ => return None,
        };
        Some(key)
    }

    /// The camera axis this key drives and the sign of its contribution.
    pub fn binding(self) -> Option<(CameraAxis, f32)> {
        let binding = match self {
            Key::D => (CameraAxis::Right, 1.0),
            Key::A => (CameraAxis::Right, -1.0),
            Key::Q => (CameraAxis::Up, 1.0),
            Key::E => (CameraAxis::Up, -1.0),
            Key::W => (CameraAxis::Forward, 1.0),
            Key::S => (CameraAxis::Forward, -1.0),
            Key::ArrowUp => (CameraAxis::Pitch, -1.0),
            Key::ArrowDown => (CameraAxis::Pitch, 1.0),
            Key::ArrowRight => (CameraAxis::Yaw, 1.0),
            Key::ArrowLeft => (CameraAxis::Yaw, -1.0),
            Key::Space => return None,
        };
        Some(binding)
    }
}

/// Per-axis camera velocity for the current tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraState {
    velocity: [f32; 5],
}

impl CameraState {
    pub fn get(&self, axis: CameraAxis) -> f32 {
        self.velocity[axis.index()]
    }

    pub fn reset(&mut self) {
        self.velocity = [0.0; 5];
    }

    fn add(&mut self, axis: CameraAxis, value: f32) {
        self.velocity[axis.index()] += value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (CameraAxis, f32)> + '_ {
        CameraAxis::ALL
            .into_iter()
            .map(move |axis| (axis, self.get(axis)))
    }
}

/// Tracks which keys are held and turns them into camera velocities.
#[derive(Debug, Clone)]
pub struct InputController {
    held: BTreeSet<Key>,
    speed: f32,
}

impl InputController {
    /// Every bound key moves its axis by `speed` per tick.
    pub fn new(speed: f32) -> Self {
        Self {
            held: BTreeSet::new(),
            speed,
        }
    }

    /// Marks `key` held. Returns `true` only on the up→down transition, so
    /// auto-repeat events report `false`.
    pub fn press(&mut self, key: Key) -> bool {
        self.held.insert(key)
    }

    pub fn release(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// Zeroes every axis, then adds the contribution of each held key.
    /// Opposing keys cancel.
    pub fn apply(&self, camera: &mut CameraState) {
        camera.reset();
        for &key in &self.held {
            if let Some((axis, sign)) = key.binding() {
                camera.add(axis, sign * self.speed);
            }
        }
    }
}
