use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use cgmath::{EuclideanSpace, InnerSpace, Matrix3, Matrix4, Point3, SquareMatrix, Vector3};

use super::raster::{self, FrameBuffer, Mesh};
use super::{CameraAxis, EngineError, NumericEngine, ObjectHandle};
use crate::math;
use crate::textures::{TextureImage, TextureSet, TextureSlot};

const FLOATS_PER_VERTEX: usize = 8;
const DEFAULT_NORMAL: [f32; 3] = [0.0, 0.0, 1.0];
const DEFAULT_TEXCOORD: [f32; 2] = [0.0, 0.0];
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;
const WORLD_UP: Vector3<f32> = Vector3 {
    x: 0.0,
    y: 1.0,
    z: 0.0,
};

struct Camera {
    position: Point3<f32>,
    yaw: f32,
    pitch: f32,
    fov_y: f32,
    near: f32,
    far: f32,
}

impl Camera {
    fn new() -> Self {
        let front = Vector3::new(-1.0f32, -1.0, -1.0).normalize();
        Self {
            position: Point3::new(1.5, 1.5, 1.5),
            yaw: front.z.atan2(front.x),
            pitch: front.y.asin(),
            fov_y: FRAC_PI_4,
            near: 0.1,
            far: 10.0,
        }
    }

    fn front(&self) -> Vector3<f32> {
        Vector3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
    }

    fn step(&mut self, velocity: &[f32; 5]) {
        self.yaw += velocity[CameraAxis::Yaw.index()];
        self.pitch =
            (self.pitch - velocity[CameraAxis::Pitch.index()]).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let front = self.front();
        let right = front.cross(WORLD_UP).normalize();
        let up = right.cross(front).normalize();
        self.position += right * velocity[CameraAxis::Right.index()]
            + up * velocity[CameraAxis::Up.index()]
            + front * velocity[CameraAxis::Forward.index()];
    }

    fn view(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.front(), WORLD_UP)
    }
}

struct Object {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    faces: Vec<[u32; 9]>,
    records: HashMap<(u32, u32, u32), u32>,
    vertex_data: Vec<f32>,
    index_data: Vec<u32>,
    position: [f32; 3],
    scale: f32,
    rotation: [f32; 3],
    textures: TextureSet,
    model: Matrix4<f32>,
}

impl Object {
    fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            faces: Vec::new(),
            records: HashMap::new(),
            vertex_data: Vec::new(),
            index_data: Vec::new(),
            position: [0.0; 3],
            scale: 1.0,
            rotation: [0.0; 3],
            textures: TextureSet::new(),
            model: Matrix4::identity(),
        }
    }

    fn emit(&mut self, face: &[u32; 9]) {
        for corner in face.chunks_exact(3) {
            let key = (corner[0], corner[1], corner[2]);
            let index = match self.records.get(&key) {
                Some(&index) => index,
                None => {
                    let index = (self.vertex_data.len() / FLOATS_PER_VERTEX) as u32;
                    let position = self.positions[corner[0] as usize];
                    let texcoord = self
                        .texcoords
                        .get(corner[1] as usize)
                        .copied()
                        .unwrap_or(DEFAULT_TEXCOORD);
                    let normal = self
                        .normals
                        .get(corner[2] as usize)
                        .copied()
                        .unwrap_or(DEFAULT_NORMAL);
                    self.vertex_data.extend_from_slice(&position);
                    self.vertex_data.extend_from_slice(&normal);
                    self.vertex_data.extend_from_slice(&texcoord);
                    self.records.insert(key, index);
                    index
                }
            };
            self.index_data.push(index);
        }
    }

    /// Re-derives every record; needed when a late normal or texcoord changes
    /// what an already emitted record would contain.
    fn rebuild(&mut self) {
        self.records.clear();
        self.vertex_data.clear();
        self.index_data.clear();
        let faces = std::mem::take(&mut self.faces);
        for face in &faces {
            self.emit(face);
        }
        self.faces = faces;
    }

    fn update_model(&mut self) {
        let [x, y, z] = self.position;
        let [ax, ay, az] = self.rotation;
        self.model = math::compose(
            &math::translation(x, y, z),
            &math::uniform_scale(self.scale),
            &math::euler_rotation(ax, ay, az),
        );
    }
}

/// Reference [`NumericEngine`]: an indexed mesh store, a free-flying camera
/// and an optional CPU rasterizer.
pub struct SceneEngine {
    objects: Vec<Object>,
    camera: Camera,
    velocity: [f32; 5],
    view_proj: Matrix4<f32>,
    frame: FrameBuffer,
    raster_output: bool,
}

impl SceneEngine {
    pub fn new(width: u32, height: u32) -> Self {
        let mut engine = Self {
            objects: Vec::new(),
            camera: Camera::new(),
            velocity: [0.0; 5],
            view_proj: Matrix4::identity(),
            frame: FrameBuffer::new(width, height),
            raster_output: false,
        };
        engine.update_view_proj();
        engine
    }

    /// World-space translation of an object (the `T` in `T * S * R`).
    pub fn set_position(&mut self, object: ObjectHandle, x: f32, y: f32, z: f32) {
        if let Some(o) = self.object_mut(object) {
            o.position = [x, y, z];
        }
    }

    fn object(&self, handle: ObjectHandle) -> Option<&Object> {
        self.objects.get(handle.0 as usize)
    }

    fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object> {
        let object = self.objects.get_mut(handle.0 as usize);
        if object.is_none() {
            log::warn!("ignoring update for unknown object {:?}", handle);
        }
        object
    }

    fn aspect(&self) -> f32 {
        self.frame.width.max(1) as f32 / self.frame.height.max(1) as f32
    }

    fn update_view_proj(&mut self) {
        let projection = math::perspective_zero_to_one(
            self.camera.fov_y,
            self.aspect(),
            self.camera.near,
            self.camera.far,
        );
        self.view_proj = projection * self.camera.view();
    }

    fn rasterize(&mut self) {
        self.frame.clear();
        let camera = self.camera.position.to_vec();
        for object in &self.objects {
            let mesh = Mesh {
                vertices: &object.vertex_data,
                indices: &object.index_data,
                model: object.model,
                normal: math::normal_matrix(&object.model).unwrap_or_else(Matrix3::identity),
                textures: &object.textures,
            };
            raster::draw_mesh(&mut self.frame, &self.view_proj, camera, &mesh);
        }
    }
}

impl NumericEngine for SceneEngine {
    fn new_object(&mut self) -> ObjectHandle {
        self.objects.push(Object::new());
        ObjectHandle(self.objects.len() as u32 - 1)
    }

    fn add_vertex(&mut self, object: ObjectHandle, x: f32, y: f32, z: f32) {
        if let Some(o) = self.object_mut(object) {
            o.positions.push([x, y, z]);
        }
    }

    fn add_vertex_normal(&mut self, object: ObjectHandle, x: f32, y: f32, z: f32) {
        if let Some(o) = self.object_mut(object) {
            o.normals.push([x, y, z]);
            if !o.faces.is_empty() {
                o.rebuild();
            }
        }
    }

    fn add_texture_vertex(&mut self, object: ObjectHandle, u: f32, v: f32, _w: f32) {
        if let Some(o) = self.object_mut(object) {
            o.texcoords.push([u, v]);
            if !o.faces.is_empty() {
                o.rebuild();
            }
        }
    }

    fn add_face(&mut self, object: ObjectHandle, indices: [u32; 9]) -> Result<(), EngineError> {
        let o = self
            .objects
            .get_mut(object.0 as usize)
            .ok_or(EngineError::UnknownObject(object))?;
        for corner in indices.chunks_exact(3) {
            if corner[0] as usize >= o.positions.len() {
                return Err(EngineError::VertexOutOfRange {
                    index: corner[0],
                    count: o.positions.len(),
                });
            }
        }
        o.emit(&indices);
        o.faces.push(indices);
        Ok(())
    }

    fn set_scale(&mut self, object: ObjectHandle, scale: f32) {
        if let Some(o) = self.object_mut(object) {
            o.scale = scale;
        }
    }

    fn set_rotation(&mut self, object: ObjectHandle, angle_x: f32, angle_y: f32, angle_z: f32) {
        if let Some(o) = self.object_mut(object) {
            o.rotation = [angle_x, angle_y, angle_z];
        }
    }

    fn set_texture(&mut self, object: ObjectHandle, slot: TextureSlot, image: Option<TextureImage>) {
        if let Some(o) = self.object_mut(object) {
            o.textures.set(slot, image);
        }
    }

    fn set_camera_param(&mut self, axis: CameraAxis, value: f32) {
        self.velocity[axis.index()] = value;
    }

    fn set_raster_output(&mut self, enabled: bool) {
        self.raster_output = enabled;
        if enabled && !self.frame.is_allocated() {
            self.frame.allocate();
        } else if !enabled {
            self.frame.release();
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.frame.resize(width, height);
        self.update_view_proj();
    }

    fn compute(&mut self) {
        self.camera.step(&self.velocity);
        self.update_view_proj();
        for object in &mut self.objects {
            object.update_model();
        }
        if self.raster_output {
            self.rasterize();
        }
    }

    fn view_projection_matrix(&self) -> [f32; 16] {
        math::to_column_array(&self.view_proj)
    }

    fn model_matrix(&self, object: ObjectHandle) -> [f32; 16] {
        let model = self.object(object).map_or_else(Matrix4::identity, |o| o.model);
        math::to_column_array(&model)
    }

    fn camera_position(&self) -> [f32; 3] {
        let p = self.camera.position;
        [p.x, p.y, p.z]
    }

    fn vertex_data(&self, object: ObjectHandle) -> &[f32] {
        self.object(object).map_or(&[][..], |o| o.vertex_data.as_slice())
    }

    fn index_data(&self, object: ObjectHandle) -> &[u32] {
        self.object(object).map_or(&[][..], |o| o.index_data.as_slice())
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn pixels(&self) -> &[u8] {
        &self.frame.color
    }
}
