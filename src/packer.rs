use cgmath::{Matrix3, SquareMatrix};

use crate::engine::{NumericEngine, ObjectHandle};
use crate::math;

/// Largest vertex count that still fits 16-bit indices (indices 0..=65534).
pub const MAX_U16_VERTICES: usize = u16::MAX as usize;

pub const UNIFORM_BLOCK_SIZE: usize = 320;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// The per-frame uniform buffer contents. Field offsets are part of the
/// contract with `shader.wgsl`: view_proj 0, model 64, normal 128,
/// camera_position 176, 320 bytes total.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformBlock {
    pub view_proj: [f32; 16],
    pub model: [f32; 16],
    /// Normal matrix columns, each padded to a vec4.
    pub normal: [[f32; 4]; 3],
    pub camera_position: [f32; 3],
    pub _padding: [f32; 33],
}

impl UniformBlock {
    pub fn new(
        view_proj: [f32; 16],
        model: [f32; 16],
        normal: &Matrix3<f32>,
        camera_position: [f32; 3],
    ) -> Self {
        let column = |c: cgmath::Vector3<f32>| [c.x, c.y, c.z, 0.0];
        Self {
            view_proj,
            model,
            normal: [column(normal.x), column(normal.y), column(normal.z)],
            camera_position,
            _padding: [0.0; 33],
        }
    }

    pub fn identity() -> Self {
        let identity = math::to_column_array(&cgmath::Matrix4::identity());
        Self::new(identity, identity, &Matrix3::identity(), [0.0; 3])
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(indices) => indices.len(),
            IndexData::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(indices) => bytemuck::cast_slice(indices),
            IndexData::U32(indices) => bytemuck::cast_slice(indices),
        }
    }

    pub fn max_index(&self) -> Option<u32> {
        match self {
            IndexData::U16(indices) => indices.iter().max().map(|&i| i as u32),
            IndexData::U32(indices) => indices.iter().max().copied(),
        }
    }
}

/// Index width depends only on how many vertices have to be addressed.
pub fn index_format_for(vertex_count: usize) -> wgpu::IndexFormat {
    if vertex_count > MAX_U16_VERTICES {
        wgpu::IndexFormat::Uint32
    } else {
        wgpu::IndexFormat::Uint16
    }
}

pub fn pack_vertices(data: &[f32]) -> Vec<Vertex> {
    data.chunks_exact(8)
        .map(|v| Vertex {
            position: [v[0], v[1], v[2]],
            normal: [v[3], v[4], v[5]],
            tex_coords: [v[6], v[7]],
        })
        .collect()
}

pub fn pack_indices(indices: &[u32], vertex_count: usize) -> IndexData {
    match index_format_for(vertex_count) {
        wgpu::IndexFormat::Uint16 => IndexData::U16(indices.iter().map(|&i| i as u16).collect()),
        wgpu::IndexFormat::Uint32 => IndexData::U32(indices.to_vec()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBuffers {
    pub vertices: Vec<Vertex>,
    pub indices: IndexData,
}

impl GeometryBuffers {
    /// Non-empty, and every index addresses an emitted vertex.
    pub fn is_drawable(&self) -> bool {
        match self.indices.max_index() {
            Some(max) => (max as usize) < self.vertices.len(),
            None => false,
        }
    }
}

pub fn pack_geometry(engine: &dyn NumericEngine, object: ObjectHandle) -> GeometryBuffers {
    let vertices = pack_vertices(engine.vertex_data(object));
    let indices = pack_indices(engine.index_data(object), vertices.len());
    GeometryBuffers { vertices, indices }
}

/// Holds the last invertible normal matrix so a singular model transform
/// never reaches the GPU as NaN.
#[derive(Debug, Clone)]
pub struct NormalMatrixCache {
    last: Matrix3<f32>,
    degenerate: bool,
}

impl Default for NormalMatrixCache {
    fn default() -> Self {
        Self {
            last: Matrix3::identity(),
            degenerate: false,
        }
    }
}

impl NormalMatrixCache {
    pub fn update(&mut self, model: &cgmath::Matrix4<f32>) -> Matrix3<f32> {
        match math::normal_matrix(model) {
            Some(normal) => {
                self.last = normal;
                self.degenerate = false;
            }
            None => {
                if !self.degenerate {
                    log::warn!("model matrix is singular; keeping the previous normal matrix");
                }
                self.degenerate = true;
            }
        }
        self.last
    }
}

/// Reads back the engine's transforms after `compute` and lays them out for
/// the uniform buffer.
pub fn pack_uniforms(
    engine: &dyn NumericEngine,
    object: ObjectHandle,
    normals: &mut NormalMatrixCache,
) -> UniformBlock {
    let model = engine.model_matrix(object);
    let normal = normals.update(&math::from_column_array(&model));
    UniformBlock::new(
        engine.view_projection_matrix(),
        model,
        &normal,
        engine.camera_position(),
    )
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;
    use crate::engine::SceneEngine;

    #[test]
    fn uniform_layout_matches_shader() {
        assert_eq!(size_of::<UniformBlock>(), UNIFORM_BLOCK_SIZE);
        assert_eq!(size_of::<UniformBlock>() / 4, 80);
        assert_eq!(offset_of!(UniformBlock, view_proj), 0);
        assert_eq!(offset_of!(UniformBlock, model), 64);
        assert_eq!(offset_of!(UniformBlock, normal), 128);
        assert_eq!(offset_of!(UniformBlock, camera_position), 176);
        assert_eq!(size_of::<Vertex>(), 32);
    }

    #[test]
    fn normal_matrix_columns_are_padded() {
        let normal = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let block = UniformBlock::new([0.0; 16], [0.0; 16], &normal, [7.0, 8.0, 9.0]);
        let floats: &[f32] = bytemuck::cast_slice(block.as_bytes());
        assert_eq!(
            &floats[32..44],
            &[1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0, 7.0, 8.0, 9.0, 0.0]
        );
        assert_eq!(&floats[44..47], &[7.0, 8.0, 9.0]);
        assert!(floats[47..].iter().all(|&f| f == 0.0));
    }

    #[test]
    fn index_width_switches_at_u16_range() {
        assert_eq!(index_format_for(0), wgpu::IndexFormat::Uint16);
        assert_eq!(index_format_for(65535), wgpu::IndexFormat::Uint16);
        assert_eq!(index_format_for(65536), wgpu::IndexFormat::Uint32);

        let small = pack_indices(&[0, 1, 65534], 65535);
        assert_eq!(small, IndexData::U16(vec![0, 1, 65534]));
        assert_eq!(small.as_bytes().len(), 6);

        let large = pack_indices(&[0, 65535], 65536);
        assert_eq!(large.format(), wgpu::IndexFormat::Uint32);
        assert_eq!(large.max_index(), Some(65535));
    }

    #[test]
    fn singular_model_keeps_previous_normal_matrix() {
        let mut cache = NormalMatrixCache::default();
        let first = cache.update(&cgmath::Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0));
        assert!((first.x.x - 0.5).abs() < 1e-6);

        let kept = cache.update(&cgmath::Matrix4::from_scale(0.0));
        assert_eq!(kept, first);

        let fresh = NormalMatrixCache::default().update(&cgmath::Matrix4::from_scale(0.0));
        assert_eq!(fresh, Matrix3::identity());
    }

    #[test]
    fn cube_packs_one_record_per_unique_corner() {
        #[rustfmt::skip]
        const CORNERS: [[f32; 3]; 8] = [
            [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0],
            [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [-1.0,  1.0, -1.0],
        ];
        #[rustfmt::skip]
        const TRIANGLES: [[u32; 3]; 12] = [
            [0, 1, 2], [2, 3, 0], // front
            [4, 6, 5], [6, 4, 7], // back
            [4, 0, 3], [3, 7, 4], // left
            [1, 5, 6], [6, 2, 1], // right
            [3, 2, 6], [6, 7, 3], // top
            [4, 5, 1], [1, 0, 4], // bottom
        ];

        let mut engine = SceneEngine::new(8, 8);
        let cube = engine.new_object();
        for [x, y, z] in CORNERS {
            engine.add_vertex(cube, x, y, z);
        }
        engine.add_texture_vertex(cube, 0.0, 0.0, 0.0);
        engine.add_texture_vertex(cube, 1.0, 1.0, 0.0);
        for (i, [a, b, c]) in TRIANGLES.into_iter().enumerate() {
            // The top face gets its own texcoord, so its four corners are
            // emitted a second time.
            let vt = if (8..10).contains(&i) { 1 } else { 0 };
            engine
                .add_face(cube, [a, vt, 0, b, vt, 0, c, vt, 0])
                .unwrap();
        }
        engine.compute();

        let geometry = pack_geometry(&engine, cube);
        assert_eq!(engine.vertex_data(cube).len(), 96);
        assert_eq!(geometry.vertices.len(), 12);
        assert_eq!(geometry.indices.len(), 36);
        assert_eq!(geometry.indices.format(), wgpu::IndexFormat::Uint16);
        assert!(geometry.indices.max_index().unwrap() < geometry.vertices.len() as u32);
        assert!(geometry.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
        assert!(geometry.is_drawable());
    }

    #[test]
    fn geometry_with_stray_indices_is_not_drawable() {
        let vertex = Vertex {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            tex_coords: [0.0; 2],
        };
        let in_range = GeometryBuffers {
            vertices: vec![vertex; 3],
            indices: IndexData::U16(vec![0, 1, 2]),
        };
        assert!(in_range.is_drawable());

        let stray = GeometryBuffers {
            vertices: vec![vertex; 3],
            indices: IndexData::U16(vec![0, 1, 3]),
        };
        assert!(!stray.is_drawable());

        let empty = GeometryBuffers {
            vertices: vec![vertex; 3],
            indices: IndexData::U16(Vec::new()),
        };
        assert!(!empty.is_drawable());
    }

    #[test]
    fn uniforms_come_from_the_engine() {
        let mut engine = SceneEngine::new(4, 4);
        let h = engine.new_object();
        engine.set_scale(h, 0.1);
        engine.compute();

        let mut cache = NormalMatrixCache::default();
        let block = pack_uniforms(&engine, h, &mut cache);
        assert_eq!(block.view_proj, engine.view_projection_matrix());
        assert_eq!(block.model[0], 0.1);
        assert!((block.normal[0][0] - 10.0).abs() < 1e-4);
        assert_eq!(block.camera_position, [1.5, 1.5, 1.5]);
    }
}
