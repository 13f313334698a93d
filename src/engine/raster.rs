use cgmath::{InnerSpace, Matrix3, Matrix4, Vector3, Vector4};

use crate::textures::{TextureImage, TextureSet, TextureSlot};

/// Clear colour of both backends, RGBA8.
pub const BACKGROUND: [u8; 4] = [26, 26, 26, 255];
/// Direction towards the single light; normalized at use.
pub const LIGHT_DIRECTION: [f32; 3] = [1.0, 1.0, 1.0];
pub const AMBIENT: f32 = 0.2;
pub const SHININESS: f32 = 32.0;

const MIN_CLIP_W: f32 = 1e-4;

/// Colour and depth targets. Storage exists only between `allocate` and
/// `release`; until then the buffer just tracks its size.
pub(crate) struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub color: Vec<u8>,
    depth: Vec<f32>,
    allocated: bool,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: Vec::new(),
            depth: Vec::new(),
            allocated: false,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn allocate(&mut self) {
        let pixels = self.width as usize * self.height as usize;
        self.color.resize(pixels * 4, 0);
        self.depth.resize(pixels, 1.0);
        self.allocated = true;
        self.clear();
    }

    pub fn release(&mut self) {
        self.color = Vec::new();
        self.depth = Vec::new();
        self.allocated = false;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if self.allocated {
            self.allocate();
        }
    }

    pub fn clear(&mut self) {
        for pixel in self.color.chunks_exact_mut(4) {
            pixel.copy_from_slice(&BACKGROUND);
        }
        self.depth.fill(1.0);
    }
}

/// One object as seen by the rasterizer.
pub(crate) struct Mesh<'a> {
    pub vertices: &'a [f32],
    pub indices: &'a [u32],
    pub model: Matrix4<f32>,
    pub normal: Matrix3<f32>,
    pub textures: &'a TextureSet,
}

struct ProjectedVertex {
    screen: [f32; 2],
    depth: f32,
    inv_w: f32,
    world: Vector3<f32>,
    normal: Vector3<f32>,
    uv: [f32; 2],
}

struct Surface<'a> {
    diffuse: &'a TextureImage,
    normal: &'a TextureImage,
    specular: &'a TextureImage,
    emission: &'a TextureImage,
    /// Takes normal-map directions from object space to world space.
    normal_matrix: Matrix3<f32>,
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

pub(crate) fn draw_mesh(
    frame: &mut FrameBuffer,
    view_proj: &Matrix4<f32>,
    camera: Vector3<f32>,
    mesh: &Mesh,
) {
    if !frame.allocated || frame.width == 0 || frame.height == 0 {
        return;
    }

    let defaults = TextureSlot::ALL.map(|slot| TextureImage::solid(slot.default_rgba()));
    let map = |slot: TextureSlot| mesh.textures.get(slot).unwrap_or(&defaults[slot.index()]);
    let surface = Surface {
        diffuse: map(TextureSlot::Diffuse),
        normal: map(TextureSlot::Normal),
        specular: map(TextureSlot::Specular),
        emission: map(TextureSlot::Emission),
        normal_matrix: mesh.normal,
    };

    let (width, height) = (frame.width as f32, frame.height as f32);
    let projected: Vec<Option<ProjectedVertex>> = mesh
        .vertices
        .chunks_exact(8)
        .map(|v| {
            let world = mesh.model * Vector4::new(v[0], v[1], v[2], 1.0);
            let clip = view_proj * world;
            if clip.w <= MIN_CLIP_W {
                return None;
            }
            let inv_w = 1.0 / clip.w;
            Some(ProjectedVertex {
                screen: [
                    (clip.x * inv_w * 0.5 + 0.5) * width,
                    (0.5 - clip.y * inv_w * 0.5) * height,
                ],
                depth: clip.z * inv_w,
                inv_w,
                world: world.truncate(),
                normal: mesh.normal * Vector3::new(v[3], v[4], v[5]),
                uv: [v[6], v[7]],
            })
        })
        .collect();

    for triangle in mesh.indices.chunks_exact(3) {
        let corner = |i: u32| projected.get(i as usize).and_then(Option::as_ref);
        if let (Some(a), Some(b), Some(c)) =
            (corner(triangle[0]), corner(triangle[1]), corner(triangle[2]))
        {
            fill_triangle(frame, camera, &surface, [a, b, c]);
        }
    }
}

fn fill_triangle(
    frame: &mut FrameBuffer,
    camera: Vector3<f32>,
    surface: &Surface,
    [a, b, c]: [&ProjectedVertex; 3],
) {
    // Counter-clockwise in clip space is clockwise once y points down.
    let area = edge(a.screen, b.screen, c.screen);
    if area >= 0.0 {
        return;
    }

    let xs = [a.screen[0], b.screen[0], c.screen[0]];
    let ys = [a.screen[1], b.screen[1], c.screen[1]];
    let min_x = xs.iter().copied().fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let min_y = ys.iter().copied().fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let max_x = (xs.iter().copied().fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
        .clamp(0, frame.width as i64) as u32;
    let max_y = (ys.iter().copied().fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
        .clamp(0, frame.height as i64) as u32;

    for py in min_y..max_y {
        for px in min_x..max_x {
            let p = [px as f32 + 0.5, py as f32 + 0.5];
            let wa = edge(b.screen, c.screen, p) / area;
            let wb = edge(c.screen, a.screen, p) / area;
            let wc = edge(a.screen, b.screen, p) / area;
            if wa < 0.0 || wb < 0.0 || wc < 0.0 {
                continue;
            }

            let depth = wa * a.depth + wb * b.depth + wc * c.depth;
            let index = (py * frame.width + px) as usize;
            if !(0.0..=1.0).contains(&depth) || depth > frame.depth[index] {
                continue;
            }

            // Perspective-correct weights.
            let (pa, pb, pc) = (wa * a.inv_w, wb * b.inv_w, wc * c.inv_w);
            let sum = pa + pb + pc;
            let (pa, pb, pc) = (pa / sum, pb / sum, pc / sum);

            let world = a.world * pa + b.world * pb + c.world * pc;
            let normal = a.normal * pa + b.normal * pb + c.normal * pc;
            let uv = [
                a.uv[0] * pa + b.uv[0] * pb + c.uv[0] * pc,
                a.uv[1] * pa + b.uv[1] * pb + c.uv[1] * pc,
            ];

            frame.depth[index] = depth;
            frame.color[index * 4..index * 4 + 4]
                .copy_from_slice(&shade(camera, surface, world, normal, uv));
        }
    }
}

/// Blends the interpolated normal towards the normal map by the map's alpha.
/// The default map has zero alpha and leaves the vertex normal untouched.
fn surface_normal(surface: &Surface, normal: Vector3<f32>, uv: [f32; 2]) -> Vector3<f32> {
    let normalized = |v: Vector3<f32>| {
        if v.magnitude2() > 0.0 {
            v.normalize()
        } else {
            v
        }
    };
    let vertex = normalized(normal);

    let texel = surface.normal.sample(uv[0], uv[1]);
    let weight = texel[3];
    if weight <= 0.0 {
        return vertex;
    }
    let mapped = normalized(
        surface.normal_matrix
            * Vector3::new(texel[0] * 2.0 - 1.0, texel[1] * 2.0 - 1.0, texel[2] * 2.0 - 1.0),
    );
    normalized(vertex * (1.0 - weight) + mapped * weight)
}

fn shade(
    camera: Vector3<f32>,
    surface: &Surface,
    world: Vector3<f32>,
    normal: Vector3<f32>,
    uv: [f32; 2],
) -> [u8; 4] {
    let diffuse_color = surface.diffuse.sample(uv[0], uv[1]);
    let specular_color = surface.specular.sample(uv[0], uv[1]);
    let emission = surface.emission.sample(uv[0], uv[1]);

    let n = surface_normal(surface, normal, uv);
    let light = Vector3::from(LIGHT_DIRECTION).normalize();
    let to_camera = camera - world;
    let view = if to_camera.magnitude2() > 0.0 {
        to_camera.normalize()
    } else {
        light
    };

    let diffuse = n.dot(light).max(0.0);
    let halfway = (light + view).normalize();
    let specular = n.dot(halfway).max(0.0).powf(SHININESS) * specular_color[0];

    let mut out = [255u8; 4];
    for i in 0..3 {
        let value = AMBIENT * diffuse_color[i] + diffuse_color[i] * diffuse + specular + emission[i];
        out[i] = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn orthographic_identity_frame() -> FrameBuffer {
        let mut frame = FrameBuffer::new(8, 8);
        frame.allocate();
        frame
    }

    fn vertex(x: f32, y: f32, z: f32) -> [f32; 8] {
        [x, y, z, 0.0, 0.0, 1.0, 0.0, 0.0]
    }

    #[test]
    fn clear_fills_background() {
        let mut frame = FrameBuffer::new(3, 2);
        frame.allocate();
        assert_eq!(frame.color.len(), 3 * 2 * 4);
        assert!(frame.color.chunks_exact(4).all(|p| p == BACKGROUND));
    }

    #[test]
    fn storage_follows_allocation() {
        let mut frame = FrameBuffer::new(4, 4);
        assert!(!frame.is_allocated());
        frame.resize(16, 16);
        assert!(frame.color.is_empty());

        frame.allocate();
        assert_eq!(frame.color.len(), 16 * 16 * 4);
        frame.resize(2, 3);
        assert_eq!(frame.color.len(), 2 * 3 * 4);

        frame.release();
        assert!(frame.color.is_empty());
        frame.resize(8, 8);
        assert!(frame.color.is_empty());
        assert_eq!((frame.width, frame.height), (8, 8));
    }

    #[test]
    fn covers_pixels_and_culls_back_faces() {
        let vertices: Vec<f32> = [
            vertex(-1.0, -1.0, 0.5),
            vertex(1.0, -1.0, 0.5),
            vertex(1.0, 1.0, 0.5),
        ]
        .concat();
        let textures = TextureSet::new();
        let camera = Vector3::new(0.0, 0.0, 5.0);

        let mut frame = orthographic_identity_frame();
        let front = Mesh {
            vertices: &vertices,
            indices: &[0, 1, 2],
            model: Matrix4::identity(),
            normal: Matrix3::identity(),
            textures: &textures,
        };
        draw_mesh(&mut frame, &Matrix4::identity(), camera, &front);
        // Bottom-right pixel lies inside the triangle, top-left outside.
        let inside = ((6 * 8 + 6) * 4) as usize;
        assert_ne!(&frame.color[inside..inside + 4], &BACKGROUND);
        assert_eq!(&frame.color[0..4], &BACKGROUND);

        let mut frame = orthographic_identity_frame();
        let back = Mesh {
            indices: &[0, 2, 1],
            ..front
        };
        draw_mesh(&mut frame, &Matrix4::identity(), camera, &back);
        assert!(frame.color.chunks_exact(4).all(|p| p == BACKGROUND));
    }

    #[test]
    fn nearer_triangle_wins() {
        let vertices: Vec<f32> = [
            vertex(-1.0, -1.0, 0.8),
            vertex(1.0, -1.0, 0.8),
            vertex(0.0, 1.0, 0.8),
            vertex(-1.0, -1.0, 0.2),
            vertex(1.0, -1.0, 0.2),
            vertex(0.0, 1.0, 0.2),
        ]
        .concat();
        let mut textures = TextureSet::new();
        textures.set(TextureSlot::Emission, Some(TextureImage::solid([255, 0, 0, 255])));
        textures.set(TextureSlot::Diffuse, Some(TextureImage::solid([0, 0, 0, 255])));
        textures.set(TextureSlot::Specular, Some(TextureImage::solid([0, 0, 0, 255])));

        let mut frame = orthographic_identity_frame();
        let mesh = Mesh {
            vertices: &vertices,
            indices: &[3, 4, 5, 0, 1, 2],
            model: Matrix4::identity(),
            normal: Matrix3::identity(),
            textures: &textures,
        };
        draw_mesh(&mut frame, &Matrix4::identity(), Vector3::new(0.0, 0.0, 5.0), &mesh);

        let center = ((4 * 8 + 4) * 4) as usize;
        assert_eq!(&frame.color[center..center + 4], &[255, 0, 0, 255]);
        assert!((frame.depth[4 * 8 + 4] - 0.2).abs() < 1e-5);
    }

    #[test]
    fn shading_matches_fixed_light() {
        let textures = TextureSet::new();
        let defaults = TextureSlot::ALL.map(|slot| TextureImage::solid(slot.default_rgba()));
        let surface = Surface {
            diffuse: textures.get(TextureSlot::Diffuse).unwrap_or(&defaults[0]),
            normal: textures.get(TextureSlot::Normal).unwrap_or(&defaults[1]),
            specular: textures.get(TextureSlot::Specular).unwrap_or(&defaults[2]),
            emission: textures.get(TextureSlot::Emission).unwrap_or(&defaults[3]),
            normal_matrix: Matrix3::identity(),
        };

        // Facing away from the light: ambient only on a white surface.
        let dark = shade(
            Vector3::new(0.0, 0.0, -5.0),
            &surface,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(-1.0, -1.0, -1.0),
            [0.0, 0.0],
        );
        assert_eq!(dark, [51, 51, 51, 255]);

        // The default normal map leaves a lit surface lit.
        let lit = shade(
            Vector3::new(0.0, 0.0, 5.0),
            &surface,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            [0.0, 0.0],
        );
        assert!(lit[0] > 51);
    }

    #[test]
    fn normal_map_replaces_vertex_normals() {
        let vertices: Vec<f32> = [
            vertex(-1.0, -1.0, 0.5),
            vertex(1.0, -1.0, 0.5),
            vertex(1.0, 1.0, 0.5),
        ]
        .concat();
        let camera = Vector3::new(0.0, 0.0, 5.0);
        let render = |textures: &TextureSet| {
            let mut frame = orthographic_identity_frame();
            let mesh = Mesh {
                vertices: &vertices,
                indices: &[0, 1, 2],
                model: Matrix4::identity(),
                normal: Matrix3::identity(),
                textures,
            };
            draw_mesh(&mut frame, &Matrix4::identity(), camera, &mesh);
            frame.color
        };

        let plain = render(&TextureSet::new());
        let mut mapped_textures = TextureSet::new();
        // Decodes to (1, -1, -1): facing away from the light.
        mapped_textures.set(TextureSlot::Normal, Some(TextureImage::solid([255, 0, 0, 255])));
        let mapped = render(&mapped_textures);

        let inside = ((6 * 8 + 6) * 4) as usize;
        assert_ne!(plain, mapped);
        assert!(plain[inside] > 51);
        assert_eq!(&mapped[inside..inside + 4], &[51, 51, 51, 255]);
    }
}
