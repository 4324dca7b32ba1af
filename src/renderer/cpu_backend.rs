//! Software reference implementation of the two-pass backend.
//!
//! Mirrors the WGSL shaders: the transform pass maps one workgroup to one
//! triangle slot, the raytrace pass interpolates the corner rays per pixel
//! and shades the nearest hit with diffuse light and hard shadows.

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::camera::CameraUniform;
use crate::error::{SessionError, SessionResult};
use crate::renderer::backend::{BindingSlot, RaytraceBackend};
use crate::renderer::pixel_buffer::BYTES_PER_PIXEL;
use crate::renderer::PixelBuffer;
use crate::scene::{Light, Mesh, Triangle, TRIANGLE_SLOTS};

const AMBIENT: f32 = 0.1;
const BACKGROUND: Vec3 = Vec3::new(0.05, 0.05, 0.08);
const HIT_EPSILON: f32 = 1e-4;

/// CPU ray tracer honouring the backend buffer contract.
pub struct CpuBackend {
    width: u32,
    height: u32,
    meshes: Vec<Mesh>,
    transforms: Vec<Mat4>,
    lights: Vec<Light>,
    camera: CameraUniform,
    transformed: Vec<Triangle>,
    color: Vec<u8>,
}

impl CpuBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            meshes: Vec::new(),
            transforms: Vec::new(),
            lights: Vec::new(),
            camera: CameraUniform::default(),
            transformed: vec![Triangle::default(); TRIANGLE_SLOTS],
            color: vec![0; PixelBuffer::byte_len(width, height)],
        }
    }

    /// World-space triangles from the last transform pass.
    pub fn transformed(&self) -> &[Triangle] {
        &self.transformed
    }

    /// Map a workgroup id to (mesh, triangle) the way the compute shader does.
    fn slot_source(&self, slot: usize) -> Option<(usize, usize)> {
        let mut local = slot;
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            let count = mesh.triangles().len();
            if local < count {
                return Some((mesh_index, local));
            }
            local -= count;
        }
        None
    }

    fn trace_pixel(&self, s: f32, t: f32) -> Vec3 {
        let cam = &self.camera;
        let left = cam.ray00 * (1.0 - t) + cam.ray01 * t;
        let right = cam.ray10 * (1.0 - t) + cam.ray11 * t;
        let dir = (left * (1.0 - s) + right * s).truncate().normalize_or_zero();
        let origin = cam.eye.truncate();

        let Some((dist, tri)) = nearest_hit(&self.transformed, origin, dir, f32::INFINITY) else {
            return BACKGROUND;
        };

        let point = origin + dir * dist;
        let mut normal = tri.normal.truncate().normalize_or_zero();
        if normal.dot(dir) > 0.0 {
            normal = -normal;
        }
        let albedo = tri.color.truncate();

        let mut lit = albedo * AMBIENT;
        for light in &self.lights {
            let to_light = light.position.truncate() - point;
            let distance = to_light.length();
            if distance <= HIT_EPSILON {
                continue;
            }
            let l = to_light / distance;
            let diffuse = normal.dot(l);
            if diffuse <= 0.0 {
                continue;
            }
            let shadow_origin = point + normal * HIT_EPSILON * 10.0;
            if nearest_hit(&self.transformed, shadow_origin, l, distance).is_some() {
                continue;
            }
            let falloff = 1.0 / (1.0 + (distance / light.radius.max(HIT_EPSILON)).powi(2));
            lit += albedo * light.color.truncate() * diffuse * light.brightness * falloff;
        }
        lit
    }
}

/// Möller-Trumbore against every slot; zero-area triangles never hit.
fn nearest_hit(
    triangles: &[Triangle],
    origin: Vec3,
    dir: Vec3,
    max_dist: f32,
) -> Option<(f32, &Triangle)> {
    let mut best: Option<(f32, &Triangle)> = None;
    for tri in triangles {
        if let Some(dist) = intersect(tri, origin, dir) {
            if dist < max_dist && best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, tri));
            }
        }
    }
    best
}

fn intersect(tri: &Triangle, origin: Vec3, dir: Vec3) -> Option<f32> {
    let a = tri.a.truncate();
    let e1 = tri.b.truncate() - a;
    let e2 = tri.c.truncate() - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv = 1.0 / det;
    let tv = origin - a;
    let u = tv.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = tv.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let dist = e2.dot(q) * inv;
    (dist > HIT_EPSILON).then_some(dist)
}

fn to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl RaytraceBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn write_buffer(&mut self, slot: BindingSlot, bytes: &[u8]) -> SessionResult<()> {
        match slot {
            BindingSlot::Meshes => self.meshes = bytemuck::pod_collect_to_vec(bytes),
            BindingSlot::Transforms => self.transforms = bytemuck::pod_collect_to_vec(bytes),
            BindingSlot::Lights => self.lights = bytemuck::pod_collect_to_vec(bytes),
            BindingSlot::Transformed => self.transformed = bytemuck::pod_collect_to_vec(bytes),
        }
        Ok(())
    }

    fn set_camera(&mut self, camera: &CameraUniform) -> SessionResult<()> {
        self.camera = *camera;
        Ok(())
    }

    fn dispatch_transform(&mut self, workgroups: u32) -> SessionResult<()> {
        if self.transforms.len() < self.meshes.len() {
            return Err(SessionError::Backend(
                "transform pass dispatched before transforms were uploaded".into(),
            ));
        }
        self.transformed.resize(workgroups as usize, Triangle::default());

        for slot in 0..workgroups as usize {
            self.transformed[slot] = match self.slot_source(slot) {
                Some((mesh, tri)) => {
                    let m = self.transforms[mesh];
                    let src = &self.meshes[mesh].triangles()[tri];
                    let normal = m
                        .transform_vector3(src.normal.truncate())
                        .normalize_or_zero();
                    Triangle {
                        a: m * src.a,
                        b: m * src.b,
                        c: m * src.c,
                        normal: normal.extend(1.0),
                        color: src.color,
                    }
                }
                None => Triangle::default(),
            };
        }
        Ok(())
    }

    fn draw(&mut self) -> SessionResult<()> {
        let width = self.width as usize;
        let (w, h) = (self.width as f32, self.height as f32);
        let row_len = width * BYTES_PER_PIXEL;
        if row_len == 0 || self.height == 0 {
            return Ok(());
        }
        let mut color = std::mem::take(&mut self.color);

        color
            .par_chunks_exact_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                // row 0 is the top of the image
                let t = 1.0 - (y as f32 + 0.5) / h;
                for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                    let s = (x as f32 + 0.5) / w;
                    let c = self.trace_pixel(s, t);
                    px.copy_from_slice(&[to_byte(c.x), to_byte(c.y), to_byte(c.z)]);
                }
            });

        self.color = color;
        Ok(())
    }

    fn read_pixels(&mut self, target: &mut PixelBuffer) -> SessionResult<()> {
        if target.dimensions() != (self.width, self.height) {
            return Err(SessionError::Backend(format!(
                "readback target is {:?}, framebuffer is {}x{}",
                target.dimensions(),
                self.width,
                self.height
            )));
        }
        target.as_bytes_mut().copy_from_slice(&self.color);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> SessionResult<()> {
        self.width = width;
        self.height = height;
        self.color = vec![0; PixelBuffer::byte_len(width, height)];
        Ok(())
    }

    fn release(&mut self) {
        self.meshes.clear();
        self.transformed.clear();
        self.color = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraRays;
    use crate::renderer::uploader::SceneUploader;
    use crate::scene::{animate, ObjectSet};
    use glam::Vec4;

    fn rendered(width: u32, height: u32, time: f32) -> (CpuBackend, PixelBuffer) {
        let objects = ObjectSet::standard().unwrap();
        let mut uploader = SceneUploader::new(&objects).unwrap();
        let mut backend = CpuBackend::new(width, height);
        uploader.upload_static(&mut backend).unwrap();

        let rays = CameraRays::compute(
            Vec3::new(0.0, 8.0, 8.0),
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::Y,
            45.0,
            width as f32 / height as f32,
        )
        .unwrap();
        uploader
            .upload_frame(&mut backend, &animate(time), &rays)
            .unwrap();
        uploader.dispatch(&mut backend).unwrap();

        let mut pixels = PixelBuffer::new(width, height);
        backend.read_pixels(&mut pixels).unwrap();
        (backend, pixels)
    }

    #[test]
    fn test_transform_pass_fills_all_slots() {
        let (backend, _) = rendered(8, 8, 0.0);
        let tris = backend.transformed();
        assert_eq!(tris.len(), TRIANGLE_SLOTS);

        // floor scaled by 2 at t = 0
        assert_eq!(tris[0].a, Vec4::new(-10.0, 0.0, 10.0, 1.0));
        // first cube triangle: half size, centred at (2, 1.5, 0)
        assert!(tris[2]
            .a
            .abs_diff_eq(Vec4::new(1.75, 1.25, -0.25, 1.0), 1e-6));
    }

    #[test]
    fn test_ray_triangle_intersection() {
        let tri = Triangle::new(
            [-1.0, 0.0, -1.0],
            [1.0, 0.0, -1.0],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0],
            [1.0; 4],
        );
        let hit = intersect(&tri, Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y);
        assert!((hit.unwrap() - 5.0).abs() < 1e-5);
        assert_eq!(intersect(&tri, Vec3::new(5.0, 5.0, 0.0), Vec3::NEG_Y), None);
        assert_eq!(intersect(&Triangle::default(), Vec3::Y, Vec3::NEG_Y), None);
    }

    #[test]
    fn test_render_hits_floor_and_sky() {
        let (_, pixels) = rendered(32, 18, 0.0);
        // the camera looks down at the floor: the bottom centre is lit floor
        let floor = pixels.get_pixel(16, 17).unwrap();
        assert!(floor.iter().any(|&c| c > 40));
        // the top edge of the frame looks past the floor
        let sky = pixels.get_pixel(0, 0).unwrap();
        assert_eq!(sky, [to_byte(BACKGROUND.x), to_byte(BACKGROUND.y), to_byte(BACKGROUND.z)]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let (_, a) = rendered(24, 16, 2.0);
        let (_, b) = rendered(24, 16, 2.0);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_degenerate_cube_frame_renders_finite() {
        let t = 3.0 * std::f32::consts::FRAC_PI_2;
        assert!(crate::scene::animator::cube_scale(t).abs() < 1e-6);

        let (mut backend, pixels) = rendered(32, 18, t);
        // collapsed cube triangles must never register a hit
        for tri in &backend.transformed()[2..] {
            let area = (tri.b - tri.a).truncate().cross((tri.c - tri.a).truncate()).length();
            assert!(area < 1e-5);
            let eye = backend.camera.eye;
            assert_eq!(intersect(tri, eye.truncate(), (tri.a - eye).truncate()), None);
        }
        let trace_all = |backend: &CpuBackend| -> Vec<Vec3> {
            (0..18u32)
                .flat_map(|y| (0..32u32).map(move |x| (x, y)))
                .map(|(x, y)| backend.trace_pixel((x as f32 + 0.5) / 32.0, (y as f32 + 0.5) / 18.0))
                .collect()
        };
        let with_cube = trace_all(&backend);
        assert!(with_cube.iter().all(|c| c.is_finite()));

        // same picture as a scene holding only the floor
        backend.transformed[2..].fill(Triangle::default());
        assert_eq!(with_cube, trace_all(&backend));
        assert!(pixels.as_bytes().chunks(3).any(|px| px.iter().any(|&c| c > 40)));
    }

    #[test]
    fn test_readback_rejects_stale_dimensions() {
        let mut backend = CpuBackend::new(8, 8);
        let mut pixels = PixelBuffer::new(4, 4);
        assert!(backend.read_pixels(&mut pixels).is_err());
        backend.resize(4, 4).unwrap();
        backend.read_pixels(&mut pixels).unwrap();
    }
}
