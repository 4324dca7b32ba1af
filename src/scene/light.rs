use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Number of lights in a session.
pub const LIGHT_COUNT: usize = 2;

/// Light record shared with the backend.
///
/// Stride 48 bytes: two `vec4<f32>` then `radius`, `brightness` and two
/// padding floats to round the record up to a 16-byte multiple.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Light {
    /// Light position; `w = 0`, the xyz part is the position used for shading.
    pub position: Vec4,
    pub color: Vec4,
    /// Falloff radius
    pub radius: f32,
    /// Intensity multiplier
    pub brightness: f32,
    pub _pad: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<Light>() == 48);

impl Light {
    pub fn new(position: [f32; 3], color: [f32; 3], radius: f32, brightness: f32) -> Self {
        Self {
            position: Vec4::new(position[0], position[1], position[2], 0.0),
            color: Vec4::new(color[0], color[1], color[2], 0.0),
            radius,
            brightness,
            _pad: [0.0; 2],
        }
    }
}
