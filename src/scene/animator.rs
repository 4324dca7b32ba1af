//! Video-time driven scene animation.
//!
//! Everything here is a pure function of video time so that re-running a
//! capture reproduces identical transforms and lights for every frame.

use glam::{Mat4, Vec3};

use super::geometry::OBJECT_COUNT;
use super::light::{Light, LIGHT_COUNT};

/// Animated state for one instant of video time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneFrame {
    pub transforms: [Mat4; OBJECT_COUNT],
    pub lights: [Light; LIGHT_COUNT],
}

/// Uniform scale of the ground plane; always >= 5/3.
pub fn ground_scale(t: f32) -> f32 {
    (t.sin() + 6.0) / 3.0
}

/// Uniform scale of the cube; pulses in [0, 1] and reaches 0 at 3π/2.
///
/// Zero-scale geometry is passed through untouched: the backend's
/// intersection test skips zero-area triangles.
pub fn cube_scale(t: f32) -> f32 {
    (1.0 + t.sin()) / 2.0
}

/// Cube orbit position at fixed height 1.5.
pub fn cube_position(t: f32) -> Vec3 {
    Vec3::new(2.0 * t.cos(), 1.5, 2.0 * t.sin())
}

/// Compute transforms and lights for `t` seconds of video time.
pub fn animate(t: f32) -> SceneFrame {
    let floor = Mat4::from_scale(Vec3::splat(ground_scale(t)));

    // translate * rotate * scale: scale applies to a point first
    let cube = Mat4::from_translation(cube_position(t))
        * Mat4::from_rotation_y(-t)
        * Mat4::from_scale(Vec3::splat(cube_scale(t)));

    let white = Light::new(
        [2.0 * t.sin(), 4.0, 2.0 * t.cos()],
        [1.0, 1.0, 1.0],
        7.0,
        1.0,
    );

    // Z stays at 4: this light sweeps along X only
    let red = Light::new([4.0 * t.cos(), 1.0, 4.0], [1.0, 0.0, 0.0], 2.0, 2.0);

    SceneFrame {
        transforms: [floor, cube],
        lights: [white, red],
    }
}
