//! Pinhole camera to corner-ray conversion.
//!
//! The backend reconstructs each pixel's view direction by bilinear
//! interpolation of four corner rays, so the camera is handed over as an eye
//! position plus those rays rather than as view/projection matrices.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Eye position and the four corner rays for one frame.
///
/// Naming follows screen coordinates `(s, t)`: `ray00` bottom-left,
/// `ray01` top-left, `ray10` bottom-right, `ray11` top-right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraRays {
    pub eye: Vec3,
    pub ray00: Vec3,
    pub ray01: Vec3,
    pub ray10: Vec3,
    pub ray11: Vec3,
}

/// Camera inputs as the backend receives them. Stride 80 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub eye: Vec4,
    pub ray00: Vec4,
    pub ray01: Vec4,
    pub ray10: Vec4,
    pub ray11: Vec4,
}

const _: () = assert!(std::mem::size_of::<CameraUniform>() == 80);

impl CameraRays {
    /// Compute the corner rays for a pinhole camera.
    ///
    /// The horizontal half-angle is `fov * aspect / 2`. Each screen half first
    /// turns the centre ray about camera-up, then tilts it about the camera-right
    /// vector after that vector has received the same horizontal turn, so the
    /// four rays stay on a rectangular frustum.
    pub fn compute(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_degrees: f32,
        aspect: f32,
    ) -> SessionResult<Self> {
        validate_projection(fov_degrees, aspect)?;

        let center = target - eye;
        if center.length_squared() <= f32::EPSILON {
            return Err(SessionError::config("camera eye and target coincide"));
        }

        let w = -center;
        let u = up.cross(w);
        if u.length_squared() <= f32::EPSILON * w.length_squared() * up.length_squared() {
            return Err(SessionError::config(
                "camera up vector is parallel to the view direction",
            ));
        }
        let v = w.cross(u).normalize();

        let h_half = (fov_degrees * aspect / 2.0).to_radians();
        let v_half = (fov_degrees / 2.0).to_radians();

        // positive turn about camera-up swings toward the left edge
        let turn_left = Quat::from_axis_angle(v, h_half);
        let turn_right = Quat::from_axis_angle(v, -h_half);

        let right_of_left = (turn_left * u).normalize();
        let right_of_right = (turn_right * u).normalize();

        let left = turn_left * center;
        let right = turn_right * center;

        // positive tilt about camera-right lifts toward the top edge
        Ok(Self {
            eye,
            ray00: Quat::from_axis_angle(right_of_left, -v_half) * left,
            ray01: Quat::from_axis_angle(right_of_left, v_half) * left,
            ray10: Quat::from_axis_angle(right_of_right, -v_half) * right,
            ray11: Quat::from_axis_angle(right_of_right, v_half) * right,
        })
    }

    /// Interpolated view direction at normalized screen coordinates.
    ///
    /// Uses the `a * (1 - s) + b * s` form so the corners reproduce their ray exactly.
    pub fn interpolate(&self, s: f32, t: f32) -> Vec3 {
        let left = self.ray00 * (1.0 - t) + self.ray01 * t;
        let right = self.ray10 * (1.0 - t) + self.ray11 * t;
        left * (1.0 - s) + right * s
    }

    /// Pack for upload.
    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            eye: self.eye.extend(1.0),
            ray00: self.ray00.extend(0.0),
            ray01: self.ray01.extend(0.0),
            ray10: self.ray10.extend(0.0),
            ray11: self.ray11.extend(0.0),
        }
    }
}

fn validate_projection(fov_degrees: f32, aspect: f32) -> SessionResult<()> {
    if !(fov_degrees > 0.0 && fov_degrees < 180.0) {
        return Err(SessionError::config(format!(
            "vertical field of view must be in (0, 180) degrees, got {fov_degrees}"
        )));
    }
    if !(aspect > 0.0 && aspect.is_finite()) {
        return Err(SessionError::config(format!(
            "aspect ratio must be positive, got {aspect}"
        )));
    }
    Ok(())
}

/// Where the eye sits at a given video time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EyePath {
    /// Fixed position
    Fixed { position: [f32; 3] },
    /// Circle around the look target
    Orbit {
        radius: f32,
        height: f32,
        /// Radians per second of video time
        speed: f32,
    },
}

impl EyePath {
    pub fn eye_at(&self, target: Vec3, video_time: f32) -> Vec3 {
        match *self {
            Self::Fixed { position } => Vec3::from_array(position),
            Self::Orbit {
                radius,
                height,
                speed,
            } => {
                let angle = speed * video_time;
                Vec3::new(
                    target.x + radius * angle.sin(),
                    height,
                    target.z + radius * angle.cos(),
                )
            }
        }
    }
}

/// Fixed camera description; only the eye may move with video time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub path: EyePath,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_degrees: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            path: EyePath::Fixed {
                position: [0.0, 8.0, 8.0],
            },
            target: Vec3::new(0.0, 0.5, 0.0),
            up: Vec3::Y,
            fov_degrees: 45.0,
        }
    }
}

impl CameraRig {
    /// Corner rays for `video_time` at the given output size.
    pub fn rays_at(&self, video_time: f32, width: u32, height: u32) -> SessionResult<CameraRays> {
        if width == 0 || height == 0 {
            return Err(SessionError::config(format!(
                "viewport {width}x{height} has no area"
            )));
        }
        let aspect = width as f32 / height as f32;
        let eye = self.path.eye_at(self.target, video_time);
        CameraRays::compute(eye, self.target, self.up, self.fov_degrees, aspect)
    }
}
