//! Contract between the capture loop and a ray-tracing backend.
//!
//! A frame is a transform pass (one workgroup per triangle slot, writing
//! world-space triangles into [`BindingSlot::Transformed`]) followed by a
//! raytrace pass that shades every pixel from the transformed triangles,
//! the lights and the camera corner rays.

use std::mem::size_of;

use glam::Mat4;

use crate::camera::CameraUniform;
use crate::error::SessionResult;
use crate::renderer::PixelBuffer;
use crate::scene::{Light, Mesh, Triangle, LIGHT_COUNT, OBJECT_COUNT, TRIANGLE_SLOTS};

/// Fixed binding slots shared by both passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    /// World-space triangles written by the transform pass
    Transformed,
    /// Mesh records, uploaded once
    Meshes,
    /// One matrix per mesh, every frame
    Transforms,
    /// Light records, every frame
    Lights,
}

impl BindingSlot {
    pub const ALL: [BindingSlot; 4] = [
        BindingSlot::Transformed,
        BindingSlot::Meshes,
        BindingSlot::Transforms,
        BindingSlot::Lights,
    ];

    /// Binding index as declared in the shaders.
    pub const fn index(self) -> u32 {
        match self {
            Self::Transformed => 0,
            Self::Meshes => 1,
            Self::Transforms => 2,
            Self::Lights => 3,
        }
    }

    /// Exact byte size of the buffer bound here.
    pub const fn size(self) -> usize {
        match self {
            Self::Transformed => size_of::<Triangle>() * TRIANGLE_SLOTS,
            Self::Meshes => size_of::<Mesh>() * OBJECT_COUNT,
            Self::Transforms => size_of::<Mat4>() * OBJECT_COUNT,
            Self::Lights => size_of::<Light>() * LIGHT_COUNT,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Transformed => "transformed_triangles",
            Self::Meshes => "meshes",
            Self::Transforms => "transforms",
            Self::Lights => "lights",
        }
    }
}

/// Binding index of the camera uniform block.
pub const CAMERA_BINDING: u32 = 4;

/// Workgroups per transform dispatch: one per reserved triangle slot.
pub const TRANSFORM_WORKGROUPS: u32 = TRIANGLE_SLOTS as u32;

/// A GPU (or GPU-like) ray tracer driven by the capture loop.
pub trait RaytraceBackend {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Replace the contents of a bound buffer; `bytes.len()` equals `slot.size()`.
    fn write_buffer(&mut self, slot: BindingSlot, bytes: &[u8]) -> SessionResult<()>;

    /// Set the per-frame camera inputs.
    fn set_camera(&mut self, camera: &CameraUniform) -> SessionResult<()>;

    /// Run the transform pass.
    fn dispatch_transform(&mut self, workgroups: u32) -> SessionResult<()>;

    /// Run the raytrace pass; sees every write of the preceding transform pass.
    fn draw(&mut self) -> SessionResult<()>;

    /// Read the resolved image; `target` already has the current dimensions.
    fn read_pixels(&mut self, target: &mut PixelBuffer) -> SessionResult<()>;

    /// Change the output size.
    fn resize(&mut self, width: u32, height: u32) -> SessionResult<()>;

    /// Size change reported by the window collaborator since the last call.
    fn pending_resize(&mut self) -> Option<(u32, u32)> {
        None
    }

    /// Release pipelines and buffers. Called exactly once.
    fn release(&mut self) {}
}

impl<B: RaytraceBackend + ?Sized> RaytraceBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn write_buffer(&mut self, slot: BindingSlot, bytes: &[u8]) -> SessionResult<()> {
        (**self).write_buffer(slot, bytes)
    }

    fn set_camera(&mut self, camera: &CameraUniform) -> SessionResult<()> {
        (**self).set_camera(camera)
    }

    fn dispatch_transform(&mut self, workgroups: u32) -> SessionResult<()> {
        (**self).dispatch_transform(workgroups)
    }

    fn draw(&mut self) -> SessionResult<()> {
        (**self).draw()
    }

    fn read_pixels(&mut self, target: &mut PixelBuffer) -> SessionResult<()> {
        (**self).read_pixels(target)
    }

    fn resize(&mut self, width: u32, height: u32) -> SessionResult<()> {
        (**self).resize(width, height)
    }

    fn pending_resize(&mut self) -> Option<(u32, u32)> {
        (**self).pending_resize()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_sizes() {
        assert_eq!(BindingSlot::Transformed.size(), 80 * 14);
        assert_eq!(BindingSlot::Meshes.size(), 976 * 2);
        assert_eq!(BindingSlot::Transforms.size(), 64 * 2);
        assert_eq!(BindingSlot::Lights.size(), 48 * 2);
    }

    #[test]
    fn test_slot_indices_are_unique() {
        let mut indices: Vec<u32> = BindingSlot::ALL.iter().map(|s| s.index()).collect();
        indices.push(CAMERA_BINDING);
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 5);
    }
}
