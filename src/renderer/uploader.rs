use log::debug;

use crate::camera::{CameraRays, CameraUniform};
use crate::error::{SessionError, SessionResult};
use crate::renderer::backend::{BindingSlot, RaytraceBackend, TRANSFORM_WORKGROUPS};
use crate::scene::{ObjectSet, SceneFrame};

/// Per-frame buffer contents, packed byte-exact for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedFrame {
    pub transforms: Vec<u8>,
    pub lights: Vec<u8>,
    pub camera: CameraUniform,
}

impl PackedFrame {
    pub fn pack(frame: &SceneFrame, rays: &CameraRays) -> Self {
        Self {
            transforms: bytemuck::cast_slice(&frame.transforms).to_vec(),
            lights: bytemuck::cast_slice(&frame.lights).to_vec(),
            camera: rays.to_uniform(),
        }
    }
}

/// Marshals scene data into the backend's fixed buffer layout.
///
/// Mesh data is packed once at construction and uploaded once; transforms,
/// lights and camera are re-uploaded every frame.
pub struct SceneUploader {
    meshes: Vec<u8>,
    meshes_uploaded: bool,
}

impl SceneUploader {
    /// Validate and pack the object set. Overfull meshes are rejected here,
    /// before the session touches the backend.
    pub fn new(objects: &ObjectSet) -> SessionResult<Self> {
        objects.validate()?;
        let meshes = bytemuck::cast_slice(objects.meshes()).to_vec();
        Ok(Self {
            meshes,
            meshes_uploaded: false,
        })
    }

    /// Upload the static mesh buffer. Later calls are no-ops.
    pub fn upload_static<B: RaytraceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> SessionResult<()> {
        if self.meshes_uploaded {
            return Ok(());
        }
        write_slot(backend, BindingSlot::Meshes, &self.meshes)?;
        self.meshes_uploaded = true;
        debug!("uploaded {} bytes of mesh data", self.meshes.len());
        Ok(())
    }

    /// Upload this frame's transforms, lights and camera inputs.
    pub fn upload_frame<B: RaytraceBackend + ?Sized>(
        &self,
        backend: &mut B,
        frame: &SceneFrame,
        rays: &CameraRays,
    ) -> SessionResult<()> {
        if !self.meshes_uploaded {
            return Err(SessionError::Backend(
                "per-frame upload before mesh upload".into(),
            ));
        }
        let packed = PackedFrame::pack(frame, rays);
        write_slot(backend, BindingSlot::Transforms, &packed.transforms)?;
        write_slot(backend, BindingSlot::Lights, &packed.lights)?;
        backend.set_camera(&packed.camera)
    }

    /// Transform pass over every reserved slot, then the raytrace pass.
    pub fn dispatch<B: RaytraceBackend + ?Sized>(&self, backend: &mut B) -> SessionResult<()> {
        backend.dispatch_transform(TRANSFORM_WORKGROUPS)?;
        backend.draw()
    }
}

fn write_slot<B: RaytraceBackend + ?Sized>(
    backend: &mut B,
    slot: BindingSlot,
    bytes: &[u8],
) -> SessionResult<()> {
    if bytes.len() != slot.size() {
        return Err(SessionError::Backend(format!(
            "{} buffer is {} bytes, layout requires {}",
            slot.label(),
            bytes.len(),
            slot.size()
        )));
    }
    backend.write_buffer(slot, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::PixelBuffer;
    use crate::scene::{animate, geometry};
    use glam::Vec3;

    #[derive(Default)]
    struct CallLog {
        calls: Vec<String>,
    }

    impl RaytraceBackend for CallLog {
        fn name(&self) -> &'static str {
            "log"
        }
        fn write_buffer(&mut self, slot: BindingSlot, bytes: &[u8]) -> SessionResult<()> {
            self.calls.push(format!("write {} {}", slot.index(), bytes.len()));
            Ok(())
        }
        fn set_camera(&mut self, _camera: &CameraUniform) -> SessionResult<()> {
            self.calls.push("camera".into());
            Ok(())
        }
        fn dispatch_transform(&mut self, workgroups: u32) -> SessionResult<()> {
            self.calls.push(format!("dispatch {workgroups}"));
            Ok(())
        }
        fn draw(&mut self) -> SessionResult<()> {
            self.calls.push("draw".into());
            Ok(())
        }
        fn read_pixels(&mut self, _target: &mut PixelBuffer) -> SessionResult<()> {
            Ok(())
        }
        fn resize(&mut self, _width: u32, _height: u32) -> SessionResult<()> {
            Ok(())
        }
    }

    fn rays() -> CameraRays {
        CameraRays::compute(Vec3::new(0.0, 8.0, 8.0), Vec3::ZERO, Vec3::Y, 45.0, 1.0).unwrap()
    }

    #[test]
    fn test_meshes_upload_once() {
        let mut uploader = SceneUploader::new(&ObjectSet::standard().unwrap()).unwrap();
        let mut backend = CallLog::default();

        uploader.upload_static(&mut backend).unwrap();
        uploader.upload_static(&mut backend).unwrap();
        assert_eq!(backend.calls, vec!["write 1 1952"]);
    }

    #[test]
    fn test_frame_upload_order() {
        let mut uploader = SceneUploader::new(&ObjectSet::standard().unwrap()).unwrap();
        let mut backend = CallLog::default();
        uploader.upload_static(&mut backend).unwrap();
        backend.calls.clear();

        uploader
            .upload_frame(&mut backend, &animate(0.5), &rays())
            .unwrap();
        uploader.dispatch(&mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec!["write 2 128", "write 3 96", "camera", "dispatch 14", "draw"]
        );
    }

    #[test]
    fn test_frame_upload_requires_meshes() {
        let uploader = SceneUploader::new(&ObjectSet::standard().unwrap()).unwrap();
        let mut backend = CallLog::default();
        assert!(uploader
            .upload_frame(&mut backend, &animate(0.0), &rays())
            .is_err());
    }

    #[test]
    fn test_rejects_overfull_mesh() {
        let mut cube = geometry::cube().unwrap();
        cube.count = 13;
        let objects = ObjectSet::new([geometry::ground_plane().unwrap(), cube]);
        let err = SceneUploader::new(&objects).err().unwrap();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_packed_transforms_are_column_major() {
        let frame = animate(0.0);
        let packed = PackedFrame::pack(&frame, &rays());
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&packed.transforms);
        // cube translation lives in the fourth column of the second matrix
        assert_eq!(&floats[16 + 12..16 + 16], &[2.0, 1.5, 0.0, 1.0]);
    }
}
