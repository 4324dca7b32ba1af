pub mod animator;
pub mod geometry;
pub mod light;

pub use animator::{animate, SceneFrame};
pub use geometry::{Mesh, ObjectSet, Triangle, MESH_CAPACITY, OBJECT_COUNT, TRIANGLE_SLOTS};
pub use light::{Light, LIGHT_COUNT};

use crate::error::SessionResult;

/// Static geometry plus the animated state of the current frame.
#[derive(Clone, Debug)]
pub struct SceneState {
    objects: ObjectSet,
    current: SceneFrame,
}

impl SceneState {
    /// Validate the object set and start at video time zero.
    pub fn new(objects: ObjectSet) -> SessionResult<Self> {
        objects.validate()?;
        Ok(Self {
            objects,
            current: animate(0.0),
        })
    }

    /// Recompute transforms and lights for `video_time`.
    pub fn advance(&mut self, video_time: f32) -> &SceneFrame {
        self.current = animate(video_time);
        &self.current
    }

    pub fn objects(&self) -> &ObjectSet {
        &self.objects
    }

    pub fn current(&self) -> &SceneFrame {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_state_rejects_overfull_mesh() {
        let mut cube = geometry::cube().unwrap();
        cube.count = 20;
        let objects = ObjectSet::new([geometry::ground_plane().unwrap(), cube]);
        assert!(SceneState::new(objects).is_err());
    }

    #[test]
    fn test_advance_has_no_history() {
        let mut state = SceneState::new(ObjectSet::standard().unwrap()).unwrap();
        state.advance(3.0);
        let jumped = *state.advance(1.0);

        let mut fresh = SceneState::new(ObjectSet::standard().unwrap()).unwrap();
        assert_eq!(*fresh.advance(1.0), jumped);
    }
}
