use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::error::{SessionError, SessionResult};

/// Fixed triangle capacity of one mesh record.
pub const MESH_CAPACITY: usize = 12;

/// Number of meshes in a session (ground plane + cube).
pub const OBJECT_COUNT: usize = 2;

/// Triangle slots reserved across all meshes (2 + 12). One compute workgroup per slot.
pub const TRIANGLE_SLOTS: usize = 14;

/// Triangle record shared with the backend.
///
/// Stride 80 bytes: five `vec4<f32>`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub a: Vec4,
    pub b: Vec4,
    pub c: Vec4,
    pub normal: Vec4,
    pub color: Vec4,
}

/// Mesh record shared with the backend.
///
/// Stride 976 bytes: `count` plus three padding words keep `triangles` on a
/// 16-byte boundary, followed by `MESH_CAPACITY` triangles.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Mesh {
    pub count: u32,
    pub _pad: [u32; 3],
    pub triangles: [Triangle; MESH_CAPACITY],
}

const _: () = assert!(std::mem::size_of::<Triangle>() == 80);
const _: () = assert!(std::mem::size_of::<Mesh>() == 16 + 80 * MESH_CAPACITY);

impl Triangle {
    /// Build a triangle from 3D corners, a face normal and an RGBA color.
    pub fn new(a: [f32; 3], b: [f32; 3], c: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            a: Vec4::new(a[0], a[1], a[2], 1.0),
            b: Vec4::new(b[0], b[1], b[2], 1.0),
            c: Vec4::new(c[0], c[1], c[2], 1.0),
            normal: Vec4::new(normal[0], normal[1], normal[2], 1.0),
            color: Vec4::from_array(color),
        }
    }
}

impl Mesh {
    /// Pack triangles into a fixed-capacity record.
    pub fn new(triangles: &[Triangle]) -> SessionResult<Self> {
        if triangles.len() > MESH_CAPACITY {
            return Err(SessionError::config(format!(
                "mesh has {} triangles, capacity is {}",
                triangles.len(),
                MESH_CAPACITY
            )));
        }

        let mut mesh = Self::zeroed();
        mesh.count = triangles.len() as u32;
        mesh.triangles[..triangles.len()].copy_from_slice(triangles);
        Ok(mesh)
    }

    /// Check the `0 <= count <= capacity` invariant.
    pub fn validate(&self) -> SessionResult<()> {
        if self.count as usize > MESH_CAPACITY {
            return Err(SessionError::config(format!(
                "mesh triangle count {} exceeds capacity {}",
                self.count, MESH_CAPACITY
            )));
        }
        Ok(())
    }

    /// Active triangles of this mesh.
    pub fn triangles(&self) -> &[Triangle] {
        let count = (self.count as usize).min(MESH_CAPACITY);
        &self.triangles[..count]
    }
}

/// The fixed object set of a session: index 0 ground plane, index 1 cube.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSet {
    meshes: [Mesh; OBJECT_COUNT],
}

impl ObjectSet {
    /// Assemble an object set from explicit meshes.
    pub fn new(meshes: [Mesh; OBJECT_COUNT]) -> Self {
        Self { meshes }
    }

    /// Ground plane and cube.
    pub fn standard() -> SessionResult<Self> {
        Ok(Self::new([ground_plane()?, cube()?]))
    }

    pub fn meshes(&self) -> &[Mesh; OBJECT_COUNT] {
        &self.meshes
    }

    /// Total active triangles across meshes.
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles().len()).sum()
    }

    /// Check every mesh against its capacity.
    pub fn validate(&self) -> SessionResult<()> {
        for (index, mesh) in self.meshes.iter().enumerate() {
            mesh.validate()
                .map_err(|e| SessionError::config(format!("object {index}: {e}")))?;
        }
        if self.triangle_count() > TRIANGLE_SLOTS {
            return Err(SessionError::config(format!(
                "object set has {} triangles, only {} slots are reserved",
                self.triangle_count(),
                TRIANGLE_SLOTS
            )));
        }
        Ok(())
    }
}

/// 10x10 white floor in the XZ plane.
pub fn ground_plane() -> SessionResult<Mesh> {
    const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
    const UP: [f32; 3] = [0.0, 1.0, 0.0];

    Mesh::new(&[
        Triangle::new([-5.0, 0.0, 5.0], [-5.0, 0.0, -5.0], [5.0, 0.0, -5.0], UP, WHITE),
        Triangle::new([-5.0, 0.0, 5.0], [5.0, 0.0, -5.0], [5.0, 0.0, 5.0], UP, WHITE),
    ])
}

/// Unit orange cube centred on the origin.
pub fn cube() -> SessionResult<Mesh> {
    const ORANGE: [f32; 4] = [1.0, 0.5, 0.1, 1.0];
    const H: f32 = 0.5;

    Mesh::new(&[
        // -Z
        Triangle::new([-H, -H, -H], [H, -H, -H], [-H, H, -H], [0.0, 0.0, -1.0], ORANGE),
        Triangle::new([H, -H, -H], [H, H, -H], [-H, H, -H], [0.0, 0.0, -1.0], ORANGE),
        // +Z
        Triangle::new([-H, -H, H], [-H, H, H], [H, H, H], [0.0, 0.0, 1.0], ORANGE),
        Triangle::new([-H, -H, H], [H, H, H], [H, -H, H], [0.0, 0.0, 1.0], ORANGE),
        // +X
        Triangle::new([H, -H, H], [H, H, H], [H, H, -H], [1.0, 0.0, 0.0], ORANGE),
        Triangle::new([H, -H, H], [H, H, -H], [H, -H, -H], [1.0, 0.0, 0.0], ORANGE),
        // -X
        Triangle::new([-H, -H, -H], [-H, H, -H], [-H, H, H], [-1.0, 0.0, 0.0], ORANGE),
        Triangle::new([-H, -H, -H], [-H, H, H], [-H, -H, H], [-1.0, 0.0, 0.0], ORANGE),
        // +Y
        Triangle::new([-H, H, H], [-H, H, -H], [H, H, -H], [0.0, 1.0, 0.0], ORANGE),
        Triangle::new([-H, H, H], [H, H, -H], [H, H, H], [0.0, 1.0, 0.0], ORANGE),
        // -Y
        Triangle::new([-H, -H, H], [-H, -H, -H], [H, -H, -H], [0.0, -1.0, 0.0], ORANGE),
        Triangle::new([-H, -H, H], [H, -H, -H], [H, -H, H], [0.0, -1.0, 0.0], ORANGE),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_object_set() {
        let set = ObjectSet::standard().unwrap();
        assert_eq!(set.meshes()[0].count, 2);
        assert_eq!(set.meshes()[1].count, 12);
        assert_eq!(set.triangle_count(), TRIANGLE_SLOTS);
        set.validate().unwrap();
    }

    #[test]
    fn test_mesh_rejects_too_many_triangles() {
        let tris = vec![Triangle::default(); MESH_CAPACITY + 1];
        let err = Mesh::new(&tris).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_validate_catches_corrupted_count() {
        let mut mesh = cube().unwrap();
        mesh.count = 13;
        assert!(mesh.validate().is_err());
        assert_eq!(mesh.triangles().len(), MESH_CAPACITY);
    }

    #[test]
    fn test_cube_normals_face_outward() {
        let mesh = cube().unwrap();
        for tri in mesh.triangles() {
            let centroid = (tri.a + tri.b + tri.c).truncate() / 3.0;
            assert!(centroid.dot(tri.normal.truncate()) > 0.0);
        }
    }

    #[test]
    fn test_record_layout_is_byte_exact() {
        let mesh = ground_plane().unwrap();
        let bytes = bytemuck::bytes_of(&mesh);
        assert_eq!(bytes.len(), 976);
        assert_eq!(&bytes[0..4], &2u32.to_ne_bytes());
        // first vertex x of triangle 0 sits right after the padded header
        assert_eq!(&bytes[16..20], &(-5.0f32).to_ne_bytes());
    }
}
