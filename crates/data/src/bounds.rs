//! Axis-aligned bounding box over a model's meshes.

use glam::Vec3;

use crate::model::MeshData;

/// Min/max corner pair, recomputed whenever the model changes. Feeds both
/// the camera auto-fit and the bounding overlay transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Min/max over every vertex of every mesh. Returns `None` when no mesh
    /// has any vertices.
    pub fn of_meshes(meshes: &[MeshData]) -> Option<Self> {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        let mut any = false;

        for mesh in meshes {
            for triple in mesh.vertices.chunks_exact(3) {
                let v = Vec3::new(triple[0], triple[1], triple[2]);
                min = min.min(v);
                max = max.max(v);
                any = true;
            }
        }

        any.then_some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.0
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest axis length; drives the camera fit distance.
    pub fn max_extent(&self) -> f32 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    /// Largest absolute coordinate of either corner; drives the far plane.
    pub fn extreme(&self) -> f32 {
        self.min.abs().max_element().max(self.max.abs().max_element())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(vertices: &[f32]) -> MeshData {
        MeshData {
            vertices: vertices.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn spans_all_meshes() {
        let meshes = vec![
            mesh(&[-1.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
            mesh(&[0.0, -2.0, -5.0, 0.0, 2.0, -3.0]),
        ];
        let b = BoundingBox::of_meshes(&meshes).unwrap();
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, -5.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(b.center(), Vec3::new(0.0, 0.0, -2.5));
        assert_eq!(b.max_extent(), 5.0);
        assert_eq!(b.extreme(), 5.0);
    }

    #[test]
    fn empty_model_has_no_box() {
        assert!(BoundingBox::of_meshes(&[]).is_none());
        assert!(BoundingBox::of_meshes(&[mesh(&[])]).is_none());
    }
}
