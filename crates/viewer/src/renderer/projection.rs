//! Camera state and per-frame matrix derivation.
//!
//! Holds the mutable interaction state (rotation, camera offset, drag mode)
//! and recomputes the projection, model-view, normal and bounding matrices
//! once per frame. The model-view translates the model by the camera offset
//! and then applies the three rotations, so "camera z" is the depth the
//! model is pushed to.

use glam::{Mat4, Vec3};

use hangar_data::BoundingBox;

/// What a held pointer button is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// Primary button: orbit rotation.
    Rotate,
    /// Secondary button: camera x/y pan.
    Move,
}

const FIELD_OF_VIEW: f32 = 45.0 * std::f32::consts::PI / 180.0;
const NEAR_PLANE: f32 = 1.0;
const FAR_PLANE_FLOOR: f32 = 1000.0;
const FAR_PLANE_SCALE: f32 = 4.0;
/// Radians of rotation per pixel of drag.
const ROTATE_SCALE: f32 = 0.01;
/// Pan speed per pixel, relative to the camera depth.
const MOVE_SCALE: f32 = 0.001;
/// Zoom per wheel step, relative to the camera depth.
const ZOOM_SCALE: f32 = 0.05;
/// Auto-rotation advance per frame.
const AUTO_ROTATE_STEP: f32 = 0.005;

pub struct Projection {
    rotation: Vec3,
    camera: Vec3,
    pub auto_rotate: bool,

    drag: Option<DragMode>,
    last_pointer: Option<(f64, f64)>,

    fov: f32,
    far: f32,
    bounds: Option<BoundingBox>,

    // Cached matrices, rebuilt by update().
    projection_matrix: Mat4,
    model_view_matrix: Mat4,
    normal_matrix: Mat4,
    bounding_matrix: Mat4,
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection {
    pub fn new() -> Self {
        Self {
            rotation: Vec3::new(std::f32::consts::PI, 0.0, 0.0),
            camera: Vec3::ZERO,
            auto_rotate: true,
            drag: None,
            last_pointer: None,
            fov: FIELD_OF_VIEW,
            far: FAR_PLANE_FLOOR,
            bounds: None,
            projection_matrix: Mat4::IDENTITY,
            model_view_matrix: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
            bounding_matrix: Mat4::IDENTITY,
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    pub fn model_view_matrix(&self) -> Mat4 {
        self.model_view_matrix
    }

    pub fn normal_matrix(&self) -> Mat4 {
        self.normal_matrix
    }

    pub fn bounding_matrix(&self) -> Mat4 {
        self.bounding_matrix
    }

    pub fn camera(&self) -> Vec3 {
        self.camera
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Begin a drag. Returns `true` when this press switched auto-rotate
    /// off, so the caller can notify the UI.
    pub fn pointer_down(&mut self, mode: DragMode) -> bool {
        self.drag = Some(mode);
        self.last_pointer = None;
        let was_rotating = self.auto_rotate;
        self.auto_rotate = false;
        was_rotating
    }

    /// End a drag (button release, pointer leaving the canvas). Clears the
    /// stored position so the next drag starts fresh instead of jumping.
    pub fn pointer_up(&mut self) {
        self.drag = None;
        self.last_pointer = None;
    }

    /// Pointer moved to an absolute position. The first move after a press
    /// only records the position; subsequent moves apply the delta.
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        let Some(mode) = self.drag else { return };
        let Some((last_x, last_y)) = self.last_pointer else {
            self.last_pointer = Some((x, y));
            return;
        };

        let dx = (x - last_x) as f32;
        let dy = (y - last_y) as f32;
        match mode {
            DragMode::Rotate => {
                self.rotation.x += dx * ROTATE_SCALE;
                self.rotation.y -= dy * ROTATE_SCALE;
            }
            DragMode::Move => {
                let scale = self.camera.z.abs().max(10.0) * MOVE_SCALE;
                self.camera.x += dx * scale;
                self.camera.y -= dy * scale;
            }
        }
        self.last_pointer = Some((x, y));
    }

    /// Zoom by wheel steps (positive pulls the model closer).
    pub fn zoom(&mut self, steps: f32) {
        self.camera.z += steps * self.camera.z.abs().max(10.0) * ZOOM_SCALE;
    }

    /// Fit the camera to a model's bounding box: depth that frames the
    /// largest extent at the current field of view, x/y centered on the box
    /// midpoint, far plane scaled to the extreme coordinates.
    pub fn set_bounding_box(&mut self, bounds: Option<BoundingBox>) {
        self.bounds = bounds;
        let Some(bounds) = bounds else {
            self.far = FAR_PLANE_FLOOR;
            return;
        };

        let fit = bounds.max_extent() / (2.0 * (self.fov / 2.0).tan());
        self.camera.z = -fit + bounds.min.z;

        let center = bounds.center();
        self.camera.x = -center.x;
        self.camera.y = -center.y;

        self.far = (bounds.extreme() * FAR_PLANE_SCALE).max(FAR_PLANE_FLOOR);
    }

    /// Recompute all matrices. Called once per frame with the current
    /// viewport aspect ratio.
    pub fn update(&mut self, aspect: f32) {
        if self.auto_rotate && self.drag.is_none() {
            self.rotation.x += AUTO_ROTATE_STEP;
        }

        let rx = normalize_angle(self.rotation.x);
        let ry = normalize_angle(self.rotation.y);
        let rz = normalize_angle(self.rotation.z);

        self.projection_matrix =
            Mat4::perspective_rh(self.fov, aspect.max(f32::EPSILON), NEAR_PLANE, self.far);

        self.model_view_matrix = Mat4::from_translation(self.camera)
            * Mat4::from_rotation_y(rx)
            * Mat4::from_rotation_x(ry)
            * Mat4::from_rotation_z(rz);

        self.normal_matrix = self.model_view_matrix.inverse().transpose();

        if let Some(bounds) = self.bounds {
            self.bounding_matrix =
                Mat4::from_translation(bounds.center()) * Mat4::from_scale(bounds.size());
        }
    }
}

/// Map any angle into [0, 2π).
fn normalize_angle(angle: f32) -> f32 {
    angle.rem_euclid(std::f32::consts::TAU)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangar_data::MeshData;
    use std::f32::consts::{PI, TAU};

    fn boxed(vertices: &[f32]) -> Option<BoundingBox> {
        BoundingBox::of_meshes(&[MeshData {
            vertices: vertices.to_vec(),
            ..Default::default()
        }])
    }

    #[test]
    fn normalize_covers_both_signs() {
        assert!((normalize_angle(-0.5) - (TAU - 0.5)).abs() < 1e-6);
        assert!((normalize_angle(7.0 * TAU + 1.0) - 1.0).abs() < 1e-4);
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!(normalize_angle(-123.456) >= 0.0);
        assert!(normalize_angle(123.456) < TAU);
    }

    #[test]
    fn camera_fits_bounding_box() {
        let mut projection = Projection::new();
        // x,y span [-1,1], z spans [-5,-3].
        projection.set_bounding_box(boxed(&[
            -1.0, -1.0, -5.0, //
            1.0, 1.0, -3.0,
        ]));

        let expected_z = -(2.0 / (2.0 * (FIELD_OF_VIEW / 2.0).tan())) + (-5.0);
        assert!((projection.camera().z - expected_z).abs() < 1e-5);
        assert_eq!(projection.camera().x, 0.0);
        assert_eq!(projection.camera().y, 0.0);
    }

    #[test]
    fn far_plane_never_below_floor() {
        let mut projection = Projection::new();
        projection.set_bounding_box(boxed(&[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]));
        assert_eq!(projection.far, 1000.0);

        projection.set_bounding_box(boxed(&[-900.0, 0.0, 0.0, 900.0, 1.0, 1.0]));
        assert!(projection.far > 1000.0);
    }

    #[test]
    fn drag_starts_fresh_after_release() {
        let mut projection = Projection::new();
        projection.pointer_down(DragMode::Rotate);
        let before = projection.rotation();
        // First move only records the position.
        projection.pointer_move(100.0, 100.0);
        assert_eq!(projection.rotation(), before);

        projection.pointer_move(110.0, 100.0);
        let after_drag = projection.rotation();
        assert!((after_drag.x - before.x - 10.0 * ROTATE_SCALE).abs() < 1e-6);

        projection.pointer_up();
        projection.pointer_down(DragMode::Rotate);
        // A new drag far away must not jump.
        projection.pointer_move(500.0, 500.0);
        assert_eq!(projection.rotation(), after_drag);
    }

    #[test]
    fn pressing_disables_auto_rotate_once() {
        let mut projection = Projection::new();
        assert!(projection.pointer_down(DragMode::Move));
        projection.pointer_up();
        assert!(!projection.pointer_down(DragMode::Rotate));
    }

    #[test]
    fn auto_rotate_advances_only_without_drag() {
        let mut projection = Projection::new();
        let start = projection.rotation().x;
        projection.update(1.0);
        assert!(projection.rotation().x > start);

        projection.pointer_down(DragMode::Rotate);
        let held = projection.rotation().x;
        projection.update(1.0);
        assert_eq!(projection.rotation().x, held);
    }

    #[test]
    fn update_normalizes_rotation_in_matrices() {
        let mut run = |angle: f32| {
            let mut projection = Projection::new();
            projection.auto_rotate = false;
            projection.rotation = Vec3::new(angle, 0.0, 0.0);
            projection.update(1.0);
            projection.model_view_matrix()
        };
        // Angles equal modulo 2π produce identical matrices.
        let a = run(PI / 3.0);
        let b = run(PI / 3.0 + 4.0 * TAU);
        let c = run(PI / 3.0 - 3.0 * TAU);
        assert!(a.abs_diff_eq(b, 1e-4));
        assert!(a.abs_diff_eq(c, 1e-4));
    }

    #[test]
    fn bounding_matrix_maps_unit_cube_onto_box() {
        let mut projection = Projection::new();
        projection.set_bounding_box(boxed(&[1.0, 2.0, 3.0, 5.0, 8.0, 11.0]));
        projection.update(1.0);

        let m = projection.bounding_matrix();
        // Unit-cube corner (0.5, 0.5, 0.5) lands on the box max corner.
        let corner = m.transform_point3(Vec3::splat(0.5));
        assert!(corner.abs_diff_eq(Vec3::new(5.0, 8.0, 11.0), 1e-5));
        let center = m.transform_point3(Vec3::ZERO);
        assert!(center.abs_diff_eq(Vec3::new(3.0, 5.0, 7.0), 1e-5));
    }
}
