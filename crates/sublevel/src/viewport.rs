use glam::{DMat3, DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Editor viewport camera. Camera space is forward = +X, left = +Y, up = +Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportCamera {
    /// Position relative to the host's floating origin.
    pub location: DVec3,
    pub rotation: DQuat,
}

impl Default for ViewportCamera {
    fn default() -> Self {
        Self {
            location: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}

impl ViewportCamera {
    pub fn forward(&self) -> DVec3 {
        self.rotation * DVec3::X
    }

    pub fn left(&self) -> DVec3 {
        self.rotation * DVec3::Y
    }

    pub fn up(&self) -> DVec3 {
        self.rotation * DVec3::Z
    }
}

/// Carry the camera through `old_to_new` so the scene does not appear to
/// move, then level it.
///
/// Forward is kept exactly. Left and up are rebuilt against the host's +Z,
/// so a camera that was level in the old frame is level in the new one
/// instead of inheriting the tilt between the two tangent planes.
pub fn recenter(camera: &mut ViewportCamera, old_to_new: &DMat4, world_origin: DVec3) {
    let absolute = world_origin + camera.location;
    camera.location = old_to_new.transform_point3(absolute) - world_origin;

    let forward = old_to_new.transform_vector3(camera.forward()).normalize();
    let transported_left = old_to_new.transform_vector3(camera.left()).normalize();

    let mut left = DVec3::Z.cross(forward);
    if left.length_squared() < 1e-12 {
        // Looking straight up or down.
        left = transported_left.reject_from_normalized(forward);
    }
    let left = left.normalize();
    let up = forward.cross(left).normalize();

    camera.rotation = DQuat::from_mat3(&DMat3::from_cols(forward, left, up)).normalize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_leaves_level_camera_alone() {
        let mut camera = ViewportCamera {
            location: DVec3::new(1.0, 2.0, 3.0),
            rotation: DQuat::from_rotation_z(0.5),
        };
        let before = camera;
        recenter(&mut camera, &DMat4::IDENTITY, DVec3::ZERO);
        assert!(camera.location.abs_diff_eq(before.location, 1e-12));
        assert!(camera.forward().abs_diff_eq(before.forward(), 1e-12));
        assert!(camera.up().abs_diff_eq(DVec3::Z, 1e-12));
    }

    #[test]
    fn translation_moves_location_only() {
        let mut camera = ViewportCamera::default();
        let m = DMat4::from_translation(DVec3::new(10.0, 0.0, -5.0));
        recenter(&mut camera, &m, DVec3::ZERO);
        assert_eq!(camera.location, DVec3::new(10.0, 0.0, -5.0));
        assert!(camera.forward().abs_diff_eq(DVec3::X, 1e-12));
    }

    #[test]
    fn tilt_is_removed_and_forward_kept() {
        let mut camera = ViewportCamera::default();
        // Roll the frame about forward; the transported camera is tilted.
        let m = DMat4::from_rotation_x(0.3);
        recenter(&mut camera, &m, DVec3::ZERO);
        assert!(camera.forward().abs_diff_eq(DVec3::X, 1e-12));
        assert!(camera.up().abs_diff_eq(DVec3::Z, 1e-12));
        assert!(camera.left().abs_diff_eq(DVec3::Y, 1e-12));
    }

    #[test]
    fn pitched_forward_is_preserved() {
        let pitch = DQuat::from_rotation_y(-0.4);
        let mut camera = ViewportCamera {
            location: DVec3::ZERO,
            rotation: pitch,
        };
        let m = DMat4::from_rotation_z(1.0);
        let expected = m.transform_vector3(camera.forward());
        recenter(&mut camera, &m, DVec3::ZERO);
        assert!(camera.forward().abs_diff_eq(expected, 1e-12));
        assert!(camera.left().z.abs() < 1e-12);
        assert!(camera.up().z > 0.0);
    }

    #[test]
    fn vertical_forward_falls_back_to_transported_left() {
        let mut camera = ViewportCamera {
            location: DVec3::ZERO,
            rotation: DQuat::from_rotation_y(-std::f64::consts::FRAC_PI_2),
        };
        assert!(camera.forward().abs_diff_eq(DVec3::Z, 1e-12));
        recenter(&mut camera, &DMat4::IDENTITY, DVec3::ZERO);
        assert!(camera.forward().abs_diff_eq(DVec3::Z, 1e-12));
        assert!(camera.left().abs_diff_eq(DVec3::Y, 1e-9));
        assert!(camera.location.is_finite());
    }

    #[test]
    fn floating_origin_is_applied_around_the_transform() {
        let mut camera = ViewportCamera {
            location: DVec3::new(1.0, 0.0, 0.0),
            rotation: DQuat::IDENTITY,
        };
        let m = DMat4::from_scale(DVec3::splat(2.0));
        recenter(&mut camera, &m, DVec3::new(100.0, 0.0, 0.0));
        // (100 + 1) * 2 - 100
        assert!(camera.location.abs_diff_eq(DVec3::new(102.0, 0.0, 0.0), 1e-12));
    }
}
