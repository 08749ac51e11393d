use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an object in the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines and inspector output.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a georeference authority. Allocated sequentially by the
/// registry that owns the authority, so ordering follows creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorityId(pub u64);

/// Residual above which a matrix decomposition counts as lossy.
const SHEAR_TOLERANCE: f64 = 1e-9;

/// Spatial transform: translation, rotation, scale in double precision.
///
/// Placements of georeferenced objects can sit millions of units away from
/// the host origin, so everything here is `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Affine matrix equivalent (scale, then rotate, then translate).
    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Decompose an affine matrix. Shear is not representable and is dropped;
    /// a lossy decomposition is logged at debug level.
    pub fn from_matrix(m: &DMat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        let t = Self {
            translation,
            rotation: rotation.normalize(),
            scale,
        };
        let error = t.decomposition_error(m);
        let magnitude = scale.abs().max_element().max(1.0);
        if error > SHEAR_TOLERANCE * magnitude {
            tracing::debug!(error, "matrix has shear; decomposition drops it");
        }
        t
    }

    /// Largest difference between the linear part of `m` and this transform's,
    /// i.e. how much of `m` a decomposition failed to keep.
    pub fn decomposition_error(&self, m: &DMat4) -> f64 {
        let rebuilt = self.to_matrix();
        [
            (rebuilt.x_axis - m.x_axis).truncate(),
            (rebuilt.y_axis - m.y_axis).truncate(),
            (rebuilt.z_axis - m.z_axis).truncate(),
        ]
        .iter()
        .map(|d| d.abs().max_element())
        .fold(0.0, f64::max)
    }

    /// Whether two transforms agree within `eps` on every component.
    /// Quaternions `q` and `-q` are treated as equal.
    pub fn abs_diff_eq(&self, other: &Self, eps: f64) -> bool {
        let rot_eq = self.rotation.abs_diff_eq(other.rotation, eps)
            || self.rotation.abs_diff_eq(-other.rotation, eps);
        self.translation.abs_diff_eq(other.translation, eps)
            && rot_eq
            && self.scale.abs_diff_eq(other.scale, eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_short_is_eight_chars() {
        assert_eq!(EntityId::new().short().len(), 8);
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.translation, DVec3::ZERO);
        assert_eq!(t.rotation, DQuat::IDENTITY);
        assert_eq!(t.scale, DVec3::ONE);
        assert_eq!(t.to_matrix(), DMat4::IDENTITY);
    }

    #[test]
    fn matrix_round_trip_preserves_components() {
        let t = Transform {
            translation: DVec3::new(6_378_137.0, -12.5, 3.0),
            rotation: DQuat::from_rotation_z(0.7),
            scale: DVec3::splat(2.0),
        };
        let back = Transform::from_matrix(&t.to_matrix());
        assert!(back.abs_diff_eq(&t, 1e-9));
    }

    #[test]
    fn rigid_decomposition_is_lossless() {
        let t = Transform {
            translation: DVec3::new(10.0, 20.0, 30.0),
            rotation: DQuat::from_rotation_y(0.4),
            scale: DVec3::new(1.0, 2.0, 3.0),
        };
        let m = t.to_matrix();
        assert!(Transform::from_matrix(&m).decomposition_error(&m) < 1e-9);
    }

    #[test]
    fn sheared_matrix_reports_decomposition_error() {
        // Non-uniform scale followed by a rotation cannot be expressed as
        // scale-rotate-translate.
        let m = DMat4::from_rotation_z(0.3) * DMat4::from_scale(DVec3::new(4.0, 1.0, 1.0));
        let sheared = DMat4::from_scale(DVec3::new(1.0, 3.0, 1.0)) * m;
        let t = Transform::from_matrix(&sheared);
        assert!(t.decomposition_error(&sheared) > 1e-3);
        assert!(t.translation.abs_diff_eq(DVec3::ZERO, 1e-12));
    }

    #[test]
    fn negated_quaternion_compares_equal() {
        let a = Transform {
            rotation: DQuat::from_rotation_x(1.0),
            ..Transform::IDENTITY
        };
        let b = Transform {
            rotation: -a.rotation,
            ..a
        };
        assert!(a.abs_diff_eq(&b, 1e-12));
    }
}
