use glam::{DMat4, DVec3, DVec4};

use crate::ellipsoid::{Cartographic, Ellipsoid};

/// Positions closer than this (metres) to the polar axis use a fixed east axis.
const POLE_EPSILON: f64 = 1e-10;

/// Matrix whose columns are the east, north, and up axes at `origin`, with
/// `origin` as translation. Maps ENU metres to ECEF metres.
pub fn east_north_up_to_fixed_frame(ellipsoid: &Ellipsoid, origin: DVec3) -> DMat4 {
    let (east, north, up) = if origin.x.abs() < POLE_EPSILON && origin.y.abs() < POLE_EPSILON {
        let up = DVec3::new(0.0, 0.0, origin.z.signum());
        let east = DVec3::Y;
        (east, up.cross(east), up)
    } else {
        let up = ellipsoid.geodetic_surface_normal(origin);
        let east = DVec3::new(-origin.y, origin.x, 0.0).normalize();
        (east, up.cross(east), up)
    };

    DMat4::from_cols(
        east.extend(0.0),
        north.extend(0.0),
        up.extend(0.0),
        DVec4::new(origin.x, origin.y, origin.z, 1.0),
    )
}

/// A local tangent-plane frame anchored at a point on (or near) the ellipsoid.
///
/// Local coordinates are ENU axes measured in host units, where one metre is
/// `units_per_meter` host units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    ellipsoid: Ellipsoid,
    origin_ecef: DVec3,
    units_per_meter: f64,
    local_to_ecef: DMat4,
    ecef_to_local: DMat4,
}

impl LocalFrame {
    pub fn new(ellipsoid: Ellipsoid, origin_ecef: DVec3, units_per_meter: f64) -> Self {
        let enu = east_north_up_to_fixed_frame(&ellipsoid, origin_ecef);
        let local_to_ecef = enu * DMat4::from_scale(DVec3::splat(1.0 / units_per_meter));
        // Rigid ENU part inverts by transpose; the scale goes on the outside.
        let ecef_to_local =
            DMat4::from_scale(DVec3::splat(units_per_meter)) * rigid_inverse(&enu);
        Self {
            ellipsoid,
            origin_ecef,
            units_per_meter,
            local_to_ecef,
            ecef_to_local,
        }
    }

    pub fn from_cartographic(
        ellipsoid: Ellipsoid,
        origin: &Cartographic,
        units_per_meter: f64,
    ) -> Self {
        Self::new(
            ellipsoid,
            ellipsoid.cartographic_to_cartesian(origin),
            units_per_meter,
        )
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn origin_ecef(&self) -> DVec3 {
        self.origin_ecef
    }

    pub fn units_per_meter(&self) -> f64 {
        self.units_per_meter
    }

    /// Absolute local (host units) to ECEF (metres).
    pub fn local_to_ecef(&self) -> DMat4 {
        self.local_to_ecef
    }

    /// ECEF (metres) to absolute local (host units).
    pub fn ecef_to_local(&self) -> DMat4 {
        self.ecef_to_local
    }

    /// ECEF position of a host placement, where `world_origin` is the host's
    /// current floating-origin offset and `position` is relative to it.
    pub fn transform_local_to_ecef(&self, world_origin: DVec3, position: DVec3) -> DVec3 {
        self.local_to_ecef.transform_point3(world_origin + position)
    }

    /// Absolute local position of an ECEF point.
    pub fn transform_ecef_to_local(&self, ecef: DVec3) -> DVec3 {
        self.ecef_to_local.transform_point3(ecef)
    }

    /// Geodetic position of the frame origin, if it is not degenerate.
    pub fn origin_cartographic(&self) -> Option<Cartographic> {
        self.ellipsoid.cartesian_to_cartographic(self.origin_ecef)
    }
}

fn rigid_inverse(m: &DMat4) -> DMat4 {
    let rotation_t = glam::DMat3::from_mat4(*m).transpose();
    let translation = -(rotation_t * m.w_axis.truncate());
    DMat4::from_cols(
        rotation_t.x_axis.extend(0.0),
        rotation_t.y_axis.extend(0.0),
        rotation_t.z_axis.extend(0.0),
        translation.extend(1.0),
    )
}
