use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Errors from geodetic conversions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("longitude {0} is outside [-180, 180] degrees")]
    InvalidLongitude(f64),
    #[error("latitude {0} is outside [-90, 90] degrees")]
    InvalidLatitude(f64),
    #[error("position {0:?} is too close to the ellipsoid center to convert to longitude/latitude/height")]
    NearEllipsoidCenter(DVec3),
}

/// Newton iteration stops once the surface function is below this.
const SURFACE_EPSILON: f64 = 1e-12;
const MAX_ITERATIONS: usize = 64;

/// A reference ellipsoid centered at the ECEF origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    radii: DVec3,
}

impl Ellipsoid {
    pub const WGS84: Self = Self {
        radii: DVec3::new(6_378_137.0, 6_378_137.0, 6_356_752.314_245_179),
    };

    pub fn new(radii: DVec3) -> Self {
        Self { radii }
    }

    pub fn radii(&self) -> DVec3 {
        self.radii
    }

    fn one_over_radii(&self) -> DVec3 {
        DVec3::ONE / self.radii
    }

    fn one_over_radii_squared(&self) -> DVec3 {
        DVec3::ONE / (self.radii * self.radii)
    }

    /// Squared scaled distance from the center under which positions have
    /// no stable geodetic solution.
    pub fn center_tolerance_squared(&self) -> f64 {
        0.1
    }

    /// Outward unit normal of the ellipsoid surface through `position`.
    pub fn geodetic_surface_normal(&self, position: DVec3) -> DVec3 {
        (position * self.one_over_radii_squared()).normalize()
    }

    /// Surface normal for a geodetic point.
    pub fn geodetic_surface_normal_cartographic(&self, c: &Cartographic) -> DVec3 {
        let cos_lat = c.latitude.cos();
        DVec3::new(
            cos_lat * c.longitude.cos(),
            cos_lat * c.longitude.sin(),
            c.latitude.sin(),
        )
        .normalize()
    }

    /// Geodetic (radians, metres) to ECEF (metres).
    pub fn cartographic_to_cartesian(&self, c: &Cartographic) -> DVec3 {
        let n = self.geodetic_surface_normal_cartographic(c);
        let k = self.radii * self.radii * n;
        let gamma = n.dot(k).sqrt();
        k / gamma + n * c.height
    }

    /// Project `position` along the geodetic normal onto the surface.
    ///
    /// Returns `None` inside the center tolerance, where the projection is
    /// not well defined.
    pub fn scale_to_geodetic_surface(&self, position: DVec3) -> Option<DVec3> {
        let one_over_radii = self.one_over_radii();
        let one_over_radii_squared = self.one_over_radii_squared();

        let scaled = position * one_over_radii;
        let squared = scaled * scaled;
        let squared_norm = squared.x + squared.y + squared.z;
        let ratio = (1.0 / squared_norm).sqrt();

        if !ratio.is_finite() || squared_norm < self.center_tolerance_squared() {
            return None;
        }

        let intersection = position * ratio;
        let gradient = intersection * one_over_radii_squared * 2.0;
        let mut lambda = (1.0 - ratio) * position.length() / (0.5 * gradient.length());
        let mut correction = 0.0;

        for _ in 0..MAX_ITERATIONS {
            lambda -= correction;

            let multiplier = DVec3::ONE / (DVec3::ONE + one_over_radii_squared * lambda);
            let multiplier2 = multiplier * multiplier;
            let multiplier3 = multiplier2 * multiplier;

            let func = squared.dot(multiplier2) - 1.0;
            if func.abs() <= SURFACE_EPSILON {
                return Some(position * multiplier);
            }

            let denominator = (squared * multiplier3).dot(one_over_radii_squared);
            let derivative = -2.0 * denominator;
            correction = func / derivative;
        }

        let multiplier = DVec3::ONE / (DVec3::ONE + one_over_radii_squared * lambda);
        Some(position * multiplier)
    }

    /// ECEF (metres) to geodetic (radians, metres).
    pub fn cartesian_to_cartographic(&self, position: DVec3) -> Option<Cartographic> {
        let surface = self.scale_to_geodetic_surface(position)?;
        let normal = self.geodetic_surface_normal(surface);
        let h = position - surface;

        let longitude = normal.y.atan2(normal.x);
        let latitude = normal.z.clamp(-1.0, 1.0).asin();
        let height = h.dot(position).signum() * h.length();

        Some(Cartographic {
            longitude,
            latitude,
            height,
        })
    }

    /// Like [`Self::cartesian_to_cartographic`] but with a typed error.
    pub fn try_cartesian_to_cartographic(&self, position: DVec3) -> Result<Cartographic, GeoError> {
        self.cartesian_to_cartographic(position)
            .ok_or(GeoError::NearEllipsoidCenter(position))
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

/// A geodetic position in radians and metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cartographic {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl Cartographic {
    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: longitude.to_radians(),
            latitude: latitude.to_radians(),
            height,
        }
    }

    /// `(longitude°, latitude°, height m)`.
    pub fn to_degrees(&self) -> (f64, f64, f64) {
        (
            self.longitude.to_degrees(),
            self.latitude.to_degrees(),
            self.height,
        )
    }
}

/// A declared geodetic origin: longitude and latitude in degrees, height in
/// metres above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoOrigin {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl GeoOrigin {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Construct with range checks on longitude and latitude.
    pub fn checked(longitude: f64, latitude: f64, height: f64) -> Result<Self, GeoError> {
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        Ok(Self::new(longitude, latitude, height))
    }

    pub fn to_cartographic(&self) -> Cartographic {
        Cartographic::from_degrees(self.longitude, self.latitude, self.height)
    }

    pub fn from_cartographic(c: &Cartographic) -> Self {
        let (longitude, latitude, height) = c.to_degrees();
        Self::new(longitude, latitude, height)
    }

    pub fn to_ecef(&self, ellipsoid: &Ellipsoid) -> DVec3 {
        ellipsoid.cartographic_to_cartesian(&self.to_cartographic())
    }
}

impl std::fmt::Display for GeoOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lon={:.8}° lat={:.8}° h={:.3}m",
            self.longitude, self.latitude, self.height
        )
    }
}
