//! Geodesy: ellipsoid conversions and local tangent-plane frames.
//!
//! # Conventions
//! - ECEF coordinates are in metres.
//! - Local frames are East-North-Up: +X east, +Y north, +Z up.
//! - Local lengths are expressed in host units; `units_per_meter` converts.

mod ellipsoid;
mod frame;

pub use ellipsoid::{Cartographic, Ellipsoid, GeoError, GeoOrigin};
pub use frame::{LocalFrame, east_north_up_to_fixed_frame};

pub fn crate_info() -> &'static str {
    concat!("georebase-geo v", env!("CARGO_PKG_VERSION"))
}
