use georebase_common::EntityId;
use georebase_geo::Ellipsoid;
use glam::DVec3;

use crate::component::SubLevelComponent;

/// Pick the sub-level a camera at `camera_ecef` should stream in: the
/// nearest enabled one whose origin is within its load radius (metres).
pub fn select_target_by_proximity<'a>(
    camera_ecef: DVec3,
    components: impl IntoIterator<Item = &'a SubLevelComponent>,
    ellipsoid: &Ellipsoid,
) -> Option<EntityId> {
    components
        .into_iter()
        .filter(|c| c.enabled())
        .filter_map(|c| {
            let distance = c.origin().to_ecef(ellipsoid).distance(camera_ecef);
            (distance <= c.load_radius()).then_some((distance, c.owner()))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, owner)| owner)
}
