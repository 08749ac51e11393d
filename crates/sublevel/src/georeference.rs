use std::collections::BTreeMap;

use georebase_common::{AuthorityId, EntityId};
use georebase_geo::{Ellipsoid, GeoOrigin, LocalFrame};
use georebase_kernel::World;
use georebase_stream::{SubLevelSwitcher, SwitcherConfig};

/// The shared coordinate-system source of truth for a set of sub-levels.
#[derive(Debug)]
pub struct GeoreferenceAuthority {
    id: AuthorityId,
    name: String,
    origin: GeoOrigin,
    /// Linear scale of the globe in the host world; 1.0 is true size.
    scale: f64,
    ellipsoid: Ellipsoid,
    /// Level this authority lives in; `None` is the persistent level.
    level: Option<EntityId>,
    is_default: bool,
    switcher: Option<SubLevelSwitcher>,
    origin_changes: usize,
}

impl GeoreferenceAuthority {
    pub fn id(&self) -> AuthorityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> GeoOrigin {
        self.origin
    }

    /// Replace the origin. Every sub-level attached to this authority
    /// observes the new value.
    pub fn set_origin(&mut self, longitude: f64, latitude: f64, height: f64) {
        self.origin = GeoOrigin::new(longitude, latitude, height);
        self.origin_changes += 1;
        tracing::info!(authority = %self.name, origin = %self.origin, "georeference origin changed");
    }

    /// How many times the origin has been pushed since creation.
    pub fn origin_changes(&self) -> usize {
        self.origin_changes
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub fn ellipsoid(&self) -> Ellipsoid {
        self.ellipsoid
    }

    pub fn level(&self) -> Option<EntityId> {
        self.level
    }

    pub fn set_level(&mut self, level: Option<EntityId>) {
        self.level = level;
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn set_default(&mut self, is_default: bool) {
        self.is_default = is_default;
    }

    pub fn switcher(&self) -> Option<&SubLevelSwitcher> {
        self.switcher.as_ref()
    }

    pub fn switcher_mut(&mut self) -> Option<&mut SubLevelSwitcher> {
        self.switcher.as_mut()
    }

    /// Detach the switcher; sub-levels then never become active.
    pub fn remove_switcher(&mut self) -> Option<SubLevelSwitcher> {
        self.switcher.take()
    }

    /// Tangent-plane frame at the current origin.
    ///
    /// `units_per_meter` is the host's length unit; the authority's scale is
    /// applied on top of it.
    pub fn local_frame(&self, units_per_meter: f64) -> LocalFrame {
        LocalFrame::new(
            self.ellipsoid,
            self.origin.to_ecef(&self.ellipsoid),
            units_per_meter * self.scale,
        )
    }
}

/// Owns every authority in a scene. Sub-levels hold [`AuthorityId`]s and look
/// authorities up here on demand; a missing id is an invalid reference.
#[derive(Debug, Default)]
pub struct AuthorityRegistry {
    authorities: BTreeMap<AuthorityId, GeoreferenceAuthority>,
    next_id: u64,
}

impl AuthorityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an authority with a switcher, WGS84, and unit scale.
    pub fn create(&mut self, name: &str, origin: GeoOrigin) -> AuthorityId {
        let id = AuthorityId(self.next_id);
        self.next_id += 1;
        self.authorities.insert(
            id,
            GeoreferenceAuthority {
                id,
                name: name.to_string(),
                origin,
                scale: 1.0,
                ellipsoid: Ellipsoid::WGS84,
                level: None,
                is_default: false,
                switcher: Some(SubLevelSwitcher::new(SwitcherConfig::default())),
                origin_changes: 0,
            },
        );
        tracing::debug!(authority = name, ?id, "created georeference authority");
        id
    }

    pub fn get(&self, id: AuthorityId) -> Option<&GeoreferenceAuthority> {
        self.authorities.get(&id)
    }

    pub fn get_mut(&mut self, id: AuthorityId) -> Option<&mut GeoreferenceAuthority> {
        self.authorities.get_mut(&id)
    }

    /// Whether `id` still refers to a live authority.
    pub fn contains(&self, id: AuthorityId) -> bool {
        self.authorities.contains_key(&id)
    }

    pub fn remove(&mut self, id: AuthorityId) -> Option<GeoreferenceAuthority> {
        self.authorities.remove(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<AuthorityId> {
        self.authorities
            .values()
            .find(|a| a.name == name)
            .map(|a| a.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeoreferenceAuthority> {
        self.authorities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GeoreferenceAuthority> {
        self.authorities.values_mut()
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    /// Default authority for an object: one living in the same level as
    /// `owner`, preferring those flagged default, then the oldest.
    pub fn default_for(&self, world: &World, owner: EntityId) -> Option<AuthorityId> {
        let scope = world.get(owner).and_then(|d| d.parent);
        let mut in_scope = self.authorities.values().filter(|a| a.level == scope);
        let first = in_scope.next()?;
        if first.is_default {
            return Some(first.id);
        }
        Some(
            in_scope
                .find(|a| a.is_default)
                .map(|a| a.id)
                .unwrap_or(first.id),
        )
    }
}
