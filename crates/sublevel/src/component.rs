use georebase_common::{AuthorityId, EntityId};
use georebase_geo::GeoOrigin;
use georebase_kernel::{EntityKind, World};
use georebase_stream::SubLevelSwitcher;
use serde::{Deserialize, Serialize};

use crate::georeference::AuthorityRegistry;

/// Persisted sub-level properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubLevelSettings {
    /// Whether the sub-level takes part in automatic switching.
    pub enabled: bool,
    /// Declared georeference origin of the sub-level.
    pub origin: GeoOrigin,
    /// Distance in metres from the origin within which the sub-level is
    /// considered for loading.
    pub load_radius: f64,
    /// Explicitly declared authority. `None` falls back to default discovery.
    pub georeference: Option<AuthorityId>,
}

impl Default for SubLevelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: GeoOrigin::default(),
            load_radius: 1000.0,
            georeference: None,
        }
    }
}

/// Property names for [`SubLevelComponent::post_edit_change_property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubLevelProperty {
    Enabled,
    OriginLongitude,
    OriginLatitude,
    OriginHeight,
    LoadRadius,
    Georeference,
}

/// Whether a sub-level's origin should govern its authority: it is the
/// current sub-level, or it is the target while nothing is current.
pub fn is_origin_active(
    current: Option<EntityId>,
    target: Option<EntityId>,
    sub_level: EntityId,
) -> bool {
    current == Some(sub_level) || (current.is_none() && target == Some(sub_level))
}

/// Origin resolver attached to a level instance.
///
/// Holds the sub-level's declared origin and its link to a
/// [`GeoreferenceAuthority`](crate::GeoreferenceAuthority). The link is an id
/// resolved on demand; invalidating it unregisters the sub-level from the
/// authority's switcher.
#[derive(Debug, Clone)]
pub struct SubLevelComponent {
    owner: EntityId,
    settings: SubLevelSettings,
    resolved: Option<AuthorityId>,
}

impl SubLevelComponent {
    pub fn new(owner: EntityId, settings: SubLevelSettings) -> Self {
        Self {
            owner,
            settings,
            resolved: None,
        }
    }

    /// The host object this component is attached to.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn settings(&self) -> &SubLevelSettings {
        &self.settings
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn set_enabled(&mut self, value: bool) {
        self.settings.enabled = value;
    }

    pub fn load_radius(&self) -> f64 {
        self.settings.load_radius
    }

    pub fn set_load_radius(&mut self, value: f64) {
        self.settings.load_radius = value;
    }

    pub fn origin(&self) -> GeoOrigin {
        self.settings.origin
    }

    pub fn origin_longitude(&self) -> f64 {
        self.settings.origin.longitude
    }

    pub fn origin_latitude(&self) -> f64 {
        self.settings.origin.latitude
    }

    pub fn origin_height(&self) -> f64 {
        self.settings.origin.height
    }

    pub fn set_origin_longitude(
        &mut self,
        value: f64,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) {
        self.settings.origin.longitude = value;
        self.update_georeference_if_active(world, registry);
    }

    pub fn set_origin_latitude(
        &mut self,
        value: f64,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) {
        self.settings.origin.latitude = value;
        self.update_georeference_if_active(world, registry);
    }

    pub fn set_origin_height(
        &mut self,
        value: f64,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) {
        self.settings.origin.height = value;
        self.update_georeference_if_active(world, registry);
    }

    /// Set all three origin components. An unchanged origin is a no-op.
    /// Returns whether the authority received a new origin.
    pub fn set_origin(
        &mut self,
        origin: GeoOrigin,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) -> bool {
        if self.settings.origin == origin {
            return false;
        }
        self.settings.origin = origin;
        self.update_georeference_if_active(world, registry)
    }

    /// The declared authority reference.
    pub fn georeference(&self) -> Option<AuthorityId> {
        self.settings.georeference
    }

    /// Replace the declared authority. The previous resolution is
    /// invalidated; if the owner exists the new one is resolved and
    /// registered immediately.
    pub fn set_georeference(
        &mut self,
        georeference: Option<AuthorityId>,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) {
        self.settings.georeference = georeference;
        self.rebind_georeference(world, registry);
    }

    fn rebind_georeference(&mut self, world: &World, registry: &mut AuthorityRegistry) {
        self.invalidate_resolved_georeference(world, registry);

        let Some(owner) = self.level_instance(world) else {
            return;
        };
        self.resolve_georeference(world, registry, false);
        if let Some(switcher) = self.switcher(world, registry) {
            switcher.register_sub_level(owner);
        }
    }

    /// The cached resolved authority. May be stale; use
    /// [`Self::resolve_georeference`] to refresh.
    pub fn resolved_georeference(&self) -> Option<AuthorityId> {
        self.resolved
    }

    /// Resolve the authority: the declared one if valid, otherwise the
    /// default for the owner. Cached until invalid or `force_reresolve`.
    pub fn resolve_georeference(
        &mut self,
        world: &World,
        registry: &mut AuthorityRegistry,
        force_reresolve: bool,
    ) -> Option<AuthorityId> {
        if let Some(id) = self.resolved {
            if registry.contains(id) && !force_reresolve {
                return Some(id);
            }
        }

        let previous = self.resolved;
        let next = match self.settings.georeference {
            Some(id) if registry.contains(id) => Some(id),
            _ => registry.default_for(world, self.owner),
        };

        if previous != next {
            self.invalidate_resolved_georeference(world, registry);
        }

        self.resolved = next;
        self.resolved
    }

    /// Push this sub-level's origin into its authority when it is the active
    /// one and the values differ. Returns whether a push happened.
    pub fn update_georeference_if_active(
        &self,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) -> bool {
        let Some(owner) = self.level_instance(world) else {
            return false;
        };
        let Some(id) = self.resolved.filter(|id| registry.contains(*id)) else {
            // Not associated with an authority yet.
            return false;
        };
        let Some(switcher) = self.switcher(world, registry) else {
            return false;
        };
        let current = switcher.current_sub_level();
        let target = switcher.target_sub_level();

        if !is_origin_active(current, target, owner) {
            return false;
        }

        let Some(authority) = registry.get_mut(id) else {
            return false;
        };
        let origin = self.settings.origin;
        if authority.origin() == origin {
            return false;
        }
        authority.set_origin(origin.longitude, origin.latitude, origin.height);
        true
    }

    /// Host hook: the component was just added to an object. Adopts the
    /// authority's origin, and in interactive editing makes the new
    /// sub-level the switch target unless it is hidden.
    pub fn on_component_created(
        &mut self,
        world: &World,
        registry: &mut AuthorityRegistry,
        interactive_editing_enabled: bool,
    ) {
        let Some(id) = self.resolve_georeference(world, registry, false) else {
            return;
        };
        if self.switcher(world, registry).is_none() {
            return;
        }
        if let Some(authority) = registry.get(id) {
            self.settings.origin = authority.origin();
        }

        if !interactive_editing_enabled {
            return;
        }
        let Some(owner) = world.get(self.owner) else {
            return;
        };
        if owner.kind == EntityKind::LevelInstance && !owner.hidden {
            let owner_id = self.owner;
            if let Some(switcher) = self.switcher(world, registry) {
                switcher.set_target_sub_level(Some(owner_id));
            }
        }
    }

    /// Host hook: the component was registered with the scene.
    pub fn on_register(&mut self, world: &World, registry: &mut AuthorityRegistry) {
        let Some(owner) = self.level_instance(world) else {
            return;
        };
        self.resolve_georeference(world, registry, false);
        if let Some(switcher) = self.switcher(world, registry) {
            switcher.register_sub_level(owner);
        }
        self.update_georeference_if_active(world, registry);
    }

    /// Host hook: the component was unregistered from the scene.
    pub fn on_unregister(&mut self, world: &World, registry: &mut AuthorityRegistry) {
        let Some(owner) = self.level_instance(world) else {
            return;
        };
        if let Some(switcher) = self.switcher(world, registry) {
            switcher.unregister_sub_level(owner);
        }
    }

    /// Host hook: simulation started.
    pub fn begin_play(&mut self, world: &World, registry: &mut AuthorityRegistry) {
        self.resolve_georeference(world, registry, false);
        let Some(owner) = self.level_instance(world) else {
            return;
        };
        if let Some(switcher) = self.switcher(world, registry) {
            switcher.register_sub_level(owner);
        }
    }

    /// Host hook: the component is being destroyed.
    pub fn begin_destroy(&mut self, world: &World, registry: &mut AuthorityRegistry) {
        self.invalidate_resolved_georeference(world, registry);
    }

    /// Host hook: a property was edited in place by the host's property UI.
    pub fn post_edit_change_property(
        &mut self,
        property: SubLevelProperty,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) {
        match property {
            SubLevelProperty::OriginLongitude
            | SubLevelProperty::OriginLatitude
            | SubLevelProperty::OriginHeight => {
                self.update_georeference_if_active(world, registry);
            }
            SubLevelProperty::Georeference => self.rebind_georeference(world, registry),
            SubLevelProperty::Enabled | SubLevelProperty::LoadRadius => {}
        }
    }

    /// Direct mutable access for the host property UI. Callers must follow
    /// up with [`Self::post_edit_change_property`].
    pub fn settings_mut(&mut self) -> &mut SubLevelSettings {
        &mut self.settings
    }

    /// The owning level instance, or `None` with a warning when the
    /// component sits on something else.
    pub fn level_instance(&self, world: &World) -> Option<EntityId> {
        match world.get(self.owner) {
            Some(data) if data.kind == EntityKind::LevelInstance => Some(self.owner),
            _ => {
                tracing::warn!(
                    owner = %self.owner.short(),
                    "a sub-level component can only be attached to a level instance"
                );
                None
            }
        }
    }

    /// Switcher of the resolved authority. Transient owners never get one.
    fn switcher<'r>(
        &self,
        world: &World,
        registry: &'r mut AuthorityRegistry,
    ) -> Option<&'r mut SubLevelSwitcher> {
        let id = self.resolved?;
        if world.get(self.owner).is_some_and(|d| d.transient) {
            return None;
        }
        registry.get_mut(id)?.switcher_mut()
    }

    fn invalidate_resolved_georeference(
        &mut self,
        world: &World,
        registry: &mut AuthorityRegistry,
    ) {
        if self.resolved.is_some_and(|id| registry.contains(id)) {
            if let Some(owner) = self.level_instance(world) {
                if let Some(switcher) = self.switcher(world, registry) {
                    switcher.unregister_sub_level(owner);
                }
            }
        }
        self.resolved = None;
    }
}
