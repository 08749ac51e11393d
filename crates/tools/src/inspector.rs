use std::fmt;

use georebase_common::{AuthorityId, EntityId};
use georebase_geo::GeoOrigin;
use georebase_kernel::{EntityKind, World};
use georebase_sublevel::{Scene, is_origin_active};
use glam::DVec3;

/// Read-only queries against a loaded scene, for the CLI and debugging.
pub struct SceneInspector;

impl SceneInspector {
    pub fn summary(scene: &Scene) -> SceneSummary {
        let tilesets = scene
            .world
            .entities()
            .values()
            .filter(|d| d.kind == EntityKind::Tileset)
            .count();
        SceneSummary {
            tick: scene.world.tick(),
            entity_count: scene.world.entity_count(),
            authority_count: scene.authorities.len(),
            sub_level_count: scene.sub_levels.len(),
            tileset_count: tilesets,
            world_origin: scene.world.world_origin(),
            undo_depth: scene.editor.undo_count(),
        }
    }

    pub fn authorities(scene: &Scene) -> Vec<AuthorityInfo> {
        let name_of = |id: Option<EntityId>| {
            id.and_then(|id| scene.world.get(id))
                .map(|d| d.name.clone())
        };
        scene
            .authorities
            .iter()
            .map(|a| {
                let switcher = a.switcher();
                AuthorityInfo {
                    id: a.id(),
                    name: a.name().to_string(),
                    origin: a.origin(),
                    scale: a.scale(),
                    origin_changes: a.origin_changes(),
                    registered: switcher.map_or(0, |s| s.registered().len()),
                    current: name_of(switcher.and_then(|s| s.current_sub_level())),
                    target: name_of(switcher.and_then(|s| s.target_sub_level())),
                }
            })
            .collect()
    }

    pub fn sub_levels(scene: &Scene) -> Vec<SubLevelInfo> {
        scene
            .sub_levels
            .iter()
            .filter_map(|c| {
                let data = scene.world.get(c.owner())?;
                let authority = c
                    .resolved_georeference()
                    .and_then(|id| scene.authorities.get(id));
                let active = authority
                    .and_then(|a| a.switcher())
                    .is_some_and(|s| {
                        is_origin_active(s.current_sub_level(), s.target_sub_level(), c.owner())
                    });
                let tilesets = count_nested_tilesets(&scene.world, c.owner());
                Some(SubLevelInfo {
                    id: c.owner(),
                    name: data.name.clone(),
                    enabled: c.enabled(),
                    origin: c.origin(),
                    load_radius: c.load_radius(),
                    authority: authority.map(|a| a.name().to_string()),
                    active,
                    placement: data.transform.translation,
                    tilesets,
                })
            })
            .collect()
    }
}

/// Tilesets anywhere below `root`.
fn count_nested_tilesets(world: &World, root: EntityId) -> usize {
    let mut count = 0;
    let mut stack = world.children_of(root);
    while let Some(id) = stack.pop() {
        if world.get(id).is_some_and(|d| d.kind == EntityKind::Tileset) {
            count += 1;
        }
        stack.extend(world.children_of(id));
    }
    count
}

#[derive(Debug, Clone)]
pub struct SceneSummary {
    pub tick: u64,
    pub entity_count: usize,
    pub authority_count: usize,
    pub sub_level_count: usize,
    pub tileset_count: usize,
    pub world_origin: DVec3,
    pub undo_depth: usize,
}

impl fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scene: tick={} entities={} georeferences={} sub_levels={} tilesets={} undo={}",
            self.tick,
            self.entity_count,
            self.authority_count,
            self.sub_level_count,
            self.tileset_count,
            self.undo_depth
        )
    }
}

#[derive(Debug, Clone)]
pub struct AuthorityInfo {
    pub id: AuthorityId,
    pub name: String,
    pub origin: GeoOrigin,
    pub scale: f64,
    pub origin_changes: usize,
    pub registered: usize,
    pub current: Option<String>,
    pub target: Option<String>,
}

impl fmt::Display for AuthorityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Georeference {:?} [{}] {} scale={} registered={} current={} target={}",
            self.name,
            self.id.0,
            self.origin,
            self.scale,
            self.registered,
            self.current.as_deref().unwrap_or("-"),
            self.target.as_deref().unwrap_or("-"),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SubLevelInfo {
    pub id: EntityId,
    pub name: String,
    pub enabled: bool,
    pub origin: GeoOrigin,
    pub load_radius: f64,
    pub authority: Option<String>,
    pub active: bool,
    pub placement: DVec3,
    pub tilesets: usize,
}

impl fmt::Display for SubLevelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubLevel {:?} [{}] {} radius={:.0}m pos=({:.3}, {:.3}, {:.3}) tilesets={} georeference={}{}{}",
            self.name,
            self.id.short(),
            self.origin,
            self.load_radius,
            self.placement.x,
            self.placement.y,
            self.placement.z,
            self.tilesets,
            self.authority.as_deref().unwrap_or("-"),
            if self.enabled { "" } else { " (disabled)" },
            if self.active { " (active)" } else { "" },
        )
    }
}
