use std::path::Path;

use georebase_author::Editor;
use georebase_common::{AuthorityId, EntityId, Transform};
use georebase_geo::{GeoError, GeoOrigin};
use georebase_kernel::{EntityKind, World};
use georebase_stream::SwitchPhase;
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::component::{SubLevelComponent, SubLevelSettings};
use crate::georeference::AuthorityRegistry;
use crate::proximity::select_target_by_proximity;
use crate::rebase::{self, RebaseError, RebaseOptions, RebasePlan};
use crate::viewport::ViewportCamera;

/// Errors from loading or operating on a scene.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported scene format: {0}")]
    UnsupportedFormat(String),
    #[error("unknown georeference {0:?}")]
    UnknownGeoreference(String),
    #[error("unknown sub-level {0:?}")]
    UnknownSubLevel(String),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error(transparent)]
    Rebase(#[from] RebaseError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoreferenceDescription {
    pub name: String,
    pub origin: GeoOrigin,
    pub scale: f64,
    pub default: bool,
}

impl Default for GeoreferenceDescription {
    fn default() -> Self {
        Self {
            name: "CesiumGeoreference".into(),
            origin: GeoOrigin::default(),
            scale: 1.0,
            default: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TilesetDescription {
    pub name: String,
    /// Root transform relative to the parent node.
    pub transform: Transform,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tilesets: Vec<TilesetDescription>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<ActorDescription>,
}

/// A plain node under a level instance, such as a group tilesets hang from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorDescription {
    pub name: String,
    pub transform: Transform,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tilesets: Vec<TilesetDescription>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<ActorDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubLevelDescription {
    pub name: String,
    /// Georeference by name; `None` uses default discovery.
    pub georeference: Option<String>,
    pub enabled: bool,
    pub origin: GeoOrigin,
    pub load_radius: f64,
    pub transform: Transform,
    pub hidden: bool,
    pub tilesets: Vec<TilesetDescription>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<ActorDescription>,
}

impl Default for SubLevelDescription {
    fn default() -> Self {
        let settings = SubLevelSettings::default();
        Self {
            name: String::new(),
            georeference: None,
            enabled: settings.enabled,
            origin: settings.origin,
            load_radius: settings.load_radius,
            transform: Transform::IDENTITY,
            hidden: false,
            tilesets: Vec::new(),
            actors: Vec::new(),
        }
    }
}

/// On-disk scene layout, YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub world_origin: DVec3,
    pub options: RebaseOptions,
    pub camera: ViewportCamera,
    pub georeferences: Vec<GeoreferenceDescription>,
    pub sub_levels: Vec<SubLevelDescription>,
}

enum Format {
    Yaml,
    Json,
}

fn format_for(path: &Path) -> Result<Format, SceneError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        _ => Err(SceneError::UnsupportedFormat(path.display().to_string())),
    }
}

impl SceneDescription {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let format = format_for(path)?;
        let file = std::fs::File::open(path)?;
        let desc = match format {
            Format::Yaml => serde_yaml::from_reader(file)?,
            Format::Json => serde_json::from_reader(file)?,
        };
        Ok(desc)
    }

    /// Save to a `.yaml`/`.yml` or `.json` file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let path = path.as_ref();
        let format = format_for(path)?;
        let file = std::fs::File::create(path)?;
        match format {
            Format::Yaml => serde_yaml::to_writer(file, self)?,
            Format::Json => serde_json::to_writer_pretty(file, self)?,
        }
        Ok(())
    }
}

/// A loaded scene: host world, authorities, sub-level components, editor
/// history, and the viewport camera.
pub struct Scene {
    pub world: World,
    pub authorities: AuthorityRegistry,
    pub sub_levels: Vec<SubLevelComponent>,
    pub editor: Editor,
    pub camera: ViewportCamera,
    pub options: RebaseOptions,
}

impl Scene {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        Self::from_description(&SceneDescription::load(path)?)
    }

    /// Build the world and register every sub-level with its authority.
    pub fn from_description(desc: &SceneDescription) -> Result<Self, SceneError> {
        let _span = tracing::info_span!("scene_build").entered();

        let mut world = World::new();
        if desc.world_origin != DVec3::ZERO {
            world.set_world_origin(desc.world_origin);
        }

        let mut authorities = AuthorityRegistry::new();
        for g in &desc.georeferences {
            let origin = GeoOrigin::checked(g.origin.longitude, g.origin.latitude, g.origin.height)?;
            let id = authorities.create(&g.name, origin);
            if let Some(authority) = authorities.get_mut(id) {
                authority.set_scale(g.scale);
                authority.set_default(g.default);
            }
        }

        let mut sub_levels = Vec::with_capacity(desc.sub_levels.len());
        for s in &desc.sub_levels {
            let georeference = match &s.georeference {
                Some(name) => Some(
                    authorities
                        .find_by_name(name)
                        .ok_or_else(|| SceneError::UnknownGeoreference(name.clone()))?,
                ),
                None => None,
            };
            let origin = GeoOrigin::checked(s.origin.longitude, s.origin.latitude, s.origin.height)?;

            let level = world.spawn(&s.name, EntityKind::LevelInstance, s.transform);
            world.set_hidden(level, s.hidden);
            spawn_attached(&mut world, level, &s.tilesets, &s.actors);

            let mut component = SubLevelComponent::new(
                level,
                SubLevelSettings {
                    enabled: s.enabled,
                    origin,
                    load_radius: s.load_radius,
                    georeference,
                },
            );
            component.on_register(&world, &mut authorities);
            sub_levels.push(component);
        }

        tracing::info!(
            georeferences = authorities.len(),
            sub_levels = sub_levels.len(),
            entities = world.entity_count(),
            "scene built"
        );

        Ok(Self {
            world,
            authorities,
            sub_levels,
            editor: Editor::new(),
            camera: desc.camera,
            options: desc.options.clone(),
        })
    }

    /// Index of the sub-level whose level instance has this name.
    pub fn sub_level_index(&self, name: &str) -> Option<usize> {
        self.sub_levels.iter().position(|c| {
            self.world
                .get(c.owner())
                .is_some_and(|data| data.name == name)
        })
    }

    pub fn sub_level(&self, name: &str) -> Option<&SubLevelComponent> {
        self.sub_level_index(name).map(|i| &self.sub_levels[i])
    }

    /// Name of a sub-level's level instance.
    pub fn sub_level_name(&self, component: &SubLevelComponent) -> Option<&str> {
        self.world.get(component.owner()).map(|d| d.name.as_str())
    }

    /// Run the "place origin here" action on a named sub-level.
    pub fn place_origin(&mut self, name: &str) -> Result<RebasePlan, SceneError> {
        let index = self
            .sub_level_index(name)
            .ok_or_else(|| SceneError::UnknownSubLevel(name.to_string()))?;
        let plan = rebase::place_georeference_origin_at_sub_level_origin(
            &mut self.world,
            &mut self.editor,
            &mut self.authorities,
            &mut self.sub_levels[index],
            Some(&mut self.camera),
            &self.options,
        )?;
        Ok(plan)
    }

    /// Undo a rebase made by [`Self::place_origin`].
    pub fn revert(&mut self, plan: &RebasePlan) -> bool {
        let Some(index) = self.sub_levels.iter().position(|c| c.owner() == plan.sub_level) else {
            return false;
        };
        rebase::revert_rebase(
            plan,
            &mut self.world,
            &mut self.editor,
            &mut self.authorities,
            &mut self.sub_levels[index],
        )
    }

    /// ECEF position of the viewport camera in an authority's frame.
    pub fn camera_ecef(&self, authority: AuthorityId) -> Option<DVec3> {
        let frame = self
            .authorities
            .get(authority)?
            .local_frame(self.options.units_per_meter);
        Some(frame.transform_local_to_ecef(self.world.world_origin(), self.camera.location))
    }

    /// Point every switcher's target at the nearest in-range sub-level
    /// attached to it. Returns the new targets.
    pub fn target_by_proximity(&mut self, camera_ecef: DVec3) -> Vec<(AuthorityId, Option<EntityId>)> {
        let mut targets = Vec::new();
        for authority in self.authorities.iter_mut() {
            let id = authority.id();
            let ellipsoid = authority.ellipsoid();
            let attached = self
                .sub_levels
                .iter()
                .filter(|c| c.resolved_georeference() == Some(id));
            let target = select_target_by_proximity(camera_ecef, attached, &ellipsoid);
            if let Some(switcher) = authority.switcher_mut() {
                switcher.set_target_sub_level(target);
            }
            targets.push((id, target));
        }
        targets
    }

    /// Step every switcher once, then let the active sub-levels publish
    /// their origins. A level counts as loaded while it exists.
    pub fn update_switchers(&mut self) -> Vec<(AuthorityId, SwitchPhase)> {
        let world = &self.world;
        let phases = self
            .authorities
            .iter_mut()
            .filter_map(|authority| {
                let id = authority.id();
                let phase = authority.switcher_mut()?.update(|level| world.is_valid(level));
                Some((id, phase))
            })
            .collect();

        for component in &self.sub_levels {
            component.update_georeference_if_active(&self.world, &mut self.authorities);
        }
        phases
    }

    /// Snapshot the scene back into its on-disk form.
    pub fn to_description(&self) -> SceneDescription {
        let georeferences = self
            .authorities
            .iter()
            .map(|a| GeoreferenceDescription {
                name: a.name().to_string(),
                origin: a.origin(),
                scale: a.scale(),
                default: a.is_default(),
            })
            .collect();

        let sub_levels = self
            .sub_levels
            .iter()
            .filter_map(|c| {
                let data = self.world.get(c.owner())?;
                let (tilesets, actors) = describe_attached(&self.world, c.owner());
                let georeference = c
                    .georeference()
                    .and_then(|id| self.authorities.get(id))
                    .map(|a| a.name().to_string());
                Some(SubLevelDescription {
                    name: data.name.clone(),
                    georeference,
                    enabled: c.enabled(),
                    origin: c.origin(),
                    load_radius: c.load_radius(),
                    transform: data.transform,
                    hidden: data.hidden,
                    tilesets,
                    actors,
                })
            })
            .collect();

        SceneDescription {
            world_origin: self.world.world_origin(),
            options: self.options.clone(),
            camera: self.camera,
            georeferences,
            sub_levels,
        }
    }
}

fn spawn_attached(
    world: &mut World,
    parent: EntityId,
    tilesets: &[TilesetDescription],
    actors: &[ActorDescription],
) {
    for t in tilesets {
        if let Some(id) = world.spawn_child(parent, &t.name, EntityKind::Tileset, t.transform) {
            spawn_attached(world, id, &t.tilesets, &t.actors);
        }
    }
    for a in actors {
        if let Some(id) = world.spawn_child(parent, &a.name, EntityKind::Actor, a.transform) {
            spawn_attached(world, id, &a.tilesets, &a.actors);
        }
    }
}

/// Everything attached below `parent`. Level instances are sub-levels of
/// their own and are not nested into the description.
fn describe_attached(
    world: &World,
    parent: EntityId,
) -> (Vec<TilesetDescription>, Vec<ActorDescription>) {
    let mut tilesets = Vec::new();
    let mut actors = Vec::new();
    for id in world.children_of(parent) {
        let Some(data) = world.get(id) else { continue };
        let (child_tilesets, child_actors) = describe_attached(world, id);
        match data.kind {
            EntityKind::Tileset => tilesets.push(TilesetDescription {
                name: data.name.clone(),
                transform: data.transform,
                tilesets: child_tilesets,
                actors: child_actors,
            }),
            EntityKind::Actor => actors.push(ActorDescription {
                name: data.name.clone(),
                transform: data.transform,
                tilesets: child_tilesets,
                actors: child_actors,
            }),
            EntityKind::LevelInstance => {}
        }
    }
    (tilesets, actors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE_YAML: &str = r#"
georeferences:
  - name: Georeference
    origin: { longitude: -105.25737, latitude: 39.736401, height: 2250.0 }
    default: true
sub_levels:
  - name: Denver
    origin: { longitude: -105.25737, latitude: 39.736401, height: 2250.0 }
    load_radius: 5000.0
    tilesets:
      - name: Denver Photogrammetry
  - name: Boulder
    georeference: Georeference
    origin: { longitude: -105.2705, latitude: 40.015, height: 1655.0 }
    transform:
      translation: [-1100.0, 30900.0, -600.0]
"#;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        std::fs::write(tmp.path(), contents).unwrap();
        tmp
    }

    #[test]
    fn loads_yaml_scene() {
        let tmp = write_temp(".yaml", SCENE_YAML);
        let scene = Scene::load(tmp.path()).unwrap();
        assert_eq!(scene.authorities.len(), 1);
        assert_eq!(scene.sub_levels.len(), 2);
        // Two level instances and one tileset.
        assert_eq!(scene.world.entity_count(), 3);

        let denver = scene.sub_level("Denver").unwrap();
        assert_eq!(denver.load_radius(), 5000.0);
        assert!(denver.resolved_georeference().is_some());

        let authority = denver.resolved_georeference().unwrap();
        let switcher = scene.authorities.get(authority).unwrap().switcher().unwrap();
        assert_eq!(switcher.registered().len(), 2);
    }

    #[test]
    fn json_round_trip_keeps_layout() {
        let yaml = write_temp(".yaml", SCENE_YAML);
        let scene = Scene::load(yaml.path()).unwrap();

        let json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        scene.to_description().save(json.path()).unwrap();
        let reloaded = Scene::load(json.path()).unwrap();
        assert_eq!(reloaded.sub_levels.len(), 2);
        let boulder = reloaded.sub_level("Boulder").unwrap();
        assert_eq!(boulder.origin(), GeoOrigin::new(-105.2705, 40.015, 1655.0));
        assert!(boulder.georeference().is_some());
    }

    #[test]
    fn nested_tilesets_survive_save_and_rebase() {
        let desc = SceneDescription {
            georeferences: vec![GeoreferenceDescription {
                name: "georef".into(),
                ..Default::default()
            }],
            sub_levels: vec![SubLevelDescription {
                name: "city".into(),
                origin: GeoOrigin::default(),
                transform: Transform::from_translation(DVec3::new(2000.0, 0.0, 0.0)),
                actors: vec![ActorDescription {
                    name: "group".into(),
                    transform: Transform::from_translation(DVec3::new(0.0, 50.0, 0.0)),
                    tilesets: vec![TilesetDescription {
                        name: "buildings".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut scene = Scene::from_description(&desc).unwrap();
        let plan = scene.place_origin("city").unwrap();
        assert_eq!(plan.tilesets.len(), 1);

        let tmp = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        scene.to_description().save(tmp.path()).unwrap();
        let reloaded = SceneDescription::load(tmp.path()).unwrap();
        let city = &reloaded.sub_levels[0];
        assert!(city.tilesets.is_empty());
        assert_eq!(city.actors.len(), 1);
        let group = &city.actors[0];
        assert_eq!(group.name, "group");
        assert_eq!(group.tilesets.len(), 1);
        assert_eq!(group.tilesets[0].name, "buildings");
        let saved = group.tilesets[0].transform;
        let rebased = plan.tilesets[0].new_relative;
        assert!(saved.abs_diff_eq(&rebased, 1e-6));
        assert!(!saved.abs_diff_eq(&Transform::IDENTITY, 1e-3));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let tmp = write_temp(".toml", "");
        assert!(matches!(
            Scene::load(tmp.path()),
            Err(SceneError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unknown_georeference_is_rejected() {
        let desc = SceneDescription {
            sub_levels: vec![SubLevelDescription {
                name: "a".into(),
                georeference: Some("missing".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            Scene::from_description(&desc),
            Err(SceneError::UnknownGeoreference(name)) if name == "missing"
        ));
    }

    #[test]
    fn out_of_range_origin_is_rejected() {
        let desc = SceneDescription {
            georeferences: vec![GeoreferenceDescription {
                origin: GeoOrigin::new(0.0, 95.0, 0.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            Scene::from_description(&desc),
            Err(SceneError::Geo(GeoError::InvalidLatitude(_)))
        ));
    }

    #[test]
    fn proximity_then_update_activates_and_publishes() {
        let tmp = write_temp(".yaml", SCENE_YAML);
        let mut scene = Scene::load(tmp.path()).unwrap();
        let boulder = scene.sub_level("Boulder").unwrap();
        let boulder_id = boulder.owner();
        let authority = boulder.resolved_georeference().unwrap();
        let boulder_origin = boulder.origin();

        let camera = GeoOrigin::new(-105.2705, 40.015, 1700.0)
            .to_ecef(&scene.authorities.get(authority).unwrap().ellipsoid());
        let targets = scene.target_by_proximity(camera);
        assert_eq!(targets, vec![(authority, Some(boulder_id))]);

        let phases = scene.update_switchers();
        assert_eq!(phases, vec![(authority, SwitchPhase::Activated(boulder_id))]);
        assert_eq!(scene.authorities.get(authority).unwrap().origin(), boulder_origin);
    }

    #[test]
    fn place_origin_on_unknown_sub_level_fails() {
        let tmp = write_temp(".yaml", SCENE_YAML);
        let mut scene = Scene::load(tmp.path()).unwrap();
        assert!(matches!(
            scene.place_origin("Nowhere"),
            Err(SceneError::UnknownSubLevel(_))
        ));
    }

    #[test]
    fn place_origin_and_revert() {
        let tmp = write_temp(".yaml", SCENE_YAML);
        let mut scene = Scene::load(tmp.path()).unwrap();
        let hash = scene.world.state_hash();
        let plan = scene.place_origin("Boulder").unwrap();
        assert_ne!(scene.world.state_hash(), hash);
        assert!(scene.revert(&plan));
        assert_eq!(scene.world.state_hash(), hash);
    }
}
