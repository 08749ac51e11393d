use georebase_common::{EntityId, Transform};
use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of host object an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// An independently streamable level instance (a sub-level owner).
    LevelInstance,
    /// A 3D tileset actor; its transform is its root node's relative transform.
    Tileset,
    /// Any other placed object.
    Actor,
}

/// An event record produced by every mutation to the world.
///
/// Each event carries enough information to reconstruct or reverse the
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorldEvent {
    /// Entity was spawned with the given data.
    Spawned { id: EntityId, data: EntityData },
    /// Entity was despawned. Carries the data it had for undo support.
    Despawned { id: EntityId, data: EntityData },
    /// Entity relative transform was updated.
    TransformUpdated {
        id: EntityId,
        old: Transform,
        new: Transform,
    },
    /// The host re-centered its floating origin.
    OriginShifted { old: DVec3, new: DVec3 },
    /// Simulation advanced one tick.
    Stepped { tick: u64 },
}

/// Per-entity data stored in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub name: String,
    pub kind: EntityKind,
    /// Relative to `parent`, or to the world origin for roots.
    pub transform: Transform,
    pub parent: Option<EntityId>,
    /// Transient objects (drag previews and the like) are never registered
    /// with switchers.
    #[serde(default)]
    pub transient: bool,
    /// Temporarily hidden in the editor.
    #[serde(default)]
    pub hidden: bool,
}

impl EntityData {
    pub fn new(name: impl Into<String>, kind: EntityKind, transform: Transform) -> Self {
        Self {
            name: name.into(),
            kind,
            transform,
            parent: None,
            transient: false,
            hidden: false,
        }
    }
}

/// The host scene.
///
/// Placements are double precision. The host may move its floating origin
/// (`world_origin`) for precision; root transforms are expressed relative to
/// it, and [`World::absolute_matrix`] adds it back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    entities: BTreeMap<EntityId, EntityData>,
    tick: u64,
    world_origin: DVec3,
    /// Append-only event log of all mutations.
    #[serde(skip)]
    event_log: Vec<WorldEvent>,
}

impl World {
    /// Create an empty world at tick 0 with the origin at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Number of entities in the world.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    /// Read-only access to all entities (BTreeMap for deterministic iteration).
    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    /// Offset of the host's floating origin.
    pub fn world_origin(&self) -> DVec3 {
        self.world_origin
    }

    /// Move the floating origin. Root transforms are left as they are, the
    /// same way the host leaves its actors in place and only reinterprets
    /// them.
    pub fn set_world_origin(&mut self, new: DVec3) {
        let old = self.world_origin;
        self.world_origin = new;
        tracing::debug!(?old, ?new, "world origin shifted");
        self.event_log.push(WorldEvent::OriginShifted { old, new });
    }

    /// Spawn a root entity. Returns its id.
    pub fn spawn(&mut self, name: &str, kind: EntityKind, transform: Transform) -> EntityId {
        let id = EntityId::new();
        self.spawn_with_id(id, EntityData::new(name, kind, transform));
        id
    }

    /// Spawn an entity attached to `parent`. Returns `None` if the parent
    /// does not exist.
    pub fn spawn_child(
        &mut self,
        parent: EntityId,
        name: &str,
        kind: EntityKind,
        transform: Transform,
    ) -> Option<EntityId> {
        if !self.entities.contains_key(&parent) {
            return None;
        }
        let id = EntityId::new();
        let mut data = EntityData::new(name, kind, transform);
        data.parent = Some(parent);
        self.spawn_with_id(id, data);
        Some(id)
    }

    /// Spawn an entity with a specific id (used for replay/undo).
    pub fn spawn_with_id(&mut self, id: EntityId, data: EntityData) {
        self.entities.insert(id, data.clone());
        self.event_log.push(WorldEvent::Spawned { id, data });
    }

    /// Remove an entity and, recursively, its children. Returns the data of
    /// `id` if it existed.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityData> {
        for child in self.children_of(id) {
            self.despawn(child);
        }
        let data = self.entities.remove(&id);
        if let Some(ref d) = data {
            self.event_log.push(WorldEvent::Despawned {
                id,
                data: d.clone(),
            });
        }
        data
    }

    /// Get a reference to entity data.
    pub fn get(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    /// Whether `id` refers to a live entity.
    pub fn is_valid(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Find the first entity with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(id, _)| *id)
    }

    /// Direct children of `id`, in id order.
    pub fn children_of(&self, id: EntityId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, d)| d.parent == Some(id))
            .map(|(child, _)| *child)
            .collect()
    }

    pub fn set_hidden(&mut self, id: EntityId, hidden: bool) -> bool {
        match self.entities.get_mut(&id) {
            Some(data) => {
                data.hidden = hidden;
                true
            }
            None => false,
        }
    }

    pub fn set_transient(&mut self, id: EntityId, transient: bool) -> bool {
        match self.entities.get_mut(&id) {
            Some(data) => {
                data.transient = transient;
                true
            }
            None => false,
        }
    }

    /// Update an entity's relative transform and log the change.
    pub fn set_transform(&mut self, id: EntityId, new: Transform) -> bool {
        if let Some(data) = self.entities.get_mut(&id) {
            let old = data.transform;
            data.transform = new;
            self.event_log
                .push(WorldEvent::TransformUpdated { id, old, new });
            true
        } else {
            false
        }
    }

    /// Transform of `id` relative to the floating origin (parents applied).
    pub fn world_matrix(&self, id: EntityId) -> Option<DMat4> {
        let data = self.entities.get(&id)?;
        let local = data.transform.to_matrix();
        match data.parent {
            Some(parent) => Some(self.world_matrix(parent)? * local),
            None => Some(local),
        }
    }

    /// Transform of `id` in absolute host space, i.e. including the floating
    /// origin offset.
    pub fn absolute_matrix(&self, id: EntityId) -> Option<DMat4> {
        Some(DMat4::from_translation(self.world_origin) * self.world_matrix(id)?)
    }

    /// Relative transform that would place `id` at the given absolute
    /// matrix, given its current parent chain.
    pub fn relative_for_absolute(&self, id: EntityId, absolute: &DMat4) -> Option<Transform> {
        let data = self.entities.get(&id)?;
        let parent_absolute = match data.parent {
            Some(parent) => self.absolute_matrix(parent)?,
            None => DMat4::from_translation(self.world_origin),
        };
        Some(Transform::from_matrix(&(parent_absolute.inverse() * *absolute)))
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.event_log.push(WorldEvent::Stepped { tick: self.tick });
    }

    /// Reconstruct world state from a sequence of events (for replay).
    pub fn replay(events: &[WorldEvent]) -> Self {
        let mut world = Self::new();
        for event in events {
            match event {
                WorldEvent::Spawned { id, data } => {
                    world.entities.insert(*id, data.clone());
                }
                WorldEvent::Despawned { id, .. } => {
                    world.entities.remove(id);
                }
                WorldEvent::TransformUpdated { id, new, .. } => {
                    if let Some(data) = world.entities.get_mut(id) {
                        data.transform = *new;
                    }
                }
                WorldEvent::OriginShifted { new, .. } => {
                    world.world_origin = *new;
                }
                WorldEvent::Stepped { tick } => {
                    world.tick = *tick;
                }
            }
        }
        world
    }

    /// Compute a deterministic hash of the world state for comparison.
    /// Bit-exact: any change to any placement changes the hash.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        let mix_f64s = |h: &mut u64, values: &[f64]| {
            for v in values {
                mix(h, &v.to_le_bytes());
            }
        };
        mix(&mut h, &self.tick.to_le_bytes());
        mix_f64s(&mut h, &self.world_origin.to_array());
        for (id, data) in &self.entities {
            mix(&mut h, id.0.as_bytes());
            mix(&mut h, data.name.as_bytes());
            if let Some(parent) = data.parent {
                mix(&mut h, parent.0.as_bytes());
            }
            let t = &data.transform;
            mix_f64s(&mut h, &t.translation.to_array());
            mix_f64s(&mut h, &t.rotation.to_array());
            mix_f64s(&mut h, &t.scale.to_array());
        }
        h
    }
}
