use georebase_author::{EditError, Editor};
use georebase_common::{EntityId, Transform};
use georebase_geo::{GeoOrigin, LocalFrame};
use georebase_kernel::{EntityKind, World};
use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::component::SubLevelComponent;
use crate::georeference::{AuthorityRegistry, GeoreferenceAuthority};
use crate::viewport::{self, ViewportCamera};

/// Undo label of the transaction wrapping a rebase.
pub const REBASE_TRANSACTION_LABEL: &str = "Place Georeference Origin At SubLevel Origin";

/// Host capabilities that shape a rebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebaseOptions {
    /// Recenter the editor viewport after the rebase.
    pub interactive_editing_enabled: bool,
    /// Host length units per metre, before the authority's scale.
    pub units_per_meter: f64,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self {
            interactive_editing_enabled: false,
            units_per_meter: 1.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RebaseError {
    #[error("sub-level has no georeference authority")]
    MissingAuthority,
    #[error("sub-level component is not attached to a level instance")]
    MisattachedComponent,
    #[error("sub-level {0:?} not found")]
    SubLevelNotFound(EntityId),
    #[error(
        "cannot place the origin: ECEF position {ecef} is too close to the center of the ellipsoid to convert to longitude/latitude/height"
    )]
    UnresolvableOrigin { ecef: DVec3 },
    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Matrices relating two tangent-plane frames through ECEF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebaseTransformPair {
    pub old_to_ecef: DMat4,
    pub ecef_to_old: DMat4,
    pub ecef_to_new: DMat4,
    pub new_to_ecef: DMat4,
    /// `ecef_to_new * old_to_ecef`.
    pub old_to_new: DMat4,
}

impl RebaseTransformPair {
    pub fn new(old: &LocalFrame, new: &LocalFrame) -> Self {
        let old_to_ecef = old.local_to_ecef();
        let ecef_to_new = new.ecef_to_local();
        Self {
            old_to_ecef,
            ecef_to_old: old.ecef_to_local(),
            ecef_to_new,
            new_to_ecef: new.local_to_ecef(),
            old_to_new: ecef_to_new * old_to_ecef,
        }
    }

    /// Re-express a tileset root stored relative to its parent.
    ///
    /// `old_absolute` is the root's absolute placement before the rebase and
    /// `new_parent` its parent's absolute placement after it (the level
    /// itself, or any node attached below the level). The result keeps the
    /// tileset's ECEF rendering unchanged: content is mapped out of the old
    /// frame and back into the new one.
    pub fn rebase_tileset_root(&self, old_absolute: &DMat4, new_parent: &DMat4) -> DMat4 {
        new_parent.inverse()
            * self.ecef_to_new
            * self.old_to_ecef
            * *old_absolute
            * self.ecef_to_old
            * self.new_to_ecef
    }
}

/// New relative transform for one tileset root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilesetRebase {
    pub id: EntityId,
    pub old_relative: Transform,
    pub new_relative: Transform,
}

/// Everything a rebase will change, computed without touching the scene.
#[derive(Debug, Clone)]
pub struct RebasePlan {
    pub sub_level: EntityId,
    pub old_origin: GeoOrigin,
    pub new_origin: GeoOrigin,
    pub transforms: RebaseTransformPair,
    /// Relative placement of the level instance before the rebase.
    pub old_placement: Transform,
    /// Relative placement of the level instance after the rebase.
    pub new_placement: Transform,
    pub tilesets: Vec<TilesetRebase>,
}

/// Compute a rebase moving the sub-level's origin to the level instance's
/// current position.
///
/// Fails with [`RebaseError::UnresolvableOrigin`] when that position cannot
/// be converted to longitude/latitude/height.
pub fn compute_rebase(
    world: &World,
    component: &SubLevelComponent,
    authority: &GeoreferenceAuthority,
    options: &RebaseOptions,
) -> Result<RebasePlan, RebaseError> {
    let level = component
        .level_instance(world)
        .ok_or(RebaseError::MisattachedComponent)?;
    let level_data = world.get(level).ok_or(RebaseError::SubLevelNotFound(level))?;
    let old_level = world
        .absolute_matrix(level)
        .ok_or(RebaseError::SubLevelNotFound(level))?;

    let ellipsoid = authority.ellipsoid();
    let units_per_meter = options.units_per_meter * authority.scale();
    let old_origin = component.origin();
    let old_frame = LocalFrame::new(ellipsoid, old_origin.to_ecef(&ellipsoid), units_per_meter);

    let level_center = world
        .world_matrix(level)
        .ok_or(RebaseError::SubLevelNotFound(level))?
        .w_axis
        .truncate();
    let ecef = old_frame.transform_local_to_ecef(world.world_origin(), level_center);
    let cartographic = ellipsoid
        .cartesian_to_cartographic(ecef)
        .ok_or(RebaseError::UnresolvableOrigin { ecef })?;
    let new_origin = GeoOrigin::from_cartographic(&cartographic);
    let new_frame = LocalFrame::new(ellipsoid, ecef, units_per_meter);

    let transforms = RebaseTransformPair::new(&old_frame, &new_frame);
    let new_level = transforms.old_to_new * old_level;
    let new_placement = world
        .relative_for_absolute(level, &new_level)
        .ok_or(RebaseError::SubLevelNotFound(level))?;

    // Depth-first over everything attached below the level, carrying each
    // parent's absolute placement before and after the rebase. Non-tileset
    // nodes keep their relative transform and simply follow their parent.
    let mut tilesets = Vec::new();
    let mut stack = vec![(level, old_level, new_level)];
    while let Some((parent, old_parent, new_parent)) = stack.pop() {
        for id in world.children_of(parent) {
            let Some(data) = world.get(id) else { continue };
            let old_absolute = old_parent * data.transform.to_matrix();
            let new_absolute = if data.kind == EntityKind::Tileset {
                let new_relative = Transform::from_matrix(
                    &transforms.rebase_tileset_root(&old_absolute, &new_parent),
                );
                tilesets.push(TilesetRebase {
                    id,
                    old_relative: data.transform,
                    new_relative,
                });
                new_parent * new_relative.to_matrix()
            } else {
                new_parent * data.transform.to_matrix()
            };
            stack.push((id, old_absolute, new_absolute));
        }
    }

    Ok(RebasePlan {
        sub_level: level,
        old_origin,
        new_origin,
        transforms,
        old_placement: level_data.transform,
        new_placement,
        tilesets,
    })
}

/// Apply a plan as one undoable transaction, then publish the new origin.
///
/// Placements are written before the origin so that anything observing the
/// authority sees consistent spatial data. If any placement write fails, the
/// transaction is rolled back and nothing else changes.
#[allow(clippy::too_many_arguments)]
pub fn apply_rebase(
    plan: &RebasePlan,
    world: &mut World,
    editor: &mut Editor,
    registry: &mut AuthorityRegistry,
    component: &mut SubLevelComponent,
    camera: Option<&mut ViewportCamera>,
    options: &RebaseOptions,
) -> Result<(), RebaseError> {
    editor.begin_transaction(REBASE_TRANSACTION_LABEL)?;
    if let Err(e) = write_placements(plan, world, editor) {
        editor.cancel_transaction(world)?;
        return Err(e.into());
    }
    editor.commit_transaction()?;

    component.set_origin(plan.new_origin, world, registry);

    if options.interactive_editing_enabled {
        if let Some(camera) = camera {
            viewport::recenter(camera, &plan.transforms.old_to_new, world.world_origin());
        }
    }
    Ok(())
}

fn write_placements(plan: &RebasePlan, world: &mut World, editor: &mut Editor) -> Result<(), EditError> {
    editor.set_transform(world, plan.sub_level, plan.new_placement)?;
    for tileset in &plan.tilesets {
        editor.set_transform(world, tileset.id, tileset.new_relative)?;
    }
    Ok(())
}

/// Move the sub-level's georeference origin to where its level instance
/// currently sits, keeping every placement and tileset visually in place.
///
/// Failures are logged and returned; the scene is untouched on error.
#[allow(clippy::too_many_arguments)]
pub fn place_georeference_origin_at_sub_level_origin(
    world: &mut World,
    editor: &mut Editor,
    registry: &mut AuthorityRegistry,
    component: &mut SubLevelComponent,
    camera: Option<&mut ViewportCamera>,
    options: &RebaseOptions,
) -> Result<RebasePlan, RebaseError> {
    let _span = tracing::info_span!("place_origin", owner = %component.owner().short()).entered();

    let result = (|| {
        let authority_id = component
            .resolve_georeference(world, registry, false)
            .ok_or(RebaseError::MissingAuthority)?;
        let authority = registry
            .get(authority_id)
            .ok_or(RebaseError::MissingAuthority)?;
        let plan = compute_rebase(world, component, authority, options)?;
        apply_rebase(&plan, world, editor, registry, component, camera, options)?;
        Ok(plan)
    })();

    match &result {
        Ok(plan) => tracing::info!(
            old = %plan.old_origin,
            new = %plan.new_origin,
            tilesets = plan.tilesets.len(),
            "placed georeference origin at sub-level origin"
        ),
        Err(e) => tracing::error!("{e}"),
    }
    result
}

/// Undo the most recent rebase if it is on top of the undo stack, restoring
/// the previous declared origin. Returns whether anything was undone.
///
/// The origin change is not part of the editor transaction, so the undone
/// step is dropped from the redo stack: a plain redo would move placements
/// back without the origin that goes with them.
pub fn revert_rebase(
    plan: &RebasePlan,
    world: &mut World,
    editor: &mut Editor,
    registry: &mut AuthorityRegistry,
    component: &mut SubLevelComponent,
) -> bool {
    if editor.undo_label() != Some(REBASE_TRANSACTION_LABEL) || !editor.undo(world) {
        return false;
    }
    editor.discard_redo();
    component.set_origin(plan.old_origin, world, registry);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::SubLevelSettings;
    use georebase_common::AuthorityId;
    use georebase_geo::Ellipsoid;
    use glam::DQuat;

    const EPS: f64 = 1e-6;

    struct Scene {
        world: World,
        editor: Editor,
        registry: AuthorityRegistry,
        authority: AuthorityId,
        level: EntityId,
        tileset: EntityId,
        component: SubLevelComponent,
    }

    fn scene(origin: GeoOrigin, level_at: DVec3) -> Scene {
        let mut world = World::new();
        let level = world.spawn(
            "level",
            EntityKind::LevelInstance,
            Transform::from_translation(level_at),
        );
        let tileset = world
            .spawn_child(level, "tileset", EntityKind::Tileset, Transform::IDENTITY)
            .unwrap();
        let mut registry = AuthorityRegistry::new();
        let authority = registry.create("georef", origin);
        let mut component = SubLevelComponent::new(
            level,
            SubLevelSettings {
                origin,
                ..Default::default()
            },
        );
        component.on_register(&world, &mut registry);
        Scene {
            world,
            editor: Editor::new(),
            registry,
            authority,
            level,
            tileset,
            component,
        }
    }

    fn place(s: &mut Scene) -> Result<RebasePlan, RebaseError> {
        place_georeference_origin_at_sub_level_origin(
            &mut s.world,
            &mut s.editor,
            &mut s.registry,
            &mut s.component,
            None,
            &RebaseOptions::default(),
        )
    }

    /// ECEF-to-ECEF map under which the tileset's georeferenced content is
    /// drawn: content ECEF into the sub-level frame, through the root
    /// placement, and back out to ECEF.
    fn rendering_map(s: &Scene, tileset: EntityId) -> DMat4 {
        let frame = LocalFrame::new(
            Ellipsoid::WGS84,
            s.component.origin().to_ecef(&Ellipsoid::WGS84),
            1.0,
        );
        frame.local_to_ecef() * s.world.absolute_matrix(tileset).unwrap() * frame.ecef_to_local()
    }

    fn level_ecef(s: &Scene) -> DVec3 {
        let frame = LocalFrame::new(
            Ellipsoid::WGS84,
            s.component.origin().to_ecef(&Ellipsoid::WGS84),
            1.0,
        );
        let local = s.world.world_matrix(s.level).unwrap().w_axis.truncate();
        frame.transform_local_to_ecef(s.world.world_origin(), local)
    }

    fn origin_eq(a: GeoOrigin, b: GeoOrigin) -> bool {
        (a.longitude - b.longitude).abs() < 1e-9
            && (a.latitude - b.latitude).abs() < 1e-9
            && (a.height - b.height).abs() < 1e-4
    }

    fn o2_in_o1_frame() -> DVec3 {
        let wgs = Ellipsoid::WGS84;
        let o1 = GeoOrigin::new(0.0, 0.0, 0.0);
        let o2 = GeoOrigin::new(1.0, 0.0, 0.0);
        LocalFrame::new(wgs, o1.to_ecef(&wgs), 1.0).transform_ecef_to_local(o2.to_ecef(&wgs))
    }

    #[test]
    fn transform_pair_composes_through_ecef() {
        let wgs = Ellipsoid::WGS84;
        let old = LocalFrame::new(wgs, GeoOrigin::new(0.0, 0.0, 0.0).to_ecef(&wgs), 1.0);
        let new = LocalFrame::new(wgs, GeoOrigin::new(1.0, 0.0, 0.0).to_ecef(&wgs), 1.0);
        let pair = RebaseTransformPair::new(&old, &new);
        assert!(
            (pair.ecef_to_old * pair.old_to_ecef).abs_diff_eq(DMat4::IDENTITY, 1e-9)
        );
        assert!(
            (pair.ecef_to_new * pair.new_to_ecef).abs_diff_eq(DMat4::IDENTITY, 1e-9)
        );
        let p = DVec3::new(12.0, -3.0, 4.0);
        let via_ecef = new.transform_ecef_to_local(old.local_to_ecef().transform_point3(p));
        assert!(pair.old_to_new.transform_point3(p).abs_diff_eq(via_ecef, 1e-6));
    }

    #[test]
    fn rebase_at_own_origin_is_identity() {
        let mut s = scene(GeoOrigin::new(-105.25, 39.75, 1600.0), DVec3::ZERO);
        let before_level = s.world.get(s.level).unwrap().transform;
        let before_tileset = s.world.get(s.tileset).unwrap().transform;

        let plan = place(&mut s).unwrap();

        assert!(plan.transforms.old_to_new.abs_diff_eq(DMat4::IDENTITY, 1e-6));
        assert!(s.world.get(s.level).unwrap().transform.abs_diff_eq(&before_level, EPS));
        assert!(s.world.get(s.tileset).unwrap().transform.abs_diff_eq(&before_tileset, EPS));
        assert!(origin_eq(s.component.origin(), GeoOrigin::new(-105.25, 39.75, 1600.0)));
    }

    #[test]
    fn rebasing_twice_is_idempotent() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), DVec3::new(5000.0, -2500.0, 40.0));
        place(&mut s).unwrap();
        let origin = s.component.origin();
        let level = s.world.get(s.level).unwrap().transform;
        let tileset = s.world.get(s.tileset).unwrap().transform;

        place(&mut s).unwrap();
        assert!(origin_eq(s.component.origin(), origin));
        assert!(s.world.get(s.level).unwrap().transform.abs_diff_eq(&level, EPS));
        assert!(s.world.get(s.tileset).unwrap().transform.abs_diff_eq(&tileset, EPS));
    }

    #[test]
    fn rebase_to_one_degree_east_keeps_tileset_in_place() {
        let offset = o2_in_o1_frame();
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), offset);
        let before_map = rendering_map(&s, s.tileset);
        let before_ecef = level_ecef(&s);
        let old_relative = s.world.get(s.tileset).unwrap().transform;

        let plan = place(&mut s).unwrap();

        // The new origin is the level's position, one degree east.
        assert!(origin_eq(plan.new_origin, GeoOrigin::new(1.0, 0.0, 0.0)));
        assert!(origin_eq(s.component.origin(), GeoOrigin::new(1.0, 0.0, 0.0)));

        // The level moved by the O1->O2 displacement: it now sits at the
        // new frame's origin.
        let new_abs = s.world.absolute_matrix(s.level).unwrap();
        assert!(new_abs.w_axis.truncate().length() < EPS);
        assert!(offset.length() > 100_000.0);
        assert!(level_ecef(&s).abs_diff_eq(before_ecef, 1e-5));

        // The tileset root changed relative to the level, but renders in
        // the same place.
        let new_relative = s.world.get(s.tileset).unwrap().transform;
        assert!(!new_relative.abs_diff_eq(&old_relative, 1e-3));
        let after_map = rendering_map(&s, s.tileset);
        let probe = GeoOrigin::new(1.0, 0.0, 0.0).to_ecef(&Ellipsoid::WGS84)
            + DVec3::new(10.0, 20.0, 30.0);
        assert!(
            after_map
                .transform_point3(probe)
                .abs_diff_eq(before_map.transform_point3(probe), 1e-4)
        );
        assert!(after_map.abs_diff_eq(before_map, 1e-4));
    }

    #[test]
    fn unresolvable_origin_aborts_without_changes() {
        let wgs = Ellipsoid::WGS84;
        let origin = GeoOrigin::new(0.0, 0.0, 0.0);
        let frame = LocalFrame::new(wgs, origin.to_ecef(&wgs), 1.0);
        let near_center = frame.transform_ecef_to_local(DVec3::new(1.0, 2.0, 3.0));
        let mut s = scene(origin, near_center);
        let auth = s.authority;
        let hash = s.world.state_hash();
        let changes = s.registry.get(auth).unwrap().origin_changes();

        let err = place(&mut s).unwrap_err();
        assert!(matches!(err, RebaseError::UnresolvableOrigin { .. }));
        assert_eq!(s.world.state_hash(), hash);
        assert_eq!(s.component.origin(), origin);
        assert_eq!(s.registry.get(auth).unwrap().origin_changes(), changes);
        assert!(!s.editor.can_undo());
    }

    #[test]
    fn failed_write_rolls_back_placements() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let auth = s.authority;
        let plan = compute_rebase(
            &s.world,
            &s.component,
            s.registry.get(auth).unwrap(),
            &RebaseOptions::default(),
        )
        .unwrap();
        let tileset = s.tileset;
        s.world.despawn(tileset);
        let hash = s.world.state_hash();

        let err = apply_rebase(
            &plan,
            &mut s.world,
            &mut s.editor,
            &mut s.registry,
            &mut s.component,
            None,
            &RebaseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RebaseError::Edit(EditError::EntityNotFound(id)) if id == tileset));
        assert_eq!(s.world.state_hash(), hash);
        assert_eq!(s.component.origin(), GeoOrigin::new(0.0, 0.0, 0.0));
        assert!(!s.editor.is_transaction_open());
        assert!(!s.editor.can_undo());
    }

    #[test]
    fn missing_authority_is_reported() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), DVec3::ZERO);
        let auth = s.authority;
        s.registry.remove(auth);
        assert!(matches!(place(&mut s), Err(RebaseError::MissingAuthority)));
    }

    #[test]
    fn misattached_component_is_reported() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), DVec3::ZERO);
        let actor = s.world.spawn("actor", EntityKind::Actor, Transform::IDENTITY);
        let auth = s.authority;
        let component = SubLevelComponent::new(actor, SubLevelSettings::default());
        let result = compute_rebase(
            &s.world,
            &component,
            s.registry.get(auth).unwrap(),
            &RebaseOptions::default(),
        );
        assert!(matches!(result, Err(RebaseError::MisattachedComponent)));
    }

    #[test]
    fn rebase_is_one_undo_step() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let hash = s.world.state_hash();
        let plan = place(&mut s).unwrap();
        assert_eq!(s.editor.undo_count(), 1);
        assert_eq!(s.editor.undo_label(), Some(REBASE_TRANSACTION_LABEL));

        assert!(revert_rebase(
            &plan,
            &mut s.world,
            &mut s.editor,
            &mut s.registry,
            &mut s.component
        ));
        assert_eq!(s.world.state_hash(), hash);
        assert_eq!(s.component.origin(), GeoOrigin::new(0.0, 0.0, 0.0));

        // Redo would re-apply placements without the origin; it is refused.
        assert!(!s.editor.can_redo());
        assert!(!s.editor.redo(&mut s.world));
        assert_eq!(s.world.state_hash(), hash);
        assert!(!revert_rebase(
            &plan,
            &mut s.world,
            &mut s.editor,
            &mut s.registry,
            &mut s.component
        ));
    }

    #[test]
    fn active_sub_level_publishes_new_origin() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let auth = s.authority;
        let level = s.level;
        let switcher = s.registry.get_mut(auth).unwrap().switcher_mut().unwrap();
        switcher.set_target_sub_level(Some(level));
        switcher.update(|_| true);

        place(&mut s).unwrap();
        let published = s.registry.get(auth).unwrap().origin();
        assert!(origin_eq(published, GeoOrigin::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn inactive_sub_level_does_not_publish() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let auth = s.authority;
        place(&mut s).unwrap();
        assert_eq!(s.registry.get(auth).unwrap().origin_changes(), 0);
    }

    #[test]
    fn floating_origin_is_respected() {
        let offset = o2_in_o1_frame();
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), offset - DVec3::new(1000.0, 0.0, 0.0));
        s.world.set_world_origin(DVec3::new(1000.0, 0.0, 0.0));
        let before_map = rendering_map(&s, s.tileset);

        let plan = place(&mut s).unwrap();
        assert!(origin_eq(plan.new_origin, GeoOrigin::new(1.0, 0.0, 0.0)));
        let abs = s.world.absolute_matrix(s.level).unwrap();
        assert!(abs.w_axis.truncate().length() < EPS);
        assert!(rendering_map(&s, s.tileset).abs_diff_eq(before_map, 1e-4));
    }

    #[test]
    fn level_without_tilesets_still_rebases() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let tileset = s.tileset;
        s.world.despawn(tileset);
        let plan = place(&mut s).unwrap();
        assert!(plan.tilesets.is_empty());
        assert!(origin_eq(s.component.origin(), GeoOrigin::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn non_tileset_children_follow_the_level() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let level = s.level;
        let prop = s
            .world
            .spawn_child(
                level,
                "prop",
                EntityKind::Actor,
                Transform::from_translation(DVec3::new(3.0, 0.0, 0.0)),
            )
            .unwrap();
        let plan = place(&mut s).unwrap();
        assert_eq!(plan.tilesets.len(), 1);
        assert_eq!(
            s.world.get(prop).unwrap().transform.translation,
            DVec3::new(3.0, 0.0, 0.0)
        );
    }

    #[test]
    fn nested_tilesets_keep_rendering_in_place() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let level = s.level;
        let group = s
            .world
            .spawn_child(
                level,
                "group",
                EntityKind::Actor,
                Transform {
                    translation: DVec3::new(120.0, -40.0, 5.0),
                    rotation: DQuat::from_rotation_z(0.3),
                    scale: DVec3::ONE,
                },
            )
            .unwrap();
        let grandchild = s
            .world
            .spawn_child(
                group,
                "nested tileset",
                EntityKind::Tileset,
                Transform::from_translation(DVec3::new(0.0, 15.0, 0.0)),
            )
            .unwrap();
        let inner = s
            .world
            .spawn_child(grandchild, "inner tileset", EntityKind::Tileset, Transform::IDENTITY)
            .unwrap();
        let before: Vec<DMat4> = [s.tileset, grandchild, inner]
            .iter()
            .map(|id| rendering_map(&s, *id))
            .collect();
        let group_relative = s.world.get(group).unwrap().transform;

        let plan = place(&mut s).unwrap();

        assert_eq!(plan.tilesets.len(), 3);
        assert!(plan.tilesets.iter().any(|t| t.id == grandchild));
        assert!(plan.tilesets.iter().any(|t| t.id == inner));
        assert_eq!(s.world.get(group).unwrap().transform, group_relative);
        for (id, before) in [s.tileset, grandchild, inner].into_iter().zip(before) {
            assert!(rendering_map(&s, id).abs_diff_eq(before, 1e-4));
        }
    }

    #[test]
    fn interactive_rebase_recenters_camera() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame());
        let start = o2_in_o1_frame() + DVec3::new(0.0, 0.0, 500.0);
        let mut camera = ViewportCamera {
            location: start,
            rotation: DQuat::IDENTITY,
        };
        let options = RebaseOptions {
            interactive_editing_enabled: true,
            ..Default::default()
        };
        let plan = place_georeference_origin_at_sub_level_origin(
            &mut s.world,
            &mut s.editor,
            &mut s.registry,
            &mut s.component,
            Some(&mut camera),
            &options,
        )
        .unwrap();
        let expected = plan.transforms.old_to_new.transform_point3(start);
        assert!(camera.location.abs_diff_eq(expected, 1e-6));
        // Still 500 m from the level, which now sits at the origin.
        assert!((camera.location.length() - 500.0).abs() < 1e-3);
        // Level again: up follows the new local vertical.
        assert!(camera.up().z > 0.999);
        assert!(camera.left().z.abs() < 1e-9);
    }

    #[test]
    fn scale_changes_host_units() {
        let mut s = scene(GeoOrigin::new(0.0, 0.0, 0.0), o2_in_o1_frame() * 100.0);
        let options = RebaseOptions {
            units_per_meter: 100.0,
            ..Default::default()
        };
        let plan = place_georeference_origin_at_sub_level_origin(
            &mut s.world,
            &mut s.editor,
            &mut s.registry,
            &mut s.component,
            None,
            &options,
        )
        .unwrap();
        assert!(origin_eq(plan.new_origin, GeoOrigin::new(1.0, 0.0, 0.0)));
    }
}
