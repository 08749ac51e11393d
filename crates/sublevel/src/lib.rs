//! Sub-level georeferencing: which sub-level's origin governs a shared
//! georeference, and how to move that origin without moving anything on
//! screen.
//!
//! # Invariants
//! - A sub-level pushes its origin only while it is the switcher's current
//!   sub-level, or its target while nothing is current.
//! - Authorities are referenced by id and looked up on demand; invalidating
//!   a link unregisters the sub-level from the old switcher first.
//! - A rebase writes placements before the new origin, and writes nothing at
//!   all when the new origin cannot be resolved.

pub mod component;
pub mod georeference;
pub mod proximity;
pub mod rebase;
pub mod scene;
pub mod viewport;

pub use component::{SubLevelComponent, SubLevelProperty, SubLevelSettings, is_origin_active};
pub use georeference::{AuthorityRegistry, GeoreferenceAuthority};
pub use proximity::select_target_by_proximity;
pub use rebase::{
    REBASE_TRANSACTION_LABEL, RebaseError, RebaseOptions, RebasePlan, RebaseTransformPair,
    TilesetRebase, apply_rebase, compute_rebase, place_georeference_origin_at_sub_level_origin,
    revert_rebase,
};
pub use scene::{
    ActorDescription, GeoreferenceDescription, Scene, SceneDescription, SceneError, SubLevelDescription,
    TilesetDescription,
};
pub use viewport::{ViewportCamera, recenter};

pub fn crate_info() -> &'static str {
    concat!("georebase-sublevel v", env!("CARGO_PKG_VERSION"))
}
