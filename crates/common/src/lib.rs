//! Shared types used across the georebase workspace.

mod types;

pub use types::{AuthorityId, EntityId, Transform};
