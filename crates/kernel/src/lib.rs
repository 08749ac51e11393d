//! World Kernel: the host scene the sub-level tooling operates on.
//!
//! # Invariants
//! - All placement mutations flow through explicit operations and are logged.
//! - A child's transform is relative to its parent; a root's transform is
//!   relative to the floating world origin.

pub mod world;

pub use world::{EntityData, EntityKind, World, WorldEvent};
