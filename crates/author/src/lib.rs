//! In-editor authoring: scoped transactions, undo/redo.
//!
//! # Invariants
//! - All authoring ops are reversible.
//! - Mutations made inside one transaction undo and redo as a unit.

mod editor;

pub use editor::{EditCommand, EditError, Editor, Transaction};

pub fn crate_info() -> &'static str {
    concat!("georebase-author v", env!("CARGO_PKG_VERSION"))
}
