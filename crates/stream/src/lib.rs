//! Streaming: which sub-level is current and which one is being switched to.
//!
//! # Invariants
//! - At most one sub-level is current per switcher.
//! - A sub-level becomes current only after the previous one was deactivated.
//! - Unregistering a sub-level clears it from current and target.

mod switcher;

pub use switcher::{SubLevelSwitcher, SwitchPhase, SwitcherConfig, SwitcherEvent};

pub fn crate_info() -> &'static str {
    concat!("georebase-stream v", env!("CARGO_PKG_VERSION"))
}
