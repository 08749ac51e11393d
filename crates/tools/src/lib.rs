//! Developer tooling: tileset load-time harness, tick timing, scene inspector.
//!
//! # Invariants
//! - The load harness never blocks; a driver polls it once per host tick.
//! - One [`LoadTestContext`] per run, reset before the run starts.

mod clock;
mod inspector;
pub mod loadtest;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use inspector::{AuthorityInfo, SceneInspector, SceneSummary, SubLevelInfo};
pub use loadtest::{
    CommandQueue, CommandStatus, DEFAULT_TIMEOUT_SECONDS, LatentCommand, LoadOutcome, LoadReport,
    LoadTestConfig, LoadTestContext, LoadTestError, LoadTestHarness, LocationPreset, SceneContext,
    SimulatedScene, SimulatedTileset, TimeLoadingCommand, run_load_test,
};
pub use timer::TickTimer;

pub fn crate_info() -> &'static str {
    concat!("georebase-tools v", env!("CARGO_PKG_VERSION"))
}
