//! Tileset load-time harness.
//!
//! A run builds a scene, starts play, waits for the warm-up, then polls
//! [`TimeLoadingCommand`] once per host tick until every tileset reports
//! loaded or the timeout elapses. Nothing here blocks: the driver owns the
//! tick loop and the [`Clock`].

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use georebase_geo::GeoOrigin;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::timer::TickTimer;

/// Loading ceiling, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 20.0;

#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    #[error("unknown location preset {0:?}")]
    UnknownPreset(String),
    #[error("load test did not finish within {0} ticks")]
    TickLimitExceeded(u64),
    #[error("load test finished without timing the load")]
    NoOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    pub timeout_seconds: f64,
    /// Pause between starting play and starting the timer.
    pub warmup_seconds: f64,
    /// Time that passes per host tick.
    pub tick_interval: f64,
    /// Hard stop for a clock that never advances.
    pub max_ticks: u64,
    pub timer_capacity: usize,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            warmup_seconds: 1.0,
            tick_interval: 1.0 / 60.0,
            max_ticks: 100_000,
            timer_capacity: 120,
        }
    }
}

/// The scene a load test runs against.
///
/// A run uses two: the creation context built in the editor and the play
/// context bound from it when play starts.
pub trait SceneContext: Default {
    /// Pawn, lighting, and georeference shared by every location.
    fn create_common_world_objects(&mut self);
    /// Bind this play context to the objects tracked in `creation`.
    fn init_for_play(&mut self, creation: &Self);
    fn set_suspend_update(&mut self, suspend: bool);
    /// Throw away loaded content so loading starts from scratch.
    fn refresh_tilesets(&mut self);
    /// Mark the current objects to be carried into play.
    fn track_for_play(&mut self);
    fn are_tilesets_done_loading(&self) -> bool;
    /// One host frame.
    fn tick(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTileset {
    pub name: String,
    /// Unsuspended ticks needed to finish loading.
    pub ready_after_ticks: u64,
    loaded_ticks: u64,
}

impl SimulatedTileset {
    pub fn new(name: &str, ready_after_ticks: u64) -> Self {
        Self {
            name: name.to_string(),
            ready_after_ticks,
            loaded_ticks: 0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded_ticks >= self.ready_after_ticks
    }

    /// Load progress in percent.
    pub fn progress(&self) -> f64 {
        if self.ready_after_ticks == 0 {
            return 100.0;
        }
        100.0 * self.loaded_ticks.min(self.ready_after_ticks) as f64 / self.ready_after_ticks as f64
    }
}

/// In-memory scene whose tilesets finish after a fixed number of ticks.
#[derive(Debug, Clone, Default)]
pub struct SimulatedScene {
    pub location: Option<GeoOrigin>,
    pub tilesets: Vec<SimulatedTileset>,
    common_objects: bool,
    suspended: bool,
    tracked: bool,
    ticks: u64,
}

impl SimulatedScene {
    pub fn add_tileset(&mut self, name: &str, ready_after_ticks: u64) {
        self.tilesets.push(SimulatedTileset::new(name, ready_after_ticks));
    }

    /// Place the scene at a preset location with its tilesets.
    pub fn apply_preset(&mut self, preset: LocationPreset, ready_after_ticks: u64) {
        self.location = Some(preset.origin());
        for name in preset.tilesets() {
            self.add_tileset(name, ready_after_ticks);
        }
    }

    pub fn has_common_objects(&self) -> bool {
        self.common_objects
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl SceneContext for SimulatedScene {
    fn create_common_world_objects(&mut self) {
        self.common_objects = true;
    }

    fn init_for_play(&mut self, creation: &Self) {
        if creation.tracked {
            *self = creation.clone();
        } else {
            *self = Self::default();
        }
        self.ticks = 0;
    }

    fn set_suspend_update(&mut self, suspend: bool) {
        self.suspended = suspend;
    }

    fn refresh_tilesets(&mut self) {
        for tileset in &mut self.tilesets {
            tileset.loaded_ticks = 0;
        }
    }

    fn track_for_play(&mut self) {
        self.tracked = true;
    }

    fn are_tilesets_done_loading(&self) -> bool {
        self.tilesets.iter().all(SimulatedTileset::is_loaded)
    }

    fn tick(&mut self) {
        self.ticks += 1;
        if self.suspended {
            return;
        }
        for tileset in &mut self.tilesets {
            tileset.loaded_ticks = (tileset.loaded_ticks + 1).min(tileset.ready_after_ticks);
        }
    }
}

/// State of one load test. Construct or [`reset`](Self::reset) per run.
#[derive(Debug, Clone, Default)]
pub struct LoadTestContext<S> {
    pub creation: S,
    pub play: S,
    pub test_started: bool,
    pub start_mark: f64,
    pub end_mark: f64,
}

impl<S: SceneContext> LoadTestContext<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    Completed { elapsed: f64 },
    TimedOut { elapsed: f64 },
}

impl LoadOutcome {
    pub fn elapsed(&self) -> f64 {
        match self {
            Self::Completed { elapsed } | Self::TimedOut { elapsed } => *elapsed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { elapsed } => write!(f, "tileset load completed in {elapsed:.2} seconds"),
            Self::TimedOut { elapsed } => {
                write!(f, "TIMED OUT: loading stopped after {elapsed:.2} seconds")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandStatus {
    Running,
    Done(LoadOutcome),
}

/// Times tileset loading in the play context.
#[derive(Debug, Clone, Copy)]
pub struct TimeLoadingCommand {
    pub timeout_seconds: f64,
}

impl Default for TimeLoadingCommand {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS)
    }
}

impl TimeLoadingCommand {
    pub fn new(timeout_seconds: f64) -> Self {
        Self { timeout_seconds }
    }

    /// Advance by one host tick.
    ///
    /// The first poll binds the play context, sets the start mark, and
    /// resumes tileset updates. Later polls finish once every tileset is
    /// loaded or the timeout has elapsed; finishing turns updates in the
    /// creation context back on so the loaded result can be inspected.
    pub fn poll<S: SceneContext>(
        &mut self,
        context: &mut LoadTestContext<S>,
        clock: &impl Clock,
    ) -> CommandStatus {
        if !context.test_started {
            context.play.init_for_play(&context.creation);
            context.start_mark = clock.now();
            tracing::info!("-- Load start mark --");
            context.play.set_suspend_update(false);
            context.test_started = true;
            return CommandStatus::Running;
        }

        let mark = clock.now();
        let elapsed = mark - context.start_mark;
        let loaded = context.play.are_tilesets_done_loading();
        let timed_out = elapsed >= self.timeout_seconds;
        if !loaded && !timed_out {
            return CommandStatus::Running;
        }

        context.end_mark = mark;
        tracing::info!("-- Load end mark --");
        let outcome = if loaded {
            LoadOutcome::Completed { elapsed }
        } else {
            LoadOutcome::TimedOut { elapsed }
        };
        if outcome.is_completed() {
            tracing::info!("{outcome}");
        } else {
            tracing::error!("{outcome}");
        }

        context.creation.set_suspend_update(false);
        CommandStatus::Done(outcome)
    }
}

/// Host side of a run: the context, the clock, and play state.
pub struct LoadTestHarness<S, C> {
    pub context: LoadTestContext<S>,
    pub clock: C,
    pub config: LoadTestConfig,
    playing: bool,
    outcome: Option<LoadOutcome>,
    timer: TickTimer,
    ticks: u64,
}

impl<S: SceneContext, C: Clock> LoadTestHarness<S, C> {
    pub fn new(clock: C, config: LoadTestConfig) -> Self {
        let timer = TickTimer::new(config.timer_capacity);
        Self {
            context: LoadTestContext::default(),
            clock,
            config,
            playing: false,
            outcome: None,
            timer,
            ticks: 0,
        }
    }

    fn reset(&mut self) {
        self.context.reset();
        self.playing = false;
        self.outcome = None;
        self.timer = TickTimer::new(self.config.timer_capacity);
        self.ticks = 0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn outcome(&self) -> Option<LoadOutcome> {
        self.outcome
    }

    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn tick_host(&mut self) {
        self.context.creation.tick();
        if self.playing {
            self.context.play.tick();
        }
        self.ticks += 1;
    }
}

/// A step of a run that may span several host ticks.
pub trait LatentCommand<S, C> {
    fn name(&self) -> &str;

    /// Returns `true` once finished.
    fn update(&mut self, harness: &mut LoadTestHarness<S, C>) -> bool;
}

pub struct StartPlay;

impl<S: SceneContext, C: Clock> LatentCommand<S, C> for StartPlay {
    fn name(&self) -> &str {
        "start play"
    }

    fn update(&mut self, harness: &mut LoadTestHarness<S, C>) -> bool {
        harness.playing = true;
        true
    }
}

pub struct Wait {
    seconds: f64,
    started: Option<f64>,
}

impl Wait {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            started: None,
        }
    }
}

impl<S: SceneContext, C: Clock> LatentCommand<S, C> for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn update(&mut self, harness: &mut LoadTestHarness<S, C>) -> bool {
        let now = harness.clock.now();
        let started = *self.started.get_or_insert(now);
        now - started >= self.seconds
    }
}

pub struct TimeLoading(pub TimeLoadingCommand);

impl<S: SceneContext, C: Clock> LatentCommand<S, C> for TimeLoading {
    fn name(&self) -> &str {
        "time loading"
    }

    fn update(&mut self, harness: &mut LoadTestHarness<S, C>) -> bool {
        match self.0.poll(&mut harness.context, &harness.clock) {
            CommandStatus::Running => false,
            CommandStatus::Done(outcome) => {
                harness.outcome = Some(outcome);
                true
            }
        }
    }
}

pub struct EndPlay;

impl<S: SceneContext, C: Clock> LatentCommand<S, C> for EndPlay {
    fn name(&self) -> &str {
        "end play"
    }

    fn update(&mut self, harness: &mut LoadTestHarness<S, C>) -> bool {
        harness.playing = false;
        true
    }
}

/// Runs latent commands in order, several per tick when they finish
/// immediately.
pub struct CommandQueue<S, C> {
    commands: VecDeque<Box<dyn LatentCommand<S, C>>>,
}

impl<S: 'static, C: 'static> CommandQueue<S, C> {
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
        }
    }

    pub fn push(&mut self, command: impl LatentCommand<S, C> + 'static) {
        self.commands.push_back(Box::new(command));
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Update the front command until one is still running. Returns `true`
    /// when the queue has drained.
    pub fn update(&mut self, harness: &mut LoadTestHarness<S, C>) -> bool {
        while let Some(command) = self.commands.front_mut() {
            if !command.update(harness) {
                return false;
            }
            tracing::debug!(command = command.name(), "latent command finished");
            self.commands.pop_front();
        }
        true
    }
}

impl<S: 'static, C: 'static> Default for CommandQueue<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    pub outcome: LoadOutcome,
    pub ticks: u64,
    pub average_tick: f64,
    pub max_tick: f64,
}

/// Run one load test: set up the scene through `location_setup`, then
/// start play, wait, time the load, and end play.
pub fn run_load_test<S, C>(
    harness: &mut LoadTestHarness<S, C>,
    location_setup: impl FnOnce(&mut S),
) -> Result<LoadReport, LoadTestError>
where
    S: SceneContext + 'static,
    C: Clock + 'static,
{
    let _span = tracing::info_span!("load_test").entered();
    harness.reset();

    tracing::info!("creating world objects");
    let creation = &mut harness.context.creation;
    creation.create_common_world_objects();
    location_setup(creation);
    creation.track_for_play();
    creation.set_suspend_update(true);
    creation.refresh_tilesets();

    let mut queue = CommandQueue::new();
    queue.push(StartPlay);
    queue.push(Wait::new(harness.config.warmup_seconds));
    queue.push(TimeLoading(TimeLoadingCommand::new(
        harness.config.timeout_seconds,
    )));
    queue.push(EndPlay);

    loop {
        let tick_start = harness.clock.now();
        if queue.update(harness) {
            break;
        }
        if harness.ticks >= harness.config.max_ticks {
            return Err(LoadTestError::TickLimitExceeded(harness.ticks));
        }
        harness.tick_host();
        harness.clock.wait(harness.config.tick_interval);
        let tick_time = harness.clock.now() - tick_start;
        harness.timer.record(tick_time);
    }

    let outcome = harness.outcome.ok_or(LoadTestError::NoOutcome)?;
    Ok(LoadReport {
        outcome,
        ticks: harness.ticks,
        average_tick: harness.timer.average(),
        max_tick: harness.timer.max(),
    })
}

/// Locations the load test is run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationPreset {
    Denver,
    Googleplex,
    MelbournePointCloud,
}

impl LocationPreset {
    pub const ALL: [Self; 3] = [Self::Denver, Self::Googleplex, Self::MelbournePointCloud];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Denver => "denver",
            Self::Googleplex => "googleplex",
            Self::MelbournePointCloud => "melbourne-point-cloud",
        }
    }

    pub fn origin(&self) -> GeoOrigin {
        match self {
            Self::Denver => GeoOrigin::new(-104.988892, 39.743462, 1798.679443),
            Self::Googleplex => GeoOrigin::new(-122.083969, 37.424492, 142.859116),
            Self::MelbournePointCloud => GeoOrigin::new(144.964984, -37.817765, 48.0),
        }
    }

    pub fn tilesets(&self) -> &'static [&'static str] {
        match self {
            Self::Denver => &["Cesium World Terrain", "Aerometrex Denver"],
            Self::Googleplex => &["Google Photorealistic 3D Tiles"],
            Self::MelbournePointCloud => &["Melbourne Point Cloud"],
        }
    }
}

impl fmt::Display for LocationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LocationPreset {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LoadTestError::UnknownPreset(s.to_string()))
    }
}
