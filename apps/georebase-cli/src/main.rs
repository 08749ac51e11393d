use std::path::PathBuf;

use clap::{Parser, Subcommand};
use georebase_geo::{Ellipsoid, GeoOrigin};
use georebase_kernel::World;
use georebase_sublevel::Scene;
use georebase_tools::{
    Clock, LoadTestConfig, LoadTestHarness, LocationPreset, ManualClock, SceneInspector,
    SimulatedScene, SystemClock, run_load_test,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "georebase-cli", about = "CLI tool for sub-level georeferencing")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Summarize a scene file (YAML or JSON)
    Inspect {
        scene: PathBuf,
    },
    /// Move a sub-level's origin to where its level instance sits
    Rebase {
        scene: PathBuf,
        /// Name of the sub-level's level instance
        sub_level: String,
        /// Undo the rebase afterwards and show the restored state
        #[arg(long)]
        undo: bool,
        /// Write the resulting scene to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Pick sub-levels near a camera position and step the switchers
    Switch {
        scene: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        height: f64,
        /// Switcher updates to run
        #[arg(long, default_value = "3")]
        steps: usize,
    },
    /// Time simulated tileset loading at a location preset
    LoadTest {
        /// denver, googleplex, or melbourne-point-cloud; all when omitted
        #[arg(long)]
        preset: Option<LocationPreset>,
        /// Unsuspended ticks each tileset needs to finish loading
        #[arg(long, default_value = "90")]
        ready_after_ticks: u64,
        /// Loading ceiling in seconds
        #[arg(long, default_value = "20")]
        timeout: f64,
        /// Seconds per host tick
        #[arg(long, default_value = "0.016666666666666666")]
        tick_interval: f64,
        /// Use wall-clock time instead of simulated time
        #[arg(long)]
        realtime: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("georebase-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: tick={}", World::new().tick());
            println!("geo: {}", georebase_geo::crate_info());
            println!("author: {}", georebase_author::crate_info());
            println!("stream: {}", georebase_stream::crate_info());
            println!("sublevel: {}", georebase_sublevel::crate_info());
            println!("tools: {}", georebase_tools::crate_info());
        }
        Commands::Inspect { scene } => {
            let scene = Scene::load(&scene)?;
            print_scene(&scene);
        }
        Commands::Rebase {
            scene,
            sub_level,
            undo,
            save,
        } => {
            let mut scene = Scene::load(&scene)?;
            let plan = scene.place_origin(&sub_level)?;
            println!("Rebased {sub_level:?}");
            println!("  origin: {} -> {}", plan.old_origin, plan.new_origin);
            println!(
                "  placement: {:?} -> {:?}",
                plan.old_placement.translation, plan.new_placement.translation
            );
            for tileset in &plan.tilesets {
                let name = scene
                    .world
                    .get(tileset.id)
                    .map_or("?", |d| d.name.as_str());
                println!(
                    "  tileset {name:?}: {:?} -> {:?}",
                    tileset.old_relative.translation, tileset.new_relative.translation
                );
            }

            if undo {
                let reverted = scene.revert(&plan);
                println!("Undo: {}", if reverted { "OK" } else { "nothing to undo" });
            }
            print_scene(&scene);

            if let Some(path) = save {
                scene.to_description().save(&path)?;
                println!("Saved {}", path.display());
            }
        }
        Commands::Switch {
            scene,
            lon,
            lat,
            height,
            steps,
        } => {
            let mut scene = Scene::load(&scene)?;
            let camera = GeoOrigin::checked(lon, lat, height)?;
            let camera_ecef = camera.to_ecef(&Ellipsoid::WGS84);
            println!("Camera at {camera}");

            for (authority, target) in scene.target_by_proximity(camera_ecef) {
                let name = target
                    .and_then(|id| scene.world.get(id))
                    .map_or("-", |d| d.name.as_str());
                println!("  georeference [{}] target={name}", authority.0);
            }
            for step in 1..=steps {
                for (authority, phase) in scene.update_switchers() {
                    println!("  step {step}: georeference [{}] {phase:?}", authority.0);
                }
            }
            print_scene(&scene);
        }
        Commands::LoadTest {
            preset,
            ready_after_ticks,
            timeout,
            tick_interval,
            realtime,
        } => {
            let config = LoadTestConfig {
                timeout_seconds: timeout,
                tick_interval,
                ..Default::default()
            };
            let presets = match preset {
                Some(preset) => vec![preset],
                None => LocationPreset::ALL.to_vec(),
            };
            let mut failures = 0;
            for preset in presets {
                let completed = if realtime {
                    load_test(SystemClock::new(), &config, preset, ready_after_ticks)?
                } else {
                    load_test(ManualClock::new(), &config, preset, ready_after_ticks)?
                };
                if !completed {
                    failures += 1;
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} load test(s) timed out");
            }
        }
    }

    Ok(())
}

fn print_scene(scene: &Scene) {
    println!("{}", SceneInspector::summary(scene));
    for authority in SceneInspector::authorities(scene) {
        println!("  {authority}");
    }
    for sub_level in SceneInspector::sub_levels(scene) {
        println!("  {sub_level}");
    }
}

fn load_test<C: Clock + 'static>(
    clock: C,
    config: &LoadTestConfig,
    preset: LocationPreset,
    ready_after_ticks: u64,
) -> anyhow::Result<bool> {
    let mut harness = LoadTestHarness::<SimulatedScene, C>::new(clock, config.clone());
    let report = run_load_test(&mut harness, |scene| {
        scene.apply_preset(preset, ready_after_ticks)
    })?;
    println!(
        "LoadTest {preset}: {} ({} ticks, avg tick {:.4}s, max tick {:.4}s)",
        report.outcome, report.ticks, report.average_tick, report.max_tick
    );
    Ok(report.outcome.is_completed())
}
