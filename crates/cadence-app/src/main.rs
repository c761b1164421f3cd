//! The `cadence` binary: runs the demo world on a real-time or virtual clock.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p cadence-app -- --target-fps 0 --frames 600` for a
//! headless run on a virtual clock.

use cadence_app::demo::{build_demo_world, run_demo};
use cadence_app::platform::PlatformDirs;
use cadence_config::{CliArgs, Config};
use cadence_ecs::{FixedScheduler, RealTimeScheduler, Scheduler};
use clap::Parser;
use tracing::{error, info};

/// Frames run on the virtual clock when `--frames` is not given.
const DEFAULT_VIRTUAL_FRAMES: u64 = 600;

fn main() {
    let args = CliArgs::parse();

    let dirs = match PlatformDirs::resolve_and_create() {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to initialize platform directories: {e}");
            std::process::exit(1);
        }
    };

    // Load or create config, then apply CLI overrides
    let config_dir = dirs.config_dir_or(args.config.as_deref());
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config.debug.log_dir.clone().unwrap_or(dirs.log_dir);
    cadence_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));
    info!(
        config_dir = %config_dir.display(),
        fixed_step_ms = config.engine.fixed_step_ms,
        target_fps = config.engine.target_fps,
        "starting cadence"
    );

    let (mut world, scene) = match build_demo_world(&config) {
        Ok(built) => built,
        Err(e) => {
            error!("Failed to build demo world: {e}");
            std::process::exit(1);
        }
    };

    let mut scheduler: Box<dyn Scheduler> = if config.engine.target_fps > 0.0 {
        let scheduler = RealTimeScheduler::new(config.engine.target_fps);
        match args.frames {
            Some(frames) => Box::new(scheduler.with_max_frames(frames)),
            None => Box::new(scheduler),
        }
    } else {
        Box::new(FixedScheduler::new(
            config.engine.fixed_step_ms,
            args.frames.unwrap_or(DEFAULT_VIRTUAL_FRAMES),
        ))
    };

    let summary = run_demo(&mut world, scheduler.as_mut());
    info!(
        frames = summary.frames,
        fixed_steps = summary.fixed_steps,
        entities = summary.entities,
        arms = scene.arms.len(),
        fps = format_args!("{:.1}", summary.perf.fps),
        "run complete"
    );

    world.shutdown();
}
