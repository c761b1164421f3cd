//! Command-line argument parsing for Cadence.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Cadence command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cadence", about = "Cadence fixed-step loop demo")]
pub struct CliArgs {
    /// Fixed simulation step in milliseconds.
    #[arg(long)]
    pub fixed_step_ms: Option<f64>,

    /// Maximum fixed steps per frame.
    #[arg(long)]
    pub max_fixed_steps: Option<u32>,

    /// Frame delta clamp in milliseconds.
    #[arg(long)]
    pub max_frame_dt_ms: Option<f64>,

    /// Time scale (1.0 = real time).
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Target frame rate; 0 runs on a virtual clock.
    #[arg(long)]
    pub target_fps: Option<f64>,

    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(step) = args.fixed_step_ms {
            self.engine.fixed_step_ms = step;
        }
        if let Some(max) = args.max_fixed_steps {
            self.engine.max_fixed_steps_per_frame = max;
        }
        if let Some(clamp) = args.max_frame_dt_ms {
            self.engine.max_frame_dt_ms = clamp;
        }
        if let Some(scale) = args.time_scale {
            self.engine.time_scale = scale;
        }
        if let Some(fps) = args.target_fps {
            self.engine.target_fps = fps;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            fixed_step_ms: Some(10.0),
            target_fps: Some(0.0),
            log_level: Some("debug".to_string()),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.engine.fixed_step_ms, 10.0);
        assert_eq!(config.engine.target_fps, 0.0);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.engine.max_fixed_steps_per_frame, 8);
        assert_eq!(config.engine.time_scale, 1.0);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "cadence",
            "--fixed-step-ms",
            "8",
            "--frames",
            "120",
            "--time-scale",
            "0.5",
        ]);
        assert_eq!(args.fixed_step_ms, Some(8.0));
        assert_eq!(args.frames, Some(120));
        assert_eq!(args.time_scale, Some(0.5));
        assert!(args.config.is_none());
    }
}
