//! Cadence application: platform directories, config-to-loop wiring, and the
//! spinning-hierarchy demo world run by the `cadence` binary.

pub mod demo;
pub mod platform;

use cadence_config::EngineConfig;
use cadence_ecs::LoopConfig;

/// Loop timing from the persisted engine settings. Out-of-range values are
/// replaced by the loop's defaults.
pub fn loop_config(engine: &EngineConfig) -> LoopConfig {
    LoopConfig {
        fixed_step_ms: engine.fixed_step_ms,
        max_fixed_steps_per_frame: engine.max_fixed_steps_per_frame,
        max_frame_dt_ms: engine.max_frame_dt_ms,
        time_scale: engine.time_scale,
        perf_window_ms: engine.perf_window_ms,
    }
    .sanitized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_mirrors_engine_config() {
        let engine = EngineConfig {
            fixed_step_ms: 10.0,
            max_fixed_steps_per_frame: 3,
            max_frame_dt_ms: 100.0,
            time_scale: 0.5,
            perf_window_ms: 500.0,
            target_fps: 30.0,
        };
        let config = loop_config(&engine);
        assert_eq!(config.fixed_step_ms, 10.0);
        assert_eq!(config.max_fixed_steps_per_frame, 3);
        assert_eq!(config.max_frame_dt_ms, 100.0);
        assert_eq!(config.time_scale, 0.5);
        assert_eq!(config.perf_window_ms, 500.0);
    }

    #[test]
    fn test_loop_config_sanitizes_bad_values() {
        let engine = EngineConfig {
            fixed_step_ms: -1.0,
            time_scale: f64::NAN,
            ..EngineConfig::default()
        };
        let config = loop_config(&engine);
        assert_eq!(config.fixed_step_ms, cadence_ecs::DEFAULT_FIXED_STEP_MS);
        assert_eq!(config.time_scale, 0.0);
    }
}
