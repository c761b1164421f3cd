//! Configuration for Cadence.
//!
//! Provides runtime-configurable loop and logging settings that persist to
//! disk as RON files. Supports CLI overrides via clap, reload detection, and
//! forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE_NAME, Config, DebugConfig, EngineConfig};
pub use error::ConfigError;
