//! Configuration system for the Racerr race server.
//!
//! Provides runtime-configurable race rules, replication tuning and tick
//! rates that persist to disk as RON files. Supports CLI overrides via clap,
//! validation, hot-reload detection, and forward/backward compatible
//! serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE_NAME, Config, DebugConfig, NetworkConfig, RaceConfig, ReplicationConfig,
    ScheduleConfig, default_config_dir,
};
pub use error::ConfigError;
