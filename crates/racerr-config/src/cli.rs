//! Command-line argument parsing for the race server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Race server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "racerr-server", about = "Authoritative race session server")]
pub struct CliArgs {
    /// Port the transport listens on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum race duration in seconds.
    #[arg(long)]
    pub max_race_duration: Option<f64>,

    /// Remaining time granted to everyone once the first racer finishes.
    #[arg(long)]
    pub grace_period: Option<f64>,

    /// Ready participants needed to start a race.
    #[arg(long)]
    pub min_ready: Option<u32>,

    /// Interpolation factor for remote vehicles (0.0 - 1.0).
    #[arg(long)]
    pub interpolation_factor: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of scripted bot racers to connect.
    #[arg(long, default_value_t = 3)]
    pub bots: u32,

    /// Number of races to run before exiting.
    #[arg(long, default_value_t = 1)]
    pub races: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(duration) = args.max_race_duration {
            self.race.max_race_duration_secs = duration;
        }
        if let Some(grace) = args.grace_period {
            self.race.grace_period_on_first_finish_secs = grace;
        }
        if let Some(min_ready) = args.min_ready {
            self.race.min_ready_participants = min_ready;
        }
        if let Some(factor) = args.interpolation_factor {
            self.replication.interpolation_factor = factor;
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
            port: Some(9001),
            grace_period: Some(15.0),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.port, 9001);
        assert_eq!(config.race.grace_period_on_first_finish_secs, 15.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.race.max_race_duration_secs, 90.0);
        assert_eq!(config.replication.interpolation_factor, 0.4);
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
            "racerr-server",
            "--max-race-duration",
            "60",
            "--bots",
            "5",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.max_race_duration, Some(60.0));
        assert_eq!(args.bots, 5);
        assert_eq!(args.races, 1);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
