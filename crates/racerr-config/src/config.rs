//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Race rules: durations, readiness, health, starting grid.
    pub race: RaceConfig,
    /// Vehicle replication and smoothing.
    pub replication: ReplicationConfig,
    /// Fixed-rate schedules.
    pub schedule: ScheduleConfig,
    /// Network/transport settings.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Race rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaceConfig {
    /// Hard upper bound on a race, measured from the start.
    pub max_race_duration_secs: f64,
    /// Once somebody finishes, everyone else has at most this long left.
    pub grace_period_on_first_finish_secs: f64,
    /// How long the previous race's results stay up before returning to idle.
    pub intermission_secs: f64,
    /// Ready participants needed before a race starts.
    pub min_ready_participants: u32,
    /// Health every racer starts with.
    pub max_health: u32,
    /// Position of the first starting-grid slot.
    pub grid_origin: [f32; 3],
    /// Offset between consecutive starting-grid slots.
    pub grid_spacing: [f32; 3],
}

/// Vehicle replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Blend factor applied per network tick on non-owning peers, in `[0, 1]`.
    pub interpolation_factor: f32,
    /// Upper bound on dead-reckoning from a single sample.
    pub max_extrapolation_secs: f32,
}

/// Tick rates for the two independent schedules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Vehicle replication tick rate (Hz).
    pub net_tick_rate: u32,
    /// Session state machine tick rate (Hz).
    pub session_tick_rate: u32,
    /// Longest frame the accumulators will absorb at once.
    pub max_frame_time_secs: f64,
}

/// Network/transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the transport binds to.
    pub bind_address: String,
    /// Port the transport listens on.
    pub port: u16,
    /// Maximum number of connected participants.
    pub max_players: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to the log directory in release builds. Debug
    /// builds always do.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_race_duration_secs: 90.0,
            grace_period_on_first_finish_secs: 30.0,
            intermission_secs: 10.0,
            min_ready_participants: 1,
            max_health: 100,
            grid_origin: [0.0, 1.0, 10.0],
            grid_spacing: [0.0, 0.0, 10.0],
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            interpolation_factor: 0.4,
            max_extrapolation_secs: 1.0,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            net_tick_rate: 60,
            session_tick_rate: 50,
            max_frame_time_secs: 0.25,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7777,
            max_players: 16,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

// --- Validation ---

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// Checks that every value is usable by the session. Load paths call
    /// this so a bad file never reaches the state machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let race = &self.race;
        if !(race.max_race_duration_secs > 0.0) {
            return Err(invalid(
                "race.max_race_duration_secs",
                "must be positive",
            ));
        }
        if !(race.grace_period_on_first_finish_secs >= 0.0) {
            return Err(invalid(
                "race.grace_period_on_first_finish_secs",
                "must not be negative",
            ));
        }
        if !(race.intermission_secs >= 0.0) {
            return Err(invalid("race.intermission_secs", "must not be negative"));
        }
        if race.min_ready_participants == 0 {
            return Err(invalid("race.min_ready_participants", "must be at least 1"));
        }
        if race.max_health == 0 {
            return Err(invalid("race.max_health", "must be at least 1"));
        }

        let factor = self.replication.interpolation_factor;
        if !(0.0..=1.0).contains(&factor) {
            return Err(invalid(
                "replication.interpolation_factor",
                format!("{factor} is outside [0, 1]"),
            ));
        }
        if !(self.replication.max_extrapolation_secs >= 0.0) {
            return Err(invalid(
                "replication.max_extrapolation_secs",
                "must not be negative",
            ));
        }

        if self.schedule.net_tick_rate == 0 {
            return Err(invalid("schedule.net_tick_rate", "must be at least 1 Hz"));
        }
        if self.schedule.session_tick_rate == 0 {
            return Err(invalid("schedule.session_tick_rate", "must be at least 1 Hz"));
        }
        if !(self.schedule.max_frame_time_secs > 0.0) {
            return Err(invalid("schedule.max_frame_time_secs", "must be positive"));
        }

        if self.network.max_players == 0 {
            return Err(invalid("network.max_players", "must be at least 1"));
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

/// Returns the platform config directory for the server (`<config>/racerr`).
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("racerr"))
        .ok_or(ConfigError::NoConfigDir)
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
