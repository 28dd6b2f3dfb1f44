//! Configuration file support for Pillbox.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pillbox/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub alerts: AlertConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Longest confirmation wait accepted, one day.
pub const MAX_CONFIRMATION_TIMEOUT_SECS: u64 = 86_400;

/// Cadences and timeouts for the control loop.
///
/// These are fixed for the lifetime of a controller; nothing takes a
/// per-call timeout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Scheduling tick period. Must stay under a minute so no matching
    /// minute is skipped.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Presence sensor polling cadence while awaiting confirmation.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Elapsed wait after which the single missed-dose warning goes out.
    #[serde(default = "default_escalation_delay_secs")]
    pub escalation_delay_secs: u64,

    /// Per-field timeout during a setup session.
    #[serde(default = "default_field_timeout_secs")]
    pub field_timeout_secs: u64,

    /// How long the idle loop waits for a command word.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            escalation_delay_secs: default_escalation_delay_secs(),
            field_timeout_secs: default_field_timeout_secs(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn escalation_delay(&self) -> Duration {
        Duration::from_secs(self.escalation_delay_secs)
    }

    pub fn field_timeout(&self) -> Duration {
        Duration::from_secs(self.field_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Notification texts. `{name}` is replaced with the medicine name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_warning_message")]
    pub warning_message: String,

    #[serde(default = "default_taken_message")]
    pub taken_message: String,

    #[serde(default = "default_missed_message")]
    pub missed_message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            warning_message: default_warning_message(),
            taken_message: default_taken_message(),
            missed_message: default_missed_message(),
        }
    }
}

impl AlertConfig {
    pub fn warning_for(&self, name: &str) -> String {
        self.warning_message.replace("{name}", name)
    }

    pub fn taken_for(&self, name: &str) -> String {
        self.taken_message.replace("{name}", name)
    }

    pub fn missed_for(&self, name: &str) -> String {
        self.missed_message.replace("{name}", name)
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("pillbox")
}

fn default_tick_interval_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_escalation_delay_secs() -> u64 {
    60
}

fn default_field_timeout_secs() -> u64 {
    300
}

fn default_command_timeout_ms() -> u64 {
    1000
}

fn default_warning_message() -> String {
    "{name} has not been taken yet".into()
}

fn default_taken_message() -> String {
    "{name} was taken".into()
}

fn default_missed_message() -> String {
    "{name} was missed".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("pillbox").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject timing combinations the confirmation protocol cannot honour
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if timing.confirmation_timeout_secs > MAX_CONFIRMATION_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "confirmation_timeout_secs must be at most {}, got {}",
                MAX_CONFIRMATION_TIMEOUT_SECS, timing.confirmation_timeout_secs
            )));
        }
        if timing.escalation_delay_secs >= timing.confirmation_timeout_secs {
            return Err(Error::Config(format!(
                "escalation_delay_secs ({}) must be less than confirmation_timeout_secs ({})",
                timing.escalation_delay_secs, timing.confirmation_timeout_secs
            )));
        }
        if timing.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be non-zero".into()));
        }
        if timing.tick_interval_secs == 0 || timing.tick_interval_secs > 60 {
            return Err(Error::Config(format!(
                "tick_interval_secs must be within 1..=60, got {}",
                timing.tick_interval_secs
            )));
        }
        Ok(())
    }
}
