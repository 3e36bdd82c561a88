//! Daemon Settings
//!
//! Stored as JSON in /etc/thermguard/settings.json. Every field has a default,
//! so a missing file or a partial one is fine; a malformed one is an error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{limits, paths, platform, timing};
use crate::data::validate_file_size;
use crate::error::{Result, ThermError};

/// Environment variable overriding `platform`
pub const ENV_PLATFORM: &str = "THERMGUARD_PLATFORM";

/// Environment variable overriding `poll_interval_secs`
pub const ENV_POLL_SECS: &str = "THERMGUARD_POLL_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Backend pair to use for every subsystem
    #[serde(default = "default_platform")]
    pub platform: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Desired subsystem list
    #[serde(default = "default_desired_config")]
    pub desired_config_path: PathBuf,

    /// Published sensor state
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    #[serde(default = "default_hwmon_root")]
    pub hwmon_root: PathBuf,

    #[serde(default = "default_i2c_dev_dir")]
    pub i2c_dev_dir: PathBuf,

    /// Run on a confirmed emergency
    #[serde(default = "default_poweroff_command")]
    pub poweroff_command: String,
}

fn default_platform() -> String { platform::DEFAULT.to_string() }
fn default_poll_interval() -> u64 { timing::POLLING_PERIOD_SECS }
fn default_desired_config() -> PathBuf { PathBuf::from(paths::DESIRED_CONFIG) }
fn default_state_path() -> PathBuf { PathBuf::from(paths::STATE_FILE) }
fn default_socket_path() -> PathBuf { PathBuf::from(paths::SOCKET_PATH) }
fn default_hwmon_root() -> PathBuf { PathBuf::from(paths::HWMON_BASE) }
fn default_i2c_dev_dir() -> PathBuf { PathBuf::from(paths::I2C_DEV_DIR) }
fn default_poweroff_command() -> String { paths::POWEROFF_COMMAND.to_string() }

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            poll_interval_secs: default_poll_interval(),
            desired_config_path: default_desired_config(),
            state_path: default_state_path(),
            socket_path: default_socket_path(),
            hwmon_root: default_hwmon_root(),
            i2c_dev_dir: default_i2c_dev_dir(),
            poweroff_command: default_poweroff_command(),
        }
    }
}

impl DaemonSettings {
    /// Load from `path`, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = Self::load_file(path)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        validate_file_size(path, limits::MAX_CONFIG_SIZE)?;

        let content = fs::read_to_string(path).map_err(|e| {
            ThermError::config(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ThermError::config(format!("Failed to parse settings JSON {}: {}", path.display(), e))
        })
    }

    /// Overrides from `THERMGUARD_PLATFORM` and `THERMGUARD_POLL_SECS`.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_PLATFORM) {
            let value = value.trim();
            if !value.is_empty() {
                debug!(platform = %value, "Platform overridden from environment");
                self.platform = value.to_string();
            }
        }

        if let Ok(value) = std::env::var(ENV_POLL_SECS) {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.poll_interval_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid {}", ENV_POLL_SECS),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.platform.trim().is_empty() {
            return Err(ThermError::InvalidConfig {
                field: "platform".into(),
                reason: "must not be empty".into(),
            });
        }

        let range = timing::MIN_POLLING_PERIOD_SECS..=timing::MAX_POLLING_PERIOD_SECS;
        if !range.contains(&self.poll_interval_secs) {
            return Err(ThermError::InvalidConfig {
                field: "poll_interval_secs".into(),
                reason: format!(
                    "{} is outside {}..={}",
                    self.poll_interval_secs,
                    timing::MIN_POLLING_PERIOD_SECS,
                    timing::MAX_POLLING_PERIOD_SECS
                ),
            });
        }

        if !Path::new(&self.poweroff_command).is_absolute() {
            return Err(ThermError::InvalidConfig {
                field: "poweroff_command".into(),
                reason: "must be an absolute path".into(),
            });
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(ENV_PLATFORM);
        std::env::remove_var(ENV_POLL_SECS);
    }

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let settings = DaemonSettings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, DaemonSettings::default());
        assert_eq!(settings.platform, "sysfs");
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_defaults() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"platform":"i2c","poll_interval_secs":10}"#).unwrap();

        let settings = DaemonSettings::load(&path).unwrap();
        assert_eq!(settings.platform, "i2c");
        assert_eq!(settings.poll_interval_secs, 10);
        assert_eq!(settings.state_path, PathBuf::from(paths::STATE_FILE));
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_an_error() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ platform: ").unwrap();
        assert!(matches!(DaemonSettings::load(&path), Err(ThermError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(ENV_PLATFORM, "i2c");
        std::env::set_var(ENV_POLL_SECS, "30");

        let dir = TempDir::new().unwrap();
        let settings = DaemonSettings::load(&dir.path().join("none.json")).unwrap();
        clear_env();

        assert_eq!(settings.platform, "i2c");
        assert_eq!(settings.poll_interval_secs, 30);
    }

    #[test]
    #[serial]
    fn test_invalid_env_poll_is_ignored() {
        clear_env();
        std::env::set_var(ENV_POLL_SECS, "soon");
        let mut settings = DaemonSettings::default();
        settings.apply_env_overrides();
        clear_env();
        assert_eq!(settings.poll_interval_secs, timing::POLLING_PERIOD_SECS);
    }

    #[test]
    fn test_default_poll_interval() {
        assert_eq!(DaemonSettings::default().poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_ranges() {
        let mut settings = DaemonSettings::default();
        settings.poll_interval_secs = 0;
        assert!(settings.validate().is_err());

        settings.poll_interval_secs = timing::MAX_POLLING_PERIOD_SECS + 1;
        assert!(settings.validate().is_err());

        settings.poll_interval_secs = 5;
        settings.poweroff_command = "poweroff".into();
        assert!(settings.validate().is_err());
    }
}
