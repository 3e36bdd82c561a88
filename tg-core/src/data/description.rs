//! Hardware description loading
//!
//! Each subsystem points at a directory holding a `thermal.json` that lists
//! its temperature sensors, the bus devices behind them and the default
//! thresholds used when a backend cannot report its own.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::constants::{limits, paths};
use crate::data::validation::validate_file_size;
use crate::data::{AlarmThresholds, FanThresholds, ThresholdSet};
use crate::error::{Result, ThermError};

/// A bus device sensors can refer to by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub name: String,
    #[serde(default)]
    pub bus: u32,
    #[serde(default)]
    pub address: u16,
}

/// One temperature sensor declared by a subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescription {
    pub number: u32,
    #[serde(default)]
    pub location: String,
    /// Backend specific device selector
    pub device: String,
    #[serde(rename = "type", default)]
    pub sensor_type: String,
    #[serde(default)]
    pub alarm_thresholds: AlarmThresholds,
    #[serde(default)]
    pub fan_thresholds: FanThresholds,
}

impl SensorDescription {
    /// Static fallback for thresholds the backend does not supply
    pub fn default_thresholds(&self) -> ThresholdSet {
        ThresholdSet {
            alarm: self.alarm_thresholds,
            fan: self.fan_thresholds,
        }
    }
}

/// Parsed `thermal.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareDescription {
    /// Power the system off on a confirmed emergency reading
    #[serde(default)]
    pub auto_shutdown: bool,
    /// Advisory polling period in seconds
    #[serde(default)]
    pub polling_period: Option<u32>,
    #[serde(default)]
    pub devices: Vec<DeviceDescription>,
    #[serde(default)]
    pub sensors: Vec<SensorDescription>,
}

impl HardwareDescription {
    pub fn device(&self, name: &str) -> Option<&DeviceDescription> {
        self.devices.iter().find(|d| d.name == name)
    }
}

/// Source of hardware descriptions, keyed by description directory
#[cfg_attr(test, mockall::automock)]
pub trait DescriptionLoader: Send {
    fn load(&self, hw_desc_dir: &Path) -> Result<HardwareDescription>;
}

/// Reads `<dir>/thermal.json` from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDescriptionLoader;

impl DescriptionLoader for JsonDescriptionLoader {
    fn load(&self, hw_desc_dir: &Path) -> Result<HardwareDescription> {
        let path = hw_desc_dir.join(paths::THERMAL_DESCRIPTION);
        if !path.exists() {
            return Err(ThermError::FileNotFound(path));
        }

        validate_file_size(&path, limits::MAX_DESCRIPTION_SIZE)?;

        let content = fs::read_to_string(&path).map_err(|e| ThermError::FileRead {
            path: path.clone(),
            source: e,
        })?;

        let description: HardwareDescription = serde_json::from_str(&content)?;

        if description.sensors.len() > limits::MAX_SENSORS_PER_SUBSYSTEM {
            return Err(ThermError::InvalidConfig {
                field: "sensors".into(),
                reason: format!(
                    "{} sensors declared, maximum is {}",
                    description.sensors.len(),
                    limits::MAX_SENSORS_PER_SUBSYSTEM
                ),
            });
        }

        debug!(
            path = %path.display(),
            sensors = description.sensors.len(),
            devices = description.devices.len(),
            "Loaded hardware description"
        );

        Ok(description)
    }
}
