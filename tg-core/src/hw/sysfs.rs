//! hwmon sysfs backend
//!
//! Serves sensors exposed by kernel drivers under `/sys/class/hwmon`.
//!
//! # Device selectors
//!
//! A sensor's `device` is `<chip>:temp<N>`, where `<chip>` is the content of
//! the hwmon directory's `name` file. The first matching `hwmonX` directory (in
//! sorted order) is used.
//!
//! # Values
//!
//! - `temp<N>_input` and every limit attribute are millidegrees Celsius
//! - `temp<N>_fault` reads `1` when the driver has lost the sensor
//! - thresholds are derived from `temp<N>_{emergency,crit,max,min,lcrit}`

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::constants::{hwmon_offsets as off, sensor::MILLIDEGREES_PER_DEGREE};
use crate::data::{HardwareDescription, SensorDescription, ThresholdKind};
use crate::error::{Result, ThermError};
use crate::hw::{SensorBackend, SensorHandle, SubsystemBackend};

fn feature_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^temp[0-9]+$").ok()).as_ref()
}

/// Split `<chip>:temp<N>` into its parts
pub fn parse_device_selector(device: &str) -> Option<(&str, &str)> {
    let (chip, feature) = device.split_once(':')?;
    if chip.is_empty() || !feature_pattern()?.is_match(feature) {
        return None;
    }
    Some((chip, feature))
}

/// Find the hwmon directory whose `name` file matches `chip`
pub fn find_chip_dir(root: &Path, chip: &str) -> Result<Option<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .map_err(|e| ThermError::FileRead {
            path: root.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    dirs.sort();

    for dir in dirs {
        let name = match fs::read_to_string(dir.join("name")) {
            Ok(n) => n,
            Err(_) => continue,
        };
        trace!(path = ?dir, name = %name.trim(), "Checking hwmon chip");
        if name.trim() == chip {
            return Ok(Some(dir));
        }
    }

    Ok(None)
}

fn read_millidegrees(path: &Path) -> std::result::Result<i32, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    content
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("Failed to parse '{}' from {}: {}", content.trim(), path.display(), e))
}

/// Backend for the kernel hwmon tree
#[derive(Debug, Clone)]
pub struct SysfsBackend {
    root: PathBuf,
}

impl SysfsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SubsystemBackend for SysfsBackend {
    fn prepare(&self, subsystem: &str, _description: &HardwareDescription) -> Result<()> {
        if !self.root.is_dir() {
            return Err(ThermError::subsystem_construct(
                subsystem,
                format!("hwmon root {} not present", self.root.display()),
            ));
        }
        Ok(())
    }
}

impl SensorBackend for SysfsBackend {
    fn construct(
        &self,
        subsystem: &str,
        _description: &HardwareDescription,
        sensor: &SensorDescription,
    ) -> Result<Box<dyn SensorHandle>> {
        let name = format!("{}-{}", subsystem, sensor.number);
        let (chip, feature) = parse_device_selector(&sensor.device).ok_or_else(|| {
            ThermError::sensor_construct(&name, format!("invalid hwmon selector '{}'", sensor.device))
        })?;

        let chip_dir = find_chip_dir(&self.root, chip)?
            .ok_or_else(|| ThermError::HardwareNotFound(format!("hwmon chip '{}'", chip)))?;

        let input = chip_dir.join(format!("{}_input", feature));
        if !input.exists() {
            return Err(ThermError::sensor_construct(
                &name,
                format!("{} does not exist", input.display()),
            ));
        }

        debug!(sensor = %name, path = ?input, "Bound hwmon sensor");

        Ok(Box::new(SysfsSensor {
            name,
            chip_dir,
            feature: feature.to_string(),
        }))
    }
}

/// One `temp<N>` channel of a hwmon chip
#[derive(Debug)]
pub struct SysfsSensor {
    name: String,
    chip_dir: PathBuf,
    feature: String,
}

impl SysfsSensor {
    fn attribute(&self, suffix: &str) -> PathBuf {
        self.chip_dir.join(format!("{}_{}", self.feature, suffix))
    }

    fn limit_celsius(&self, suffix: &str) -> Option<f32> {
        read_millidegrees(&self.attribute(suffix))
            .ok()
            .map(|m| m as f32 / MILLIDEGREES_PER_DEGREE as f32)
    }
}

impl SensorHandle for SysfsSensor {
    fn read_operable(&mut self) -> Result<bool> {
        let fault = self.attribute("fault");
        if !fault.exists() {
            return Ok(true);
        }
        let value = read_millidegrees(&fault).map_err(|reason| ThermError::StatusRead {
            sensor: self.name.clone(),
            reason,
        })?;
        Ok(value == 0)
    }

    fn read_temperature(&mut self) -> Result<i32> {
        read_millidegrees(&self.attribute("input"))
            .map_err(|reason| ThermError::temperature_read(&self.name, reason))
    }

    fn read_threshold(&mut self, kind: ThresholdKind) -> Option<f32> {
        match kind {
            ThresholdKind::AlarmEmergencyOn => self.limit_celsius("emergency").map(|v| v + off::EMERGENCY_ON),
            ThresholdKind::AlarmEmergencyOff => self.limit_celsius("emergency"),
            ThresholdKind::AlarmCriticalOn => self.limit_celsius("crit").map(|v| v + off::CRITICAL_ON),
            ThresholdKind::AlarmCriticalOff => self.limit_celsius("crit"),
            ThresholdKind::AlarmMaxOn => self.limit_celsius("max").map(|v| v + off::MAX_ON),
            ThresholdKind::AlarmMaxOff => self.limit_celsius("max"),
            ThresholdKind::AlarmMin => self.limit_celsius("min"),
            ThresholdKind::AlarmLowCrit => self.limit_celsius("lcrit"),
            ThresholdKind::FanMaxOn => self.limit_celsius("max").map(|v| v + off::FAN_MAX_ON),
            ThresholdKind::FanMaxOff => self.limit_celsius("max"),
            ThresholdKind::FanFastOn => self.limit_celsius("max").map(|v| v + off::FAN_FAST_ON),
            ThresholdKind::FanFastOff => self.limit_celsius("max").map(|v| v + off::FAN_FAST_OFF),
            ThresholdKind::FanMediumOn => self.limit_celsius("max").map(|v| v + off::FAN_MEDIUM_ON),
            ThresholdKind::FanMediumOff => self.limit_celsius("max").map(|v| v + off::FAN_MEDIUM_OFF),
        }
    }
}
