//! Backend capability traits and the platform registry
//!
//! A platform is served by a pair of backends: one that prepares a subsystem
//! from its hardware description and one that turns each declared sensor into
//! a live [`SensorHandle`]. The registry is filled once at startup and keyed by
//! platform identifier.

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::constants::platform;
use crate::data::{HardwareDescription, SensorDescription, ThresholdKind};
use crate::error::Result;
use crate::hw::{I2cBackend, LinuxI2cBus, SysfsBackend};

/// Live handle to one sensor, owning whatever state its bus needs
///
/// Calls are blocking and made from the poll loop only.
#[cfg_attr(test, mockall::automock)]
pub trait SensorHandle: Send {
    /// Liveness check, independent of the temperature value
    fn read_operable(&mut self) -> Result<bool>;

    /// Current temperature in millidegrees Celsius
    fn read_temperature(&mut self) -> Result<i32>;

    /// Threshold in °C, or `None` when the hardware does not provide it
    fn read_threshold(&mut self, kind: ThresholdKind) -> Option<f32>;
}

/// Subsystem-level setup for one hardware family
pub trait SubsystemBackend: Send + Sync {
    /// Check that a subsystem described by `description` can be served.
    /// An error discards the whole subsystem.
    fn prepare(&self, subsystem: &str, description: &HardwareDescription) -> Result<()>;
}

/// Sensor construction for one hardware family
pub trait SensorBackend: Send + Sync {
    /// Build a handle for `sensor`. An error skips this sensor only.
    fn construct(
        &self,
        subsystem: &str,
        description: &HardwareDescription,
        sensor: &SensorDescription,
    ) -> Result<Box<dyn SensorHandle>>;
}

struct PlatformBackends {
    subsystem: Box<dyn SubsystemBackend>,
    sensor: Box<dyn SensorBackend>,
}

/// Backends selectable by platform identifier
#[derive(Default)]
pub struct BackendRegistry {
    platforms: HashMap<String, PlatformBackends>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in hwmon and i2c backends
    pub fn with_builtin(hwmon_root: impl Into<PathBuf>, i2c_dev_dir: impl Into<PathBuf>) -> Self {
        let sysfs = SysfsBackend::new(hwmon_root);
        let i2c = I2cBackend::new(LinuxI2cBus::new(i2c_dev_dir));

        let mut registry = Self::new();
        registry.register(platform::SYSFS, Box::new(sysfs.clone()), Box::new(sysfs));
        registry.register(platform::I2C, Box::new(i2c.clone()), Box::new(i2c));
        registry
    }

    /// Register (or replace) the backends for a platform
    pub fn register(
        &mut self,
        platform: impl Into<String>,
        subsystem: Box<dyn SubsystemBackend>,
        sensor: Box<dyn SensorBackend>,
    ) {
        let platform = platform.into();
        if self
            .platforms
            .insert(platform.clone(), PlatformBackends { subsystem, sensor })
            .is_some()
        {
            info!(platform = %platform, "Replaced registered backend");
        } else {
            debug!(platform = %platform, "Registered backend");
        }
    }

    pub fn subsystem_backend(&self, platform: &str) -> Option<&dyn SubsystemBackend> {
        self.platforms.get(platform).map(|p| p.subsystem.as_ref())
    }

    pub fn sensor_backend(&self, platform: &str) -> Option<&dyn SensorBackend> {
        self.platforms.get(platform).map(|p| p.sensor.as_ref())
    }

    pub fn platforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.platforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
