//! Hardware backends
//!
//! Capability traits, the platform registry and the built-in hwmon and i2c backends.

mod backend;
mod i2c;
mod sysfs;

pub use backend::{BackendRegistry, SensorBackend, SensorHandle, SubsystemBackend};
#[cfg(test)]
pub use backend::MockSensorHandle;
pub use i2c::{decode_lm75, I2cBackend, I2cBus, LinuxI2cBus, Lm75Sensor};
pub use sysfs::{find_chip_dir, parse_device_selector, SysfsBackend, SysfsSensor};
