//! Data types, hardware descriptions and validation
//!
//! Contains the core data structures shared by the engine, backends and monitor.

mod description;
mod types;
mod validation;

pub use description::{
    DescriptionLoader, DeviceDescription, HardwareDescription, JsonDescriptionLoader,
    SensorDescription,
};
#[cfg(test)]
pub use description::MockDescriptionLoader;
pub use types::{
    AlarmStatus, AlarmThresholds, FanSpeed, FanThresholds, SensorRecord, SubsystemConfig,
    ThresholdKind, ThresholdSet, FAULT_STATUS,
};
pub use validation::{
    threshold_inversions, validate_file_size, validate_hw_desc_dir, validate_subsystem_name,
};
