//! Thermguard Core Library
//!
//! Temperature monitoring and emergency shutdown for switch platforms.
//!
//! # Features
//!
//! - **Pluggable Backends**: hwmon and LM75-over-i2c sensors behind one trait pair
//! - **Reconciliation**: Subsystems follow a desired list with mark-and-sweep
//! - **Hysteresis Ladders**: Alarm status and fan demand move one rung per read
//! - **Fault Tolerance**: Failing sensors degrade to `fault` without stopping the loop
//! - **Emergency Interlock**: Double-read confirmation before powering off
//!
//! # Module Structure
//!
//! - `hw/` - Backend traits, registry and built-in backends
//! - `data/` - Data types, hardware descriptions, validation
//! - `engine/` - Threshold state machine
//! - `monitor/` - Sensors, subsystems, reconciler and the poll tick
//! - `sync/` - State store boundary and field-level publishing
//!
//! # Example
//!
//! ```no_run
//! use tg_core::{BackendRegistry, JsonDescriptionLoader, JsonFileStore, Monitor, Reconciler};
//! # struct Noop;
//! # impl tg_core::PowerControl for Noop {
//! #     fn power_off(&mut self, _: &str) -> tg_core::Result<()> { Ok(()) }
//! # }
//!
//! let backends = BackendRegistry::with_builtin("/sys/class/hwmon", "/dev");
//! let reconciler = Reconciler::new("sysfs", Box::new(JsonDescriptionLoader));
//! let mut monitor = Monitor::new(reconciler, backends, Box::new(Noop));
//! let mut store = JsonFileStore::open("/etc/thermguard/subsystems.json", "/run/thermguard/state.json");
//! monitor.tick(&mut store);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;
pub mod monitor;
pub mod sync;

// Standalone modules
pub mod constants;
pub mod control_client;
pub mod error;
pub mod settings;

// Re-export primary types from data/
pub use data::{
    AlarmStatus, AlarmThresholds, DescriptionLoader, DeviceDescription, FanSpeed, FanThresholds,
    HardwareDescription, JsonDescriptionLoader, SensorDescription, SensorRecord, SubsystemConfig,
    ThresholdKind, ThresholdSet, FAULT_STATUS,
};

// Re-export validation functions from data/
pub use data::{validate_file_size, validate_hw_desc_dir, validate_subsystem_name};

// Re-export error types
pub use error::{Result, ThermError};

// Re-export engine types
pub use engine::{next_alarm_status, next_fan_speed, to_celsius, ThermalState};

// Re-export hardware types from hw/
pub use hw::{
    BackendRegistry, I2cBackend, LinuxI2cBus, SensorBackend, SensorHandle, SubsystemBackend,
    SysfsBackend,
};

// Re-export monitor types
pub use monitor::{
    format_dump, Monitor, PowerControl, ReadOutcome, ReconcileReport, Reconciler, Sensor,
    Subsystem, SubsystemRegistry, TickOutcome,
};

// Re-export sync types
pub use sync::{JsonFileStore, LockState, MemoryStore, Publisher, StateStore, SyncBatch};

pub use control_client::ControlClient;
pub use settings::DaemonSettings;
