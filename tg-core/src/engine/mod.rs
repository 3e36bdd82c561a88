//! Thermal engine modules
//!
//! Contains the threshold state machine.

mod threshold;

pub use threshold::{next_alarm_status, next_fan_speed, to_celsius, ThermalState};
