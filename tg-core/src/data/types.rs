//! Core data types for thermguard
//!
//! Status ladders, threshold sets and the records exchanged with the state store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alarm severity, ordered from coldest to hottest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    Uninitialized,
    LowCrit,
    Min,
    Normal,
    Max,
    Critical,
    Emergency,
}

impl AlarmStatus {
    /// Store representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmStatus::Uninitialized => "uninitialized",
            AlarmStatus::LowCrit => "low_critical",
            AlarmStatus::Min => "min",
            AlarmStatus::Normal => "normal",
            AlarmStatus::Max => "max",
            AlarmStatus::Critical => "critical",
            AlarmStatus::Emergency => "emergency",
        }
    }

    /// Position on the severity ladder
    pub fn rung(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published status string for a sensor whose reads keep failing
pub const FAULT_STATUS: &str = "fault";

/// Requested cooling level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanSpeed {
    Normal,
    Medium,
    Fast,
    Max,
}

impl FanSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanSpeed::Normal => "normal",
            FanSpeed::Medium => "medium",
            FanSpeed::Fast => "fast",
            FanSpeed::Max => "max",
        }
    }

    pub fn rung(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one threshold a backend may be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    AlarmEmergencyOn,
    AlarmEmergencyOff,
    AlarmCriticalOn,
    AlarmCriticalOff,
    AlarmMaxOn,
    AlarmMaxOff,
    AlarmMin,
    AlarmLowCrit,
    FanMaxOn,
    FanMaxOff,
    FanFastOn,
    FanFastOff,
    FanMediumOn,
    FanMediumOff,
}

impl ThresholdKind {
    pub const ALL: [ThresholdKind; 14] = [
        ThresholdKind::AlarmEmergencyOn,
        ThresholdKind::AlarmEmergencyOff,
        ThresholdKind::AlarmCriticalOn,
        ThresholdKind::AlarmCriticalOff,
        ThresholdKind::AlarmMaxOn,
        ThresholdKind::AlarmMaxOff,
        ThresholdKind::AlarmMin,
        ThresholdKind::AlarmLowCrit,
        ThresholdKind::FanMaxOn,
        ThresholdKind::FanMaxOff,
        ThresholdKind::FanFastOn,
        ThresholdKind::FanFastOff,
        ThresholdKind::FanMediumOn,
        ThresholdKind::FanMediumOff,
    ];
}

/// Alarm ladder thresholds in °C
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlarmThresholds {
    pub emergency_on: f32,
    pub emergency_off: f32,
    pub critical_on: f32,
    pub critical_off: f32,
    pub max_on: f32,
    pub max_off: f32,
    pub min: f32,
    pub low_crit: f32,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            emergency_on: 95.0,
            emergency_off: 93.0,
            critical_on: 90.0,
            critical_off: 85.0,
            max_on: 80.0,
            max_off: 75.0,
            min: 5.0,
            low_crit: 0.0,
        }
    }
}

/// Fan ladder thresholds in °C
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FanThresholds {
    pub max_on: f32,
    pub max_off: f32,
    pub fast_on: f32,
    pub fast_off: f32,
    pub medium_on: f32,
    pub medium_off: f32,
}

impl Default for FanThresholds {
    fn default() -> Self {
        Self {
            max_on: 80.0,
            max_off: 75.0,
            fast_on: 72.0,
            fast_off: 69.0,
            medium_on: 66.0,
            medium_off: 63.0,
        }
    }
}

/// Every threshold one sensor is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub alarm: AlarmThresholds,
    pub fan: FanThresholds,
}

impl ThresholdSet {
    pub fn get(&self, kind: ThresholdKind) -> f32 {
        match kind {
            ThresholdKind::AlarmEmergencyOn => self.alarm.emergency_on,
            ThresholdKind::AlarmEmergencyOff => self.alarm.emergency_off,
            ThresholdKind::AlarmCriticalOn => self.alarm.critical_on,
            ThresholdKind::AlarmCriticalOff => self.alarm.critical_off,
            ThresholdKind::AlarmMaxOn => self.alarm.max_on,
            ThresholdKind::AlarmMaxOff => self.alarm.max_off,
            ThresholdKind::AlarmMin => self.alarm.min,
            ThresholdKind::AlarmLowCrit => self.alarm.low_crit,
            ThresholdKind::FanMaxOn => self.fan.max_on,
            ThresholdKind::FanMaxOff => self.fan.max_off,
            ThresholdKind::FanFastOn => self.fan.fast_on,
            ThresholdKind::FanFastOff => self.fan.fast_off,
            ThresholdKind::FanMediumOn => self.fan.medium_on,
            ThresholdKind::FanMediumOff => self.fan.medium_off,
        }
    }

    pub fn set(&mut self, kind: ThresholdKind, value: f32) {
        let slot = match kind {
            ThresholdKind::AlarmEmergencyOn => &mut self.alarm.emergency_on,
            ThresholdKind::AlarmEmergencyOff => &mut self.alarm.emergency_off,
            ThresholdKind::AlarmCriticalOn => &mut self.alarm.critical_on,
            ThresholdKind::AlarmCriticalOff => &mut self.alarm.critical_off,
            ThresholdKind::AlarmMaxOn => &mut self.alarm.max_on,
            ThresholdKind::AlarmMaxOff => &mut self.alarm.max_off,
            ThresholdKind::AlarmMin => &mut self.alarm.min,
            ThresholdKind::AlarmLowCrit => &mut self.alarm.low_crit,
            ThresholdKind::FanMaxOn => &mut self.fan.max_on,
            ThresholdKind::FanMaxOff => &mut self.fan.max_off,
            ThresholdKind::FanFastOn => &mut self.fan.fast_on,
            ThresholdKind::FanFastOff => &mut self.fan.fast_off,
            ThresholdKind::FanMediumOn => &mut self.fan.medium_on,
            ThresholdKind::FanMediumOff => &mut self.fan.medium_off,
        };
        *slot = value;
    }
}

/// One entry of the desired subsystem list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemConfig {
    pub name: String,
    #[serde(default)]
    pub hw_desc_dir: String,
}

impl SubsystemConfig {
    pub fn new(name: impl Into<String>, hw_desc_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hw_desc_dir: hw_desc_dir.into(),
        }
    }
}

/// Per-sensor row as published to the state store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub name: String,
    pub status: String,
    pub fan_state: String,
    pub temperature: i32,
    pub min: i32,
    pub max: i32,
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_ladder_order() {
        assert!(AlarmStatus::LowCrit < AlarmStatus::Min);
        assert!(AlarmStatus::Normal < AlarmStatus::Max);
        assert!(AlarmStatus::Critical < AlarmStatus::Emergency);
        assert_eq!(AlarmStatus::Max.rung() - AlarmStatus::Normal.rung(), 1);
    }

    #[test]
    fn test_threshold_get_set_covers_every_kind() {
        let mut set = ThresholdSet::default();
        for (i, kind) in ThresholdKind::ALL.iter().enumerate() {
            set.set(*kind, i as f32 + 100.0);
        }
        for (i, kind) in ThresholdKind::ALL.iter().enumerate() {
            assert_eq!(set.get(*kind), i as f32 + 100.0);
        }
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(AlarmStatus::LowCrit.as_str(), "low_critical");
        assert_eq!(AlarmStatus::Uninitialized.to_string(), "uninitialized");
        assert_eq!(FanSpeed::Medium.to_string(), "medium");
    }
}
