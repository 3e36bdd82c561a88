//! Threshold state machine for alarm status and fan demand
//!
//! Converts a temperature reading into a new alarm status and fan speed.
//!
//! # How It Works
//!
//! 1. **Ladders**: alarm status and fan speed are ordered ladders. A reading can
//!    move each ladder by at most one rung, so a sensor that heats or cools
//!    through several bands at once walks them over consecutive polls.
//!
//! 2. **Hysteresis**: every upward step has an `_on` threshold and the matching
//!    downward step an `_off` threshold below it. Readings between the two
//!    leave the ladder where it is.
//!
//! 3. **Ordering**: transitions are tried in a fixed order, cooling steps
//!    first (extreme end toward Normal), then heating steps. The first guard
//!    that fires is applied and evaluation stops for that ladder.

use crate::constants::sensor::MILLIDEGREES_PER_DEGREE;
use crate::data::{AlarmStatus, AlarmThresholds, FanSpeed, FanThresholds, ThresholdSet};

/// Comparison a transition applies against its threshold
#[derive(Debug, Clone, Copy)]
enum Guard {
    AtOrAbove,
    AtOrBelow,
    Above,
}

impl Guard {
    fn fires(self, temp: f32, threshold: f32) -> bool {
        match self {
            Guard::AtOrAbove => temp >= threshold,
            Guard::AtOrBelow => temp <= threshold,
            Guard::Above => temp > threshold,
        }
    }
}

struct Step<S, T> {
    from: S,
    to: S,
    guard: Guard,
    threshold: fn(&T) -> f32,
}

const ALARM_STEPS: [Step<AlarmStatus, AlarmThresholds>; 10] = [
    // cooling
    Step { from: AlarmStatus::Emergency, to: AlarmStatus::Critical, guard: Guard::AtOrBelow, threshold: |t| t.emergency_off },
    Step { from: AlarmStatus::Critical, to: AlarmStatus::Max, guard: Guard::AtOrBelow, threshold: |t| t.critical_off },
    Step { from: AlarmStatus::Max, to: AlarmStatus::Normal, guard: Guard::AtOrBelow, threshold: |t| t.max_off },
    Step { from: AlarmStatus::LowCrit, to: AlarmStatus::Min, guard: Guard::Above, threshold: |t| t.low_crit },
    Step { from: AlarmStatus::Min, to: AlarmStatus::Normal, guard: Guard::Above, threshold: |t| t.min },
    // heating, and the low-temperature ladder going colder
    Step { from: AlarmStatus::Normal, to: AlarmStatus::Max, guard: Guard::AtOrAbove, threshold: |t| t.max_on },
    Step { from: AlarmStatus::Max, to: AlarmStatus::Critical, guard: Guard::AtOrAbove, threshold: |t| t.critical_on },
    Step { from: AlarmStatus::Critical, to: AlarmStatus::Emergency, guard: Guard::AtOrAbove, threshold: |t| t.emergency_on },
    Step { from: AlarmStatus::Normal, to: AlarmStatus::Min, guard: Guard::AtOrBelow, threshold: |t| t.min },
    Step { from: AlarmStatus::Min, to: AlarmStatus::LowCrit, guard: Guard::AtOrBelow, threshold: |t| t.low_crit },
];

const FAN_STEPS: [Step<FanSpeed, FanThresholds>; 6] = [
    Step { from: FanSpeed::Normal, to: FanSpeed::Medium, guard: Guard::AtOrAbove, threshold: |t| t.medium_on },
    Step { from: FanSpeed::Medium, to: FanSpeed::Fast, guard: Guard::AtOrAbove, threshold: |t| t.fast_on },
    Step { from: FanSpeed::Fast, to: FanSpeed::Max, guard: Guard::AtOrAbove, threshold: |t| t.max_on },
    Step { from: FanSpeed::Max, to: FanSpeed::Fast, guard: Guard::AtOrBelow, threshold: |t| t.max_off },
    Step { from: FanSpeed::Fast, to: FanSpeed::Medium, guard: Guard::AtOrBelow, threshold: |t| t.fast_off },
    Step { from: FanSpeed::Medium, to: FanSpeed::Normal, guard: Guard::AtOrBelow, threshold: |t| t.medium_off },
];

fn step_ladder<S: Copy + PartialEq, T>(steps: &[Step<S, T>], current: S, temp: f32, thresholds: &T) -> S {
    steps
        .iter()
        .find(|s| s.from == current && s.guard.fires(temp, (s.threshold)(thresholds)))
        .map_or(current, |s| s.to)
}

/// Convert millidegrees to °C
pub fn to_celsius(millidegrees: i32) -> f32 {
    millidegrees as f32 / MILLIDEGREES_PER_DEGREE as f32
}

/// Next alarm status for a reading in °C
pub fn next_alarm_status(current: AlarmStatus, temp: f32, thresholds: &AlarmThresholds) -> AlarmStatus {
    step_ladder(&ALARM_STEPS, current, temp, thresholds)
}

/// Next fan speed for a reading in °C
pub fn next_fan_speed(current: FanSpeed, temp: f32, thresholds: &FanThresholds) -> FanSpeed {
    step_ladder(&FAN_STEPS, current, temp, thresholds)
}

/// Status and fan demand carried between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalState {
    pub status: AlarmStatus,
    pub fan_speed: FanSpeed,
}

impl ThermalState {
    pub fn new(status: AlarmStatus, fan_speed: FanSpeed) -> Self {
        Self { status, fan_speed }
    }

    /// Apply one reading to both ladders
    pub fn evaluate(self, temperature_millideg: i32, thresholds: &ThresholdSet) -> Self {
        let t = to_celsius(temperature_millideg);
        Self {
            status: next_alarm_status(self.status, t, &thresholds.alarm),
            fan_speed: next_fan_speed(self.fan_speed, t, &thresholds.fan),
        }
    }
}

impl Default for ThermalState {
    fn default() -> Self {
        Self::new(AlarmStatus::Normal, FanSpeed::Normal)
    }
}
