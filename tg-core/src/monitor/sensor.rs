//! Sensor entity and its fault-tolerant read path

use tracing::{debug, info, warn};

use crate::constants::sensor::{
    INITIAL_MAX_MILLIDEGREES, INITIAL_MIN_MILLIDEGREES, INITIAL_TEMPERATURE, MAX_FAIL_RETRY,
};
use crate::data::{
    threshold_inversions, AlarmStatus, FanSpeed, SensorDescription, SensorRecord, ThresholdKind,
    ThresholdSet, FAULT_STATUS,
};
use crate::engine::ThermalState;
use crate::hw::SensorHandle;
use tg_protocol::SensorSnapshot;

/// What a single read did to the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A temperature was taken and both ladders evaluated
    Updated,
    /// The backend failed; status and fan demand are stale
    Faulted,
    /// The backend reports the sensor as not operable
    Inoperable,
}

/// One temperature monitoring point
pub struct Sensor {
    name: String,
    subsystem: String,
    location: String,
    device: String,
    sensor_type: String,
    temperature: i32,
    min: i32,
    max: i32,
    state: ThermalState,
    thresholds: ThresholdSet,
    fault_count: u32,
    failed: bool,
    test_override: Option<i32>,
    handle: Box<dyn SensorHandle>,
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("name", &self.name)
            .field("subsystem", &self.subsystem)
            .field("temperature", &self.temperature)
            .field("state", &self.state)
            .field("fault_count", &self.fault_count)
            .field("failed", &self.failed)
            .finish()
    }
}

/// Ask the backend for every threshold, keeping `defaults` where it has none
pub fn fetch_thresholds(handle: &mut dyn SensorHandle, defaults: &ThresholdSet) -> ThresholdSet {
    let mut set = *defaults;
    for kind in ThresholdKind::ALL {
        if let Some(value) = handle.read_threshold(kind) {
            set.set(kind, value);
        }
    }
    set
}

impl Sensor {
    /// Build a sensor around a constructed backend handle and fetch its thresholds.
    /// No reading is taken yet.
    pub fn new(subsystem: &str, desc: &SensorDescription, mut handle: Box<dyn SensorHandle>) -> Self {
        let name = format!("{}-{}", subsystem, desc.number);
        let thresholds = fetch_thresholds(handle.as_mut(), &desc.default_thresholds());

        for problem in threshold_inversions(&thresholds) {
            warn!(sensor = %name, problem = %problem, "Inverted threshold pair");
        }

        Self {
            name,
            subsystem: subsystem.to_string(),
            location: desc.location.clone(),
            device: desc.device.clone(),
            sensor_type: desc.sensor_type.clone(),
            temperature: INITIAL_TEMPERATURE,
            min: INITIAL_MIN_MILLIDEGREES,
            max: INITIAL_MAX_MILLIDEGREES,
            state: ThermalState::default(),
            thresholds,
            fault_count: 0,
            failed: false,
            test_override: None,
            handle,
        }
    }

    /// Re-query the backend for thresholds
    pub fn refresh_thresholds(&mut self, defaults: &ThresholdSet) {
        self.thresholds = fetch_thresholds(self.handle.as_mut(), defaults);
    }

    /// Take one reading and run it through the state machine.
    ///
    /// Backend errors only bump the fault counter; status and fan demand keep
    /// their previous values. A test override replaces the hardware entirely.
    pub fn read(&mut self) -> ReadOutcome {
        let temperature = match self.test_override {
            Some(forced) => forced,
            None => {
                match self.handle.read_operable() {
                    Ok(true) => {}
                    Ok(false) => {
                        if !self.failed {
                            warn!(sensor = %self.name, "Sensor reports not operable");
                        }
                        self.failed = true;
                        return ReadOutcome::Inoperable;
                    }
                    Err(e) => {
                        self.record_fault(&e.to_string());
                        return ReadOutcome::Faulted;
                    }
                }

                match self.handle.read_temperature() {
                    Ok(t) => t,
                    Err(e) => {
                        self.record_fault(&e.to_string());
                        return ReadOutcome::Faulted;
                    }
                }
            }
        };

        if self.failed || self.fault_count > 0 {
            info!(sensor = %self.name, faults = self.fault_count, "Sensor read recovered");
        }
        self.fault_count = 0;
        self.failed = false;

        self.apply_reading(temperature);
        ReadOutcome::Updated
    }

    fn apply_reading(&mut self, temperature: i32) {
        let previous = self.state;
        self.temperature = temperature;
        self.state = previous.evaluate(temperature, &self.thresholds);
        self.min = self.min.min(temperature);
        self.max = self.max.max(temperature);

        if self.state.status != previous.status {
            info!(
                sensor = %self.name,
                from = %previous.status,
                to = %self.state.status,
                millidegrees = temperature,
                "Alarm status changed"
            );
        }
        if self.state.fan_speed != previous.fan_speed {
            debug!(
                sensor = %self.name,
                from = %previous.fan_speed,
                to = %self.state.fan_speed,
                "Fan demand changed"
            );
        }
    }

    fn record_fault(&mut self, reason: &str) {
        let before = self.fault_count;
        self.fault_count = (self.fault_count + 1).min(MAX_FAIL_RETRY);

        if before == 0 {
            warn!(sensor = %self.name, error = %reason, "Sensor read failed");
        } else {
            debug!(sensor = %self.name, faults = self.fault_count, error = %reason, "Sensor read failed");
        }

        if self.fault_count >= MAX_FAIL_RETRY && !self.failed {
            self.failed = true;
            warn!(
                sensor = %self.name,
                faults = self.fault_count,
                "Sensor marked failed after repeated read errors"
            );
        }
    }

    /// Force readings to `millidegrees`; `None` restores hardware reads
    pub fn set_test_override(&mut self, millidegrees: Option<i32>) {
        match millidegrees {
            Some(t) => info!(sensor = %self.name, millidegrees = t, "Test temperature override set"),
            None => info!(sensor = %self.name, "Test temperature override cleared"),
        }
        self.test_override = millidegrees;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning subsystem
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn temperature(&self) -> i32 {
        self.temperature
    }

    pub fn min_observed(&self) -> i32 {
        self.min
    }

    pub fn max_observed(&self) -> i32 {
        self.max
    }

    pub fn status(&self) -> AlarmStatus {
        self.state.status
    }

    pub fn fan_speed(&self) -> FanSpeed {
        self.state.fan_speed
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    pub fn fault_count(&self) -> u32 {
        self.fault_count
    }

    pub fn test_override(&self) -> Option<i32> {
        self.test_override
    }

    pub fn is_operable(&self) -> bool {
        !self.failed
    }

    /// Status string published to the store; failed sensors report `fault`
    pub fn published_status(&self) -> &'static str {
        if self.failed {
            FAULT_STATUS
        } else {
            self.state.status.as_str()
        }
    }

    pub fn record(&self) -> SensorRecord {
        SensorRecord {
            name: self.name.clone(),
            status: self.published_status().to_string(),
            fan_state: self.state.fan_speed.as_str().to_string(),
            temperature: self.temperature,
            min: self.min,
            max: self.max,
            location: self.location.clone(),
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            name: self.name.clone(),
            subsystem: self.subsystem.clone(),
            location: self.location.clone(),
            status: self.published_status().to_string(),
            fan_state: self.state.fan_speed.as_str().to_string(),
            temperature: self.temperature,
            min: self.min,
            max: self.max,
            fault_count: self.fault_count,
            test_override: self.test_override,
        }
    }
}
