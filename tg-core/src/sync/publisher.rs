//! Field-level diffing of live sensors against what the store last saw

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::data::{AlarmStatus, SensorRecord};
use crate::monitor::SubsystemRegistry;

/// One changed column of a sensor row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorField {
    Status(String),
    FanState(String),
    Temperature(i32),
    Min(i32),
    Max(i32),
    Location(String),
}

impl SensorField {
    pub fn apply(&self, record: &mut SensorRecord) {
        match self {
            SensorField::Status(v) => record.status = v.clone(),
            SensorField::FanState(v) => record.fan_state = v.clone(),
            SensorField::Temperature(v) => record.temperature = *v,
            SensorField::Min(v) => record.min = *v,
            SensorField::Max(v) => record.max = *v,
            SensorField::Location(v) => record.location = v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorUpdate {
    pub name: String,
    pub fields: Vec<SensorField>,
}

/// Everything one tick wants written, applied as a single transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    pub updates: Vec<SensorUpdate>,
    /// Set on the first sync after startup
    pub hardware_ready: bool,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && !self.hardware_ready
    }
}

/// Empty row for a sensor the store has never seen
pub fn blank_record(name: &str) -> SensorRecord {
    SensorRecord {
        name: name.to_string(),
        status: AlarmStatus::Uninitialized.as_str().to_string(),
        fan_state: String::new(),
        temperature: 0,
        min: 0,
        max: 0,
        location: String::new(),
    }
}

fn changed_fields(prev: Option<&SensorRecord>, next: &SensorRecord) -> Vec<SensorField> {
    let mut fields = Vec::new();

    if prev.map_or(true, |p| p.status != next.status) {
        fields.push(SensorField::Status(next.status.clone()));
    }
    if prev.map_or(true, |p| p.fan_state != next.fan_state) {
        fields.push(SensorField::FanState(next.fan_state.clone()));
    }
    if prev.map_or(true, |p| p.temperature != next.temperature) {
        fields.push(SensorField::Temperature(next.temperature));
    }
    if prev.map_or(true, |p| p.min != next.min) {
        fields.push(SensorField::Min(next.min));
    }
    if prev.map_or(true, |p| p.max != next.max) {
        fields.push(SensorField::Max(next.max));
    }
    if prev.map_or(true, |p| p.location != next.location) {
        fields.push(SensorField::Location(next.location.clone()));
    }
    fields
}

/// Tracks the last committed view of every sensor row
#[derive(Debug, Default)]
pub struct Publisher {
    published: HashMap<String, SensorRecord>,
    hardware_ready_sent: bool,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the batch that brings the store in line with `registry`.
    ///
    /// `store_rows` are the sensor names the store currently holds; any of them
    /// without a live sensor is set to `uninitialized`.
    pub fn diff(&self, registry: &SubsystemRegistry, store_rows: &[String]) -> SyncBatch {
        let mut updates = Vec::new();
        let mut live = BTreeSet::new();

        for sensor in registry.sensors() {
            live.insert(sensor.name().to_string());
            let record = sensor.record();
            let fields = changed_fields(self.published.get(sensor.name()), &record);
            if !fields.is_empty() {
                updates.push(SensorUpdate {
                    name: record.name,
                    fields,
                });
            }
        }

        let known: BTreeSet<&str> = store_rows
            .iter()
            .map(String::as_str)
            .chain(self.published.keys().map(String::as_str))
            .collect();

        let uninitialized = AlarmStatus::Uninitialized.as_str();
        for name in known {
            if live.contains(name) {
                continue;
            }
            let already = self
                .published
                .get(name)
                .is_some_and(|r| r.status == uninitialized);
            if !already {
                updates.push(SensorUpdate {
                    name: name.to_string(),
                    fields: vec![SensorField::Status(uninitialized.to_string())],
                });
            }
        }

        SyncBatch {
            updates,
            hardware_ready: !self.hardware_ready_sent,
        }
    }

    /// Record a batch the store accepted
    pub fn committed(&mut self, batch: &SyncBatch) {
        for update in &batch.updates {
            let record = self
                .published
                .entry(update.name.clone())
                .or_insert_with(|| blank_record(&update.name));
            for field in &update.fields {
                field.apply(record);
            }
        }
        if batch.hardware_ready {
            self.hardware_ready_sent = true;
        }
        debug!(rows = batch.updates.len(), "Sync batch committed");
    }
}
