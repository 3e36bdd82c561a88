//! Subsystems and the live registry that owns them

use std::collections::BTreeMap;

use crate::monitor::Sensor;

/// A hardware grouping owning its sensors
#[derive(Debug)]
pub struct Subsystem {
    name: String,
    sensors: BTreeMap<String, Sensor>,
    /// Reconciliation scratch flag
    pub(crate) marked: bool,
    emergency_shutdown: bool,
    valid: bool,
}

impl Subsystem {
    /// Empty, not yet valid subsystem
    pub fn new(name: impl Into<String>, emergency_shutdown: bool) -> Self {
        Self {
            name: name.into(),
            sensors: BTreeMap::new(),
            marked: false,
            emergency_shutdown,
            valid: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emergency_shutdown(&self) -> bool {
        self.emergency_shutdown
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self) {
        self.valid = true;
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    pub fn add_sensor(&mut self, sensor: Sensor) {
        self.sensors.insert(sensor.name().to_string(), sensor);
    }

    pub fn sensor(&self, name: &str) -> Option<&Sensor> {
        self.sensors.get(name)
    }

    pub fn sensor_mut(&mut self, name: &str) -> Option<&mut Sensor> {
        self.sensors.get_mut(name)
    }

    /// Sensors in name order
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn sensors_mut(&mut self) -> impl Iterator<Item = &mut Sensor> {
        self.sensors.values_mut()
    }

    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors.keys().cloned().collect()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Drop every sensor, releasing their backend handles
    pub(crate) fn clear_sensors(&mut self) {
        self.sensors.clear();
    }
}

/// Name-keyed set of live subsystems
///
/// Consumers only ever see valid subsystems.
#[derive(Debug, Default)]
pub struct SubsystemRegistry {
    subsystems: BTreeMap<String, Subsystem>,
}

impl SubsystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Subsystem> {
        self.subsystems.get(name).filter(|s| s.is_valid())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Subsystem> {
        self.subsystems.get_mut(name).filter(|s| s.is_valid())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub(crate) fn insert(&mut self, subsystem: Subsystem) {
        self.subsystems.insert(subsystem.name().to_string(), subsystem);
    }

    /// Remove a subsystem, destroying its sensors before the subsystem itself
    pub(crate) fn remove(&mut self, name: &str) -> Option<usize> {
        let mut subsystem = self.subsystems.remove(name)?;
        let sensors = subsystem.sensor_count();
        subsystem.clear_sensors();
        drop(subsystem);
        Some(sensors)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subsystem> {
        self.subsystems.values().filter(|s| s.is_valid())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Subsystem> {
        self.subsystems.values_mut().filter(|s| s.is_valid())
    }

    /// Every stored entry, including invalid ones
    pub(crate) fn iter_all_mut(&mut self) -> impl Iterator<Item = &mut Subsystem> {
        self.subsystems.values_mut()
    }

    pub(crate) fn unmarked(&self) -> Vec<String> {
        self.subsystems
            .values()
            .filter(|s| !s.marked || !s.is_valid())
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sensor(&self, name: &str) -> Option<&Sensor> {
        self.iter().find_map(|s| s.sensor(name))
    }

    pub fn sensor_mut(&mut self, name: &str) -> Option<&mut Sensor> {
        self.iter_mut().find_map(|s| s.sensor_mut(name))
    }

    /// Every live sensor, grouped by subsystem in name order
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.iter().flat_map(|s| s.sensors())
    }
}
