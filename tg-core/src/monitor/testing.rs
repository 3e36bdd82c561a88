//! In-crate test doubles for backends and descriptions

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::data::{
    DescriptionLoader, HardwareDescription, SensorDescription, SubsystemConfig, ThresholdKind,
};
use crate::error::{Result, ThermError};
use crate::hw::{BackendRegistry, SensorBackend, SensorHandle, SubsystemBackend};
use crate::monitor::Reconciler;

pub const FAKE_PLATFORM: &str = "fake";
pub const STEADY_MILLIDEGREES: i32 = 40_000;

#[derive(Default)]
struct FakeState {
    queued: HashMap<String, VecDeque<Result<i32>>>,
    steady: HashMap<String, i32>,
    failing_devices: HashSet<String>,
    failing_subsystems: HashSet<String>,
    constructed: usize,
    dropped: usize,
}

/// Scriptable hardware shared between the test and every handle it hands out
#[derive(Clone, Default)]
pub struct FakeHardware {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHardware {
    pub fn set_temperature(&self, device: &str, millidegrees: i32) {
        self.state.lock().steady.insert(device.to_string(), millidegrees);
    }

    /// Readings returned, in order, before falling back to the steady value
    pub fn queue(&self, device: &str, readings: &[i32]) {
        let mut state = self.state.lock();
        let q = state.queued.entry(device.to_string()).or_default();
        q.extend(readings.iter().map(|r| Ok(*r)));
    }

    pub fn queue_error(&self, device: &str) {
        self.state
            .lock()
            .queued
            .entry(device.to_string())
            .or_default()
            .push_back(Err(ThermError::temperature_read(device, "scripted failure")));
    }

    pub fn fail_device(&self, device: &str) {
        self.state.lock().failing_devices.insert(device.to_string());
    }

    pub fn fail_subsystem(&self, name: &str) {
        self.state.lock().failing_subsystems.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_devices.clear();
        state.failing_subsystems.clear();
    }

    pub fn constructed(&self) -> usize {
        self.state.lock().constructed
    }

    pub fn dropped(&self) -> usize {
        self.state.lock().dropped
    }
}

impl SubsystemBackend for FakeHardware {
    fn prepare(&self, subsystem: &str, _description: &HardwareDescription) -> Result<()> {
        if self.state.lock().failing_subsystems.contains(subsystem) {
            return Err(ThermError::subsystem_construct(subsystem, "scripted failure"));
        }
        Ok(())
    }
}

impl SensorBackend for FakeHardware {
    fn construct(
        &self,
        subsystem: &str,
        _description: &HardwareDescription,
        sensor: &SensorDescription,
    ) -> Result<Box<dyn SensorHandle>> {
        let mut state = self.state.lock();
        if state.failing_devices.contains(&sensor.device) {
            return Err(ThermError::sensor_construct(
                format!("{}-{}", subsystem, sensor.number),
                "scripted failure",
            ));
        }
        state.constructed += 1;
        Ok(Box::new(FakeHandle {
            device: sensor.device.clone(),
            hw: self.clone(),
        }))
    }
}

struct FakeHandle {
    device: String,
    hw: FakeHardware,
}

impl SensorHandle for FakeHandle {
    fn read_operable(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn read_temperature(&mut self) -> Result<i32> {
        let mut state = self.hw.state.lock();
        if let Some(next) = state.queued.get_mut(&self.device).and_then(|q| q.pop_front()) {
            return next;
        }
        Ok(state.steady.get(&self.device).copied().unwrap_or(STEADY_MILLIDEGREES))
    }

    fn read_threshold(&mut self, _kind: ThresholdKind) -> Option<f32> {
        None
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.hw.state.lock().dropped += 1;
    }
}

/// Two sensors per subsystem, devices named `<subsystem>-dev-<n>`.
/// Subsystems whose name starts with `hot` request emergency shutdown.
pub struct FixedLoader;

impl DescriptionLoader for FixedLoader {
    fn load(&self, hw_desc_dir: &Path) -> Result<HardwareDescription> {
        let subsystem = hw_desc_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ThermError::invalid_path(hw_desc_dir, "no subsystem name"))?;
        Ok(HardwareDescription {
            auto_shutdown: subsystem.starts_with("hot"),
            sensors: (1..=2)
                .map(|n| SensorDescription {
                    number: n,
                    location: format!("{} slot {}", subsystem, n),
                    device: format!("{}-dev-{}", subsystem, n),
                    sensor_type: "fake".into(),
                    alarm_thresholds: Default::default(),
                    fan_thresholds: Default::default(),
                })
                .collect(),
            ..Default::default()
        })
    }
}

pub fn registry_with(hw: &FakeHardware) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(FAKE_PLATFORM, Box::new(hw.clone()), Box::new(hw.clone()));
    registry
}

/// Description directories plus fake hardware
pub struct Fixture {
    pub root: TempDir,
    pub hw: FakeHardware,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("tempdir"),
            hw: FakeHardware::default(),
        }
    }

    pub fn configs(&self, names: &[&str]) -> Vec<SubsystemConfig> {
        names
            .iter()
            .map(|name| {
                let dir = self.root.path().join(name);
                std::fs::create_dir_all(&dir).expect("fixture dir");
                SubsystemConfig::new(*name, dir.to_string_lossy())
            })
            .collect()
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(FAKE_PLATFORM, Box::new(FixedLoader))
    }
}
