//! Mark-and-sweep reconciliation of live subsystems against the desired list
//!
//! Runs whenever the store's sequence number moves:
//!
//! 1. every live subsystem is unmarked
//! 2. each desired subsystem is marked if present, otherwise built from its
//!    hardware description and inserted
//! 3. anything left unmarked is destroyed, sensors first
//!
//! Building is all-or-nothing: a subsystem that fails part way is dropped
//! before it ever reaches the registry.

use tracing::{debug, error, info, warn};

use crate::data::{validate_hw_desc_dir, validate_subsystem_name, DescriptionLoader, SubsystemConfig};
use crate::error::{Result, ThermError};
use crate::hw::BackendRegistry;
use crate::monitor::{Sensor, Subsystem, SubsystemRegistry};

/// What one reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub retained: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
    pub sensors_created: usize,
    pub sensors_destroyed: usize,
}

impl ReconcileReport {
    /// True when nothing was allocated or destroyed
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.removed.is_empty()
            && self.sensors_created == 0
            && self.sensors_destroyed == 0
    }
}

pub struct Reconciler {
    platform: String,
    loader: Box<dyn DescriptionLoader>,
    last_seqno: Option<u64>,
}

impl Reconciler {
    pub fn new(platform: impl Into<String>, loader: Box<dyn DescriptionLoader>) -> Self {
        Self {
            platform: platform.into(),
            loader,
            last_seqno: None,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Whether `seqno` differs from the last one reconciled
    pub fn needs_run(&self, seqno: u64) -> bool {
        self.last_seqno != Some(seqno)
    }

    /// Reconcile if the sequence number changed since the previous call
    pub fn reconcile(
        &mut self,
        registry: &mut SubsystemRegistry,
        backends: &BackendRegistry,
        seqno: u64,
        desired: &[SubsystemConfig],
    ) -> Option<ReconcileReport> {
        if !self.needs_run(seqno) {
            return None;
        }
        self.last_seqno = Some(seqno);
        debug!(seqno, desired = desired.len(), "Reconciling subsystems");
        Some(self.apply(registry, backends, desired))
    }

    /// One unconditional mark-and-sweep pass
    pub fn apply(
        &self,
        registry: &mut SubsystemRegistry,
        backends: &BackendRegistry,
        desired: &[SubsystemConfig],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for subsystem in registry.iter_all_mut() {
            subsystem.marked = false;
        }

        for config in desired {
            if let Some(existing) = registry.get_mut(&config.name) {
                if !existing.marked {
                    existing.marked = true;
                    report.retained.push(config.name.clone());
                }
                continue;
            }

            match self.build_subsystem(backends, config) {
                Ok(mut subsystem) => {
                    subsystem.marked = true;
                    report.sensors_created += subsystem.sensor_count();
                    info!(
                        subsystem = %config.name,
                        sensors = subsystem.sensor_count(),
                        emergency_shutdown = subsystem.emergency_shutdown(),
                        "Subsystem added"
                    );
                    report.created.push(config.name.clone());
                    registry.insert(subsystem);
                }
                Err(e) => {
                    error!(subsystem = %config.name, error = %e, "Failed to add subsystem");
                    report.failed.push(config.name.clone());
                }
            }
        }

        for name in registry.unmarked() {
            if let Some(sensors) = registry.remove(&name) {
                info!(subsystem = %name, sensors, "Subsystem removed");
                report.sensors_destroyed += sensors;
                report.removed.push(name);
            }
        }

        report
    }

    fn build_subsystem(&self, backends: &BackendRegistry, config: &SubsystemConfig) -> Result<Subsystem> {
        validate_subsystem_name(&config.name)?;

        let subsystem_backend = backends
            .subsystem_backend(&self.platform)
            .ok_or_else(|| ThermError::BackendUnavailable(self.platform.clone()))?;
        let sensor_backend = backends
            .sensor_backend(&self.platform)
            .ok_or_else(|| ThermError::BackendUnavailable(self.platform.clone()))?;

        let dir = validate_hw_desc_dir(&config.hw_desc_dir)?;
        let description = self.loader.load(&dir)?;

        subsystem_backend.prepare(&config.name, &description)?;

        let mut subsystem = Subsystem::new(&config.name, description.auto_shutdown);

        for sensor_desc in &description.sensors {
            let sensor_name = format!("{}-{}", config.name, sensor_desc.number);
            if subsystem.sensor(&sensor_name).is_some() {
                warn!(sensor = %sensor_name, "Duplicate sensor number in description, skipping");
                continue;
            }

            let handle = match sensor_backend.construct(&config.name, &description, sensor_desc) {
                Ok(h) => h,
                Err(e) => {
                    warn!(sensor = %sensor_name, error = %e, "Skipping sensor");
                    continue;
                }
            };

            let mut sensor = Sensor::new(&config.name, sensor_desc, handle);
            sensor.read();
            debug!(
                sensor = %sensor.name(),
                location = %sensor.location(),
                millidegrees = sensor.temperature(),
                status = %sensor.published_status(),
                "Sensor added"
            );
            subsystem.add_sensor(sensor);
        }

        if subsystem.sensor_count() == 0 {
            return Err(ThermError::subsystem_construct(&config.name, "no usable sensors"));
        }

        subsystem.set_valid();
        Ok(subsystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockDescriptionLoader;
    use crate::monitor::testing::{registry_with, Fixture};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_creates_desired_subsystems() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        let report = reconciler
            .reconcile(&mut registry, &backends, 1, &fx.configs(&["a", "b"]))
            .unwrap();

        assert_eq!(report.created, names(&["a", "b"]));
        assert_eq!(report.sensors_created, 4);
        assert_eq!(registry.names(), names(&["a", "b"]));
        assert!(registry.sensor("a-1").is_some());
        assert!(registry.sensor("b-2").is_some());
        // the initial read already happened
        assert_eq!(registry.sensor("a-1").unwrap().temperature(), 40_000);
    }

    #[test]
    fn test_reconcile_idempotence() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();
        let desired = fx.configs(&["a", "b", "c"]);

        reconciler.apply(&mut registry, &backends, &desired);
        let constructed = fx.hw.constructed();
        let dropped = fx.hw.dropped();

        let second = reconciler.apply(&mut registry, &backends, &desired);
        assert!(second.is_noop());
        assert_eq!(second.retained, names(&["a", "b", "c"]));
        assert_eq!(fx.hw.constructed(), constructed);
        assert_eq!(fx.hw.dropped(), dropped);
    }

    #[test]
    fn test_unchanged_seqno_is_skipped() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        assert!(reconciler.reconcile(&mut registry, &backends, 7, &fx.configs(&["a"])).is_some());
        // a different desired list under the same seqno is not looked at
        assert!(reconciler.reconcile(&mut registry, &backends, 7, &[]).is_none());
        assert!(registry.contains("a"));
        assert!(reconciler.needs_run(8));
    }

    #[test]
    fn test_mark_and_sweep() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        reconciler.reconcile(&mut registry, &backends, 1, &fx.configs(&["a", "b", "c"]));
        let a_sensors = registry.get("a").unwrap().sensor_names();
        let c_sensors = registry.get("c").unwrap().sensor_names();
        let dropped = fx.hw.dropped();

        let report = reconciler
            .reconcile(&mut registry, &backends, 2, &fx.configs(&["a", "c"]))
            .unwrap();

        assert_eq!(report.removed, names(&["b"]));
        assert_eq!(report.sensors_destroyed, 2);
        assert!(report.created.is_empty());
        assert_eq!(fx.hw.dropped(), dropped + 2);
        assert_eq!(registry.names(), names(&["a", "c"]));
        assert_eq!(registry.get("a").unwrap().sensor_names(), a_sensors);
        assert_eq!(registry.get("c").unwrap().sensor_names(), c_sensors);
        assert!(registry.sensor("b-1").is_none());
    }

    #[test]
    fn test_bad_sensor_skips_only_that_sensor() {
        let fx = Fixture::new();
        fx.hw.fail_device("a-dev-1");
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        reconciler.reconcile(&mut registry, &backends, 1, &fx.configs(&["a"]));
        let a = registry.get("a").unwrap();
        assert_eq!(a.sensor_names(), names(&["a-2"]));
    }

    #[test]
    fn test_subsystem_without_sensors_is_discarded() {
        let fx = Fixture::new();
        fx.hw.fail_device("a-dev-1");
        fx.hw.fail_device("a-dev-2");
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        let report = reconciler
            .reconcile(&mut registry, &backends, 1, &fx.configs(&["a", "b"]))
            .unwrap();
        assert_eq!(report.failed, names(&["a"]));
        assert_eq!(registry.names(), names(&["b"]));
    }

    #[test]
    fn test_missing_backend_is_not_fatal() {
        let fx = Fixture::new();
        let backends = BackendRegistry::new();
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        let report = reconciler
            .reconcile(&mut registry, &backends, 1, &fx.configs(&["a"]))
            .unwrap();
        assert_eq!(report.failed, names(&["a"]));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_prepare_discards_subsystem() {
        let fx = Fixture::new();
        fx.hw.fail_subsystem("b");
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        reconciler.reconcile(&mut registry, &backends, 1, &fx.configs(&["a", "b"]));
        assert_eq!(registry.names(), names(&["a"]));
        assert_eq!(fx.hw.constructed(), 2);
    }

    #[test]
    fn test_missing_description_dir() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        let desired = vec![
            SubsystemConfig::new("a", ""),
            SubsystemConfig::new("b", "/nonexistent/thermguard/b"),
        ];
        let report = reconciler.reconcile(&mut registry, &backends, 1, &desired).unwrap();
        assert_eq!(report.failed, names(&["a", "b"]));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unreadable_description() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut loader = MockDescriptionLoader::new();
        loader
            .expect_load()
            .times(1)
            .returning(|_| Err(ThermError::config("truncated thermal.json")));
        let mut reconciler = Reconciler::new("fake", Box::new(loader));
        let mut registry = SubsystemRegistry::new();

        let report = reconciler
            .reconcile(&mut registry, &backends, 1, &fx.configs(&["a"]))
            .unwrap();
        assert_eq!(report.failed, names(&["a"]));
        assert_eq!(fx.hw.constructed(), 0);
    }

    #[test]
    fn test_failed_subsystem_retried_on_next_change() {
        let fx = Fixture::new();
        fx.hw.fail_subsystem("a");
        let backends = registry_with(&fx.hw);
        let mut reconciler = fx.reconciler();
        let mut registry = SubsystemRegistry::new();

        reconciler.reconcile(&mut registry, &backends, 1, &fx.configs(&["a"]));
        assert!(registry.is_empty());

        fx.hw.clear_failures();
        let report = reconciler
            .reconcile(&mut registry, &backends, 2, &fx.configs(&["a"]))
            .unwrap();
        assert_eq!(report.created, names(&["a"]));
    }
}
