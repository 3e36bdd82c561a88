//! One poll tick: reconcile, read, interlock, sync
//!
//! # Safety Features
//! - **Double read**: an `Emergency` reading is confirmed by a second read
//!   before the power is cut
//! - **One-way**: after a confirmed shutdown every later tick is refused
//! - **Contained failures**: sensor, subsystem and store errors are logged
//!   and never abort the tick

use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use tg_protocol::{validate_override, SensorSnapshot, CLEAR_OVERRIDE};

use crate::constants::timing::LOCK_CONTENTION_LOG_INTERVAL;
use crate::data::AlarmStatus;
use crate::error::{Result, ThermError};
use crate::hw::BackendRegistry;
use crate::monitor::{format_dump, ReadOutcome, ReconcileReport, Reconciler, SubsystemRegistry};
use crate::sync::{LockState, Publisher, StateStore};

/// The irreversible power-off action
#[cfg_attr(test, mockall::automock)]
pub trait PowerControl: Send {
    /// Power the system off because `sensor` confirmed an emergency
    fn power_off(&mut self, sensor: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sensors read; `rows` sensor rows written to the store
    Synced {
        report: Option<ReconcileReport>,
        rows: usize,
    },
    /// Store lock not held; nothing was read or written
    Paused(LockState),
    /// Emergency confirmed on `sensor`; power-off requested
    EmergencyShutdown { sensor: String },
    /// A shutdown already happened; the tick was refused
    Parked,
}

/// Owns the live model and drives it one tick at a time
pub struct Monitor {
    registry: SubsystemRegistry,
    reconciler: Reconciler,
    backends: BackendRegistry,
    publisher: Publisher,
    power: Box<dyn PowerControl>,
    shutdown_sensor: Option<String>,
    last_contention_log: Option<Instant>,
    /// Sensors whose confirmed emergency was already reported with shutdown disabled
    emergency_noted: HashSet<String>,
}

impl Monitor {
    pub fn new(reconciler: Reconciler, backends: BackendRegistry, power: Box<dyn PowerControl>) -> Self {
        Self {
            registry: SubsystemRegistry::new(),
            reconciler,
            backends,
            publisher: Publisher::new(),
            power,
            shutdown_sensor: None,
            last_contention_log: None,
            emergency_noted: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &SubsystemRegistry {
        &self.registry
    }

    pub fn platform(&self) -> &str {
        self.reconciler.platform()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_sensor.is_some()
    }

    /// Run one poll iteration against `store`
    pub fn tick(&mut self, store: &mut dyn StateStore) -> TickOutcome {
        if self.shutdown_sensor.is_some() {
            return TickOutcome::Parked;
        }

        match store.lock_state() {
            LockState::Held => {
                if self.last_contention_log.take().is_some() {
                    info!("State store lock acquired, resuming");
                }
            }
            other => {
                self.note_lock_loss(other);
                return TickOutcome::Paused(other);
            }
        }

        let report = self.reconcile(store);

        if let Some(sensor) = self.read_sensors() {
            self.shut_down(&sensor);
            return TickOutcome::EmergencyShutdown { sensor };
        }

        let rows = self.sync(store);
        TickOutcome::Synced { report, rows }
    }

    fn note_lock_loss(&mut self, state: LockState) {
        let due = self
            .last_contention_log
            .map_or(true, |at| at.elapsed() >= LOCK_CONTENTION_LOG_INTERVAL);
        if due {
            error!(state = ?state, "State store lock not held, processing paused");
            self.last_contention_log = Some(Instant::now());
        }
    }

    fn reconcile(&mut self, store: &mut dyn StateStore) -> Option<ReconcileReport> {
        let seqno = store.seqno();
        if !self.reconciler.needs_run(seqno) {
            return None;
        }

        // Left unrecorded on failure so the next tick retries
        let desired = match store.desired_subsystems() {
            Ok(desired) => desired,
            Err(e) => {
                error!(seqno, error = %e, "Failed to read desired subsystems");
                return None;
            }
        };

        let report = self
            .reconciler
            .reconcile(&mut self.registry, &self.backends, seqno, &desired)?;
        if !report.is_noop() {
            info!(
                seqno,
                created = report.created.len(),
                removed = report.removed.len(),
                failed = report.failed.len(),
                "Subsystems reconciled"
            );
        }
        Some(report)
    }

    /// Read every live sensor. Returns the sensor that confirmed an
    /// emergency in a subsystem that allows shutdown.
    fn read_sensors(&mut self) -> Option<String> {
        for subsystem in self.registry.iter_mut() {
            let shutdown_allowed = subsystem.emergency_shutdown();
            let subsystem_name = subsystem.name().to_string();

            for sensor in subsystem.sensors_mut() {
                let first = sensor.read();
                if first != ReadOutcome::Updated || sensor.status() != AlarmStatus::Emergency {
                    self.emergency_noted.remove(sensor.name());
                    continue;
                }

                warn!(
                    sensor = %sensor.name(),
                    millidegrees = sensor.temperature(),
                    "Emergency temperature read, confirming"
                );

                let second = sensor.read();
                if second != ReadOutcome::Updated || sensor.status() != AlarmStatus::Emergency {
                    info!(
                        sensor = %sensor.name(),
                        status = %sensor.status(),
                        "Emergency not confirmed by second read"
                    );
                    continue;
                }

                if shutdown_allowed {
                    error!(
                        event = "TEMP_SENSOR_SHUTDOWN",
                        sensor = %sensor.name(),
                        subsystem = %subsystem_name,
                        millidegrees = sensor.temperature(),
                        "Emergency temperature confirmed, shutting down"
                    );
                    return Some(sensor.name().to_string());
                }

                if self.emergency_noted.insert(sensor.name().to_string()) {
                    warn!(
                        sensor = %sensor.name(),
                        subsystem = %subsystem_name,
                        "Emergency confirmed but shutdown is disabled for this subsystem"
                    );
                }
            }
        }
        None
    }

    fn shut_down(&mut self, sensor: &str) {
        self.shutdown_sensor = Some(sensor.to_string());
        if let Err(e) = self.power.power_off(sensor) {
            error!(sensor = %sensor, error = %e, "Power-off request failed");
        }
    }

    fn sync(&mut self, store: &mut dyn StateStore) -> usize {
        let batch = self.publisher.diff(&self.registry, &store.sensor_rows());
        if batch.is_empty() {
            return 0;
        }

        match store.commit(&batch) {
            Ok(()) => {
                self.publisher.committed(&batch);
                batch.updates.len()
            }
            Err(e) => {
                warn!(rows = batch.updates.len(), error = %e, "State sync failed, batch discarded");
                0
            }
        }
    }

    /// Force `sensor` to read `millidegrees`; `-1` restores hardware reads
    pub fn set_test_override(&mut self, sensor: &str, millidegrees: i32) -> Result<()> {
        validate_override(millidegrees).map_err(|reason| ThermError::InvalidConfig {
            field: "millidegrees".into(),
            reason,
        })?;

        let target = self
            .registry
            .sensor_mut(sensor)
            .ok_or_else(|| ThermError::UnknownSensor(sensor.to_string()))?;

        let value = (millidegrees != CLEAR_OVERRIDE).then_some(millidegrees);
        target.set_test_override(value);
        debug!(sensor = %sensor, value = ?value, "Override applied");
        Ok(())
    }

    /// Human-readable snapshot of every subsystem and sensor
    pub fn dump(&self) -> String {
        format_dump(self.reconciler.platform(), &self.registry)
    }

    pub fn snapshots(&self) -> Vec<SensorSnapshot> {
        self.registry.sensors().map(|s| s.snapshot()).collect()
    }
}
