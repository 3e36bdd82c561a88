//! Live sensor model: sensors, subsystems, reconciliation and the poll tick

mod dump;
mod poll;
mod reconcile;
mod sensor;
mod subsystem;

#[cfg(test)]
pub(crate) mod testing;

pub use dump::format_dump;
#[cfg(test)]
pub use poll::MockPowerControl;
pub use poll::{Monitor, PowerControl, TickOutcome};
pub use reconcile::{ReconcileReport, Reconciler};
pub use sensor::{fetch_thresholds, ReadOutcome, Sensor};
pub use subsystem::{Subsystem, SubsystemRegistry};
