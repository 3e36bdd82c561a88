//! State store boundary

use crate::data::SubsystemConfig;
use crate::error::Result;
use crate::sync::SyncBatch;

/// Outcome of trying to take the store's coordination lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// This process holds the lock; processing may continue
    Held,
    /// Another writer holds it
    Contended,
    /// The lock could not be taken for any other reason
    Unavailable,
}

/// Desired configuration in, sensor state out
pub trait StateStore: Send {
    /// Take or confirm the coordination lock. Nothing is read or written
    /// on a tick where this is not `Held`.
    fn lock_state(&mut self) -> LockState;

    /// Monotonically increasing change counter for the desired configuration
    fn seqno(&mut self) -> u64;

    fn desired_subsystems(&self) -> Result<Vec<SubsystemConfig>>;

    /// Names of the sensor rows currently stored
    fn sensor_rows(&self) -> Vec<String>;

    /// Apply a batch atomically; on error nothing is applied
    fn commit(&mut self, batch: &SyncBatch) -> Result<()>;
}
