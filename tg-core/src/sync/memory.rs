//! In-memory state store for embedding and tests

use std::collections::BTreeMap;

use crate::data::{SensorRecord, SubsystemConfig};
use crate::error::{Result, ThermError};
use crate::sync::{blank_record, LockState, StateStore, SyncBatch};

#[derive(Debug)]
pub struct MemoryStore {
    desired: Vec<SubsystemConfig>,
    seqno: u64,
    rows: BTreeMap<String, SensorRecord>,
    hardware_ready: bool,
    lock: LockState,
    fail_commits: bool,
    commits: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            desired: Vec::new(),
            seqno: 0,
            rows: BTreeMap::new(),
            hardware_ready: false,
            lock: LockState::Held,
            fail_commits: false,
            commits: 0,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the desired subsystem list and bump the sequence number
    pub fn set_desired(&mut self, desired: Vec<SubsystemConfig>) {
        self.desired = desired;
        self.seqno += 1;
    }

    pub fn set_lock(&mut self, lock: LockState) {
        self.lock = lock;
    }

    /// Make every following commit fail until cleared
    pub fn fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Seed a row as if a previous run had published it
    pub fn insert_row(&mut self, record: SensorRecord) {
        self.rows.insert(record.name.clone(), record);
    }

    pub fn record(&self, name: &str) -> Option<&SensorRecord> {
        self.rows.get(name)
    }

    pub fn hardware_ready(&self) -> bool {
        self.hardware_ready
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl StateStore for MemoryStore {
    fn lock_state(&mut self) -> LockState {
        self.lock
    }

    fn seqno(&mut self) -> u64 {
        self.seqno
    }

    fn desired_subsystems(&self) -> Result<Vec<SubsystemConfig>> {
        Ok(self.desired.clone())
    }

    fn sensor_rows(&self) -> Vec<String> {
        self.rows.keys().cloned().collect()
    }

    fn commit(&mut self, batch: &SyncBatch) -> Result<()> {
        if self.fail_commits {
            return Err(ThermError::store("commit rejected"));
        }
        for update in &batch.updates {
            let record = self
                .rows
                .entry(update.name.clone())
                .or_insert_with(|| blank_record(&update.name));
            for field in &update.fields {
                field.apply(record);
            }
        }
        if batch.hardware_ready {
            self.hardware_ready = true;
        }
        self.commits += 1;
        Ok(())
    }
}
