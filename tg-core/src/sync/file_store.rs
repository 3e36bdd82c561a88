//! JSON file backed state store
//!
//! Two files: the desired subsystem list, written by whoever provisions the
//! box, and the published state file, written only by the daemon. An
//! exclusive `flock` on `<state>.lock` keeps a second daemon from writing at
//! the same time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::constants::limits;
use crate::data::{validate_file_size, SensorRecord, SubsystemConfig};
use crate::error::{Result, ThermError};
use crate::sync::{blank_record, LockState, StateStore, SyncBatch};

#[derive(Debug, Default, Deserialize)]
struct DesiredFile {
    #[serde(default)]
    subsystems: Vec<SubsystemConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    hardware_ready: bool,
    #[serde(default)]
    sensors: BTreeMap<String, SensorRecord>,
}

/// Modification time and length of the desired file; `None` when absent
type Stamp = Option<(Option<SystemTime>, u64)>;

pub struct JsonFileStore {
    desired_path: PathBuf,
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_file: Option<File>,
    seqno: u64,
    last_stamp: Option<Stamp>,
    state: StateFile,
}

impl JsonFileStore {
    /// Open the store, picking up any state a previous run left behind
    pub fn open(desired_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        let desired_path = desired_path.into();
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");

        let state = match load_state(&state_path) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %state_path.display(), error = %e, "Failed to load state file, starting fresh");
                StateFile::default()
            }
        };

        Self {
            desired_path,
            state_path,
            lock_path,
            lock_file: None,
            seqno: 0,
            last_stamp: None,
            state,
        }
    }

    pub fn desired_path(&self) -> &Path {
        &self.desired_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn hardware_ready(&self) -> bool {
        self.state.hardware_ready
    }

    pub fn record(&self, name: &str) -> Option<&SensorRecord> {
        self.state.sensors.get(name)
    }

    fn try_lock(&mut self) -> LockState {
        if let Some(parent) = self.lock_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                debug!(path = %parent.display(), error = %e, "Cannot create state directory");
                return LockState::Unavailable;
            }
        }

        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
        {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %self.lock_path.display(), error = %e, "Cannot open lock file");
                return LockState::Unavailable;
            }
        };

        // SAFETY: the descriptor belongs to `file`, which outlives the call
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            info!(path = %self.lock_path.display(), "Acquired state store lock");
            self.lock_file = Some(file);
            return LockState::Held;
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            LockState::Contended
        } else {
            debug!(error = %err, "flock failed");
            LockState::Unavailable
        }
    }

    fn current_stamp(&self) -> Stamp {
        fs::metadata(&self.desired_path)
            .ok()
            .map(|m| (m.modified().ok(), m.len()))
    }
}

impl StateStore for JsonFileStore {
    fn lock_state(&mut self) -> LockState {
        if self.lock_file.is_some() {
            return LockState::Held;
        }
        self.try_lock()
    }

    fn seqno(&mut self) -> u64 {
        let stamp = self.current_stamp();
        if self.last_stamp.as_ref() != Some(&stamp) {
            self.seqno += 1;
            self.last_stamp = Some(stamp);
            debug!(seqno = self.seqno, path = %self.desired_path.display(), "Desired configuration changed");
        }
        self.seqno
    }

    fn desired_subsystems(&self) -> Result<Vec<SubsystemConfig>> {
        if !self.desired_path.exists() {
            return Ok(Vec::new());
        }

        validate_file_size(&self.desired_path, limits::MAX_CONFIG_SIZE)?;

        let content = fs::read_to_string(&self.desired_path).map_err(|e| ThermError::FileRead {
            path: self.desired_path.clone(),
            source: e,
        })?;
        let desired: DesiredFile = serde_json::from_str(&content)?;
        Ok(desired.subsystems)
    }

    fn sensor_rows(&self) -> Vec<String> {
        self.state.sensors.keys().cloned().collect()
    }

    fn commit(&mut self, batch: &SyncBatch) -> Result<()> {
        if self.lock_file.is_none() {
            return Err(ThermError::StoreLocked);
        }

        let mut next = self.state.clone();
        for update in &batch.updates {
            let record = next
                .sensors
                .entry(update.name.clone())
                .or_insert_with(|| blank_record(&update.name));
            for field in &update.fields {
                field.apply(record);
            }
        }
        if batch.hardware_ready {
            next.hardware_ready = true;
        }

        write_state(&self.state_path, &next)?;
        self.state = next;
        Ok(())
    }
}

fn load_state(path: &Path) -> Result<StateFile> {
    if !path.exists() {
        return Ok(StateFile::default());
    }
    validate_file_size(path, limits::MAX_CONFIG_SIZE)?;
    let content = fs::read_to_string(path).map_err(|e| ThermError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Write-temp-then-rename so readers never see a torn file
fn write_state(path: &Path, state: &StateFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(state)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = File::create(&temp_path).map_err(|e| ThermError::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| ThermError::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| ThermError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), rows = state.sensors.len(), "State file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SensorField, SensorUpdate};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::open(
            dir.path().join("subsystems.json"),
            dir.path().join("run").join("state.json"),
        )
    }

    fn status_batch(name: &str, status: &str) -> SyncBatch {
        SyncBatch {
            updates: vec![SensorUpdate {
                name: name.into(),
                fields: vec![SensorField::Status(status.into())],
            }],
            hardware_ready: true,
        }
    }

    #[test]
    fn test_missing_desired_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.desired_subsystems().unwrap().is_empty());
    }

    #[test]
    fn test_desired_subsystems_parse() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("subsystems.json"),
            r#"{"subsystems":[{"name":"base","hw_desc_dir":"/etc/thermguard/base"}]}"#,
        )
        .unwrap();

        let desired = store_in(&dir).desired_subsystems().unwrap();
        assert_eq!(desired, vec![SubsystemConfig::new("base", "/etc/thermguard/base")]);
    }

    #[test]
    fn test_seqno_moves_only_on_change() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        let first = store.seqno();
        assert_eq!(store.seqno(), first);

        fs::write(dir.path().join("subsystems.json"), r#"{"subsystems":[]}"#).unwrap();
        let second = store.seqno();
        assert!(second > first);
        assert_eq!(store.seqno(), second);

        fs::write(
            dir.path().join("subsystems.json"),
            r#"{"subsystems":[{"name":"a","hw_desc_dir":"/x"}]}"#,
        )
        .unwrap();
        assert!(store.seqno() > second);
    }

    #[test]
    fn test_commit_requires_lock() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let err = store.commit(&status_batch("base-1", "normal")).unwrap_err();
        assert!(matches!(err, ThermError::StoreLocked));
    }

    #[test]
    fn test_commit_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = store_in(&dir);
            assert_eq!(store.lock_state(), LockState::Held);
            store.commit(&status_batch("base-1", "normal")).unwrap();
            assert!(store.hardware_ready());
            assert_eq!(store.record("base-1").map(|r| r.status.as_str()), Some("normal"));
        }

        let reopened = store_in(&dir);
        assert!(reopened.hardware_ready());
        assert_eq!(reopened.sensor_rows(), vec!["base-1".to_string()]);
        assert!(!dir.path().join("run").join("state.json.tmp").exists());
    }

    #[test]
    fn test_second_store_is_contended() {
        let dir = TempDir::new().unwrap();
        let mut first = store_in(&dir);
        let mut second = store_in(&dir);

        assert_eq!(first.lock_state(), LockState::Held);
        assert_eq!(second.lock_state(), LockState::Contended);

        drop(first);
        assert_eq!(second.lock_state(), LockState::Held);
    }

    #[test]
    fn test_corrupt_state_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("run")).unwrap();
        fs::write(dir.path().join("run").join("state.json"), "{ nope").unwrap();

        let store = store_in(&dir);
        assert!(store.sensor_rows().is_empty());
        assert!(!store.hardware_ready());
    }
}
