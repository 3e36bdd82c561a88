//! Input validation for thermguard
//!
//! Checks applied to names and paths arriving from the desired-config list and
//! to the contents of hardware descriptions before anything is constructed.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::constants::limits;
use crate::data::ThresholdSet;
use crate::error::{Result, ThermError};

fn subsystem_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.]*$").ok())
        .as_ref()
}

/// Validates a subsystem name. Sensor names are derived as `<subsystem>-<n>`,
/// so the subsystem name itself may not contain '-'.
pub fn validate_subsystem_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ThermError::config("subsystem name cannot be empty"));
    }

    if name.len() > limits::MAX_SUBSYSTEM_NAME_LEN {
        return Err(ThermError::config(format!(
            "subsystem name exceeds maximum length of {} characters",
            limits::MAX_SUBSYSTEM_NAME_LEN
        )));
    }

    if !subsystem_name_pattern().is_some_and(|re| re.is_match(name)) {
        return Err(ThermError::config(format!(
            "subsystem name '{}' contains invalid characters",
            name
        )));
    }

    Ok(())
}

/// Validates a hardware description directory: must be set, exist, and be a directory
pub fn validate_hw_desc_dir(dir: &str) -> Result<PathBuf> {
    if dir.trim().is_empty() {
        return Err(ThermError::MissingConfig("hw_desc_dir".into()));
    }

    let path = Path::new(dir);
    if !path.is_absolute() {
        return Err(ThermError::invalid_path(path, "hardware description dir must be absolute"));
    }

    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(ThermError::invalid_path(path, "path traversal detected"));
    }

    if !path.is_dir() {
        return Err(ThermError::FileNotFound(path.to_path_buf()));
    }

    Ok(path.to_path_buf())
}

/// Validates a file size against a limit before reading it fully
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| ThermError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > max_size {
        return Err(ThermError::config(format!(
            "{} exceeds maximum size of {} bytes",
            path.display(),
            max_size
        )));
    }

    Ok(())
}

/// Returns a description of every hysteresis pair whose off point is above its on point.
/// Such a pair makes the ladder step up and down on alternate ticks.
pub fn threshold_inversions(set: &ThresholdSet) -> Vec<String> {
    let a = &set.alarm;
    let f = &set.fan;
    let pairs = [
        ("alarm emergency", a.emergency_on, a.emergency_off),
        ("alarm critical", a.critical_on, a.critical_off),
        ("alarm max", a.max_on, a.max_off),
        ("fan max", f.max_on, f.max_off),
        ("fan fast", f.fast_on, f.fast_off),
        ("fan medium", f.medium_on, f.medium_off),
    ];

    let mut problems: Vec<String> = pairs
        .iter()
        .filter(|(_, on, off)| off > on)
        .map(|(label, on, off)| format!("{} off {:.2} above on {:.2}", label, off, on))
        .collect();

    if a.low_crit > a.min {
        problems.push(format!("low_crit {:.2} above min {:.2}", a.low_crit, a.min));
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_subsystem_name() {
        assert!(validate_subsystem_name("base").is_ok());
        assert!(validate_subsystem_name("line_card.2").is_ok());
        assert!(validate_subsystem_name("").is_err());
        assert!(validate_subsystem_name("base-1").is_err());
        assert!(validate_subsystem_name("../etc").is_err());
        assert!(validate_subsystem_name(&"a".repeat(49)).is_err());
    }

    #[test]
    fn test_validate_hw_desc_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();
        assert!(validate_hw_desc_dir(path).is_ok());

        assert!(matches!(validate_hw_desc_dir(""), Err(ThermError::MissingConfig(_))));
        assert!(validate_hw_desc_dir("relative/dir").is_err());
        assert!(matches!(
            validate_hw_desc_dir(&format!("{}/missing", path)),
            Err(ThermError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_threshold_inversions() {
        let mut set = ThresholdSet::default();
        assert!(threshold_inversions(&set).is_empty());

        set.alarm.max_off = set.alarm.max_on + 1.0;
        set.alarm.low_crit = set.alarm.min + 1.0;
        let problems = threshold_inversions(&set);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("alarm max"));
    }
}
