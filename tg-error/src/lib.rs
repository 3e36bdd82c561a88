//! Unified error handling for thermguard
//!
//! A single error type shared by the core library, the daemon and the
//! operator client. Built on thiserror so every variant carries a readable
//! Display implementation.

use std::io;
use std::path::PathBuf;

/// Result type alias using ThermError
pub type Result<T> = std::result::Result<T, ThermError>;

/// Unified error type for all thermguard operations
#[derive(thiserror::Error, Debug)]
pub enum ThermError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to read temperature of {sensor}: {reason}")]
    TemperatureRead {
        sensor: String,
        reason: String,
    },

    #[error("Failed to read operable state of {sensor}: {reason}")]
    StatusRead {
        sensor: String,
        reason: String,
    },

    #[error("I2C transfer on bus {bus} address {address:#04x} failed: {source}")]
    I2c {
        bus: u32,
        address: u16,
        source: io::Error,
    },

    #[error("Hardware not found: {0}")]
    HardwareNotFound(String),

    #[error("No backend registered for platform '{0}'")]
    BackendUnavailable(String),

    // ============================================================================
    // Entity Construction Errors
    // ============================================================================
    #[error("Failed to construct sensor {sensor}: {reason}")]
    SensorConstruct {
        sensor: String,
        reason: String,
    },

    #[error("Failed to construct subsystem {subsystem}: {reason}")]
    SubsystemConstruct {
        subsystem: String,
        reason: String,
    },

    #[error("Sensor does not exist: {0}")]
    UnknownSensor(String),

    // ============================================================================
    // Configuration and Settings Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ============================================================================
    // State Store Errors
    // ============================================================================
    #[error("State store error: {0}")]
    Store(String),

    #[error("State store lock is held by another process")]
    StoreLocked,

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon not available")]
    DaemonNotAvailable,

    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("Daemon response error: {0}")]
    DaemonResponse(String),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    #[error("Power-off action failed: {0}")]
    PowerOff(String),

    // ============================================================================
    // Process Errors
    // ============================================================================
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl ThermError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn sensor_construct(sensor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SensorConstruct {
            sensor: sensor.into(),
            reason: reason.into(),
        }
    }

    pub fn subsystem_construct(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubsystemConstruct {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }

    pub fn temperature_read(sensor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemperatureRead {
            sensor: sensor.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error from a string
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
