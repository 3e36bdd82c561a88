//! Constants and configuration values for thermguard
//!
//! Centralizes the magic numbers, paths and configuration defaults.
//! Add new values here first rather than inlining them elsewhere.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// Directory holding the i2c-dev character devices
    pub const I2C_DEV_DIR: &str = "/dev";

    /// Configuration directory
    pub const CONFIG_DIR: &str = "/etc/thermguard";

    /// Daemon settings file inside CONFIG_DIR
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Desired subsystem list maintained by the platform manager
    pub const DESIRED_CONFIG: &str = "/etc/thermguard/subsystems.json";

    /// Published sensor state
    pub const STATE_FILE: &str = "/run/thermguard/state.json";

    /// Hardware description file expected inside each subsystem's description dir
    pub const THERMAL_DESCRIPTION: &str = "thermal.json";

    /// Control socket
    pub const SOCKET_PATH: &str = "/run/thermguard.sock";

    /// PID file
    pub const PID_FILE: &str = "/run/thermguard.pid";

    /// Default power-off command
    pub const POWEROFF_COMMAND: &str = "/sbin/poweroff";
}

/// Timing constants for the poll loop
pub mod timing {
    use super::*;

    /// Default polling period in seconds (settings file value)
    pub const POLLING_PERIOD_SECS: u64 = 5;

    /// Shortest polling period accepted from settings
    pub const MIN_POLLING_PERIOD_SECS: u64 = 1;

    /// Longest polling period accepted from settings
    pub const MAX_POLLING_PERIOD_SECS: u64 = 300;

    /// Minimum spacing between repeated "store lock contended" errors
    pub const LOCK_CONTENTION_LOG_INTERVAL: Duration = Duration::from_secs(60);

    /// How long a parked daemon sleeps between wakeups after power-off was requested
    pub const PARK_INTERVAL: Duration = Duration::from_secs(1000);
}

/// Sensor read policy
pub mod sensor {
    /// Consecutive read failures after which a sensor is reported as failed
    pub const MAX_FAIL_RETRY: u32 = 5;

    /// Millidegrees per degree Celsius
    pub const MILLIDEGREES_PER_DEGREE: i32 = 1000;

    /// Starting value for the observed minimum; any real reading replaces it
    pub const INITIAL_MIN_MILLIDEGREES: i32 = 1_000_000;

    /// Starting value for the observed maximum; any real reading replaces it
    pub const INITIAL_MAX_MILLIDEGREES: i32 = -1_000_000;

    /// Temperature reported before a sensor has been read
    pub const INITIAL_TEMPERATURE: i32 = 0;
}

/// Offsets used to derive a full threshold set from hwmon limit attributes (°C)
pub mod hwmon_offsets {
    pub const EMERGENCY_ON: f32 = 2.0;
    pub const CRITICAL_ON: f32 = 5.0;
    pub const MAX_ON: f32 = 5.0;
    pub const FAN_MAX_ON: f32 = 5.0;
    pub const FAN_FAST_ON: f32 = -3.0;
    pub const FAN_FAST_OFF: f32 = -6.0;
    pub const FAN_MEDIUM_ON: f32 = -9.0;
    pub const FAN_MEDIUM_OFF: f32 = -12.0;
}

/// LM75 register layout
pub mod lm75 {
    /// Temperature register
    pub const TEMP_REGISTER: u8 = 0x00;

    /// Bit in the low byte that carries the half degree
    pub const HALF_DEGREE_BIT: u8 = 0x80;

    /// Millidegrees added when the half degree bit is set
    pub const HALF_DEGREE_MILLIDEGREES: i32 = 500;

    /// Linux i2c-dev ioctl selecting the slave address
    pub const I2C_SLAVE: libc::c_ulong = 0x0703;

    /// Largest 7-bit bus address
    pub const MAX_ADDRESS: u16 = 0x7f;
}

/// Size limits for files read from disk
pub mod limits {
    /// Maximum hardware description size (1MB)
    pub const MAX_DESCRIPTION_SIZE: u64 = 1024 * 1024;

    /// Maximum settings or desired-config file size (1MB)
    pub const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

    /// Maximum subsystem name length
    pub const MAX_SUBSYSTEM_NAME_LEN: usize = 48;

    /// Maximum sensors per subsystem
    pub const MAX_SENSORS_PER_SUBSYSTEM: usize = 256;
}

/// Built-in platform identifiers
pub mod platform {
    /// Kernel hwmon sensor tree
    pub const SYSFS: &str = "sysfs";

    /// LM75-class sensors on an i2c-dev bus
    pub const I2C: &str = "i2c";

    pub const DEFAULT: &str = SYSFS;
}
