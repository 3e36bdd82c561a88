//! Power-off by running the configured command

use std::process::Command;
use tracing::{error, info};

use tg_core::PowerControl;
use tg_error::{Result, ThermError};

/// Runs `poweroff_command` once; later calls are no-ops
pub struct CommandPowerOff {
    command: String,
    fired: bool,
}

impl CommandPowerOff {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            fired: false,
        }
    }
}

impl PowerControl for CommandPowerOff {
    fn power_off(&mut self, sensor: &str) -> Result<()> {
        if self.fired {
            return Ok(());
        }
        self.fired = true;

        info!(command = %self.command, sensor = %sensor, "Running power-off command");
        let status = Command::new(&self.command)
            .status()
            .map_err(|e| ThermError::PowerOff(format!("{}: {}", self.command, e)))?;

        if !status.success() {
            error!(command = %self.command, status = %status, "Power-off command failed");
            return Err(ThermError::PowerOff(format!("{} exited with {}", self.command, status)));
        }
        Ok(())
    }
}
