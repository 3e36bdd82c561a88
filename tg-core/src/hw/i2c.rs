//! LM75 temperature sensors on an i2c-dev bus
//!
//! The LM75 temperature register holds a 9-bit two's complement value: the
//! first byte is whole degrees, the top bit of the second byte adds 0.5 °C.
//! The chip has no limit registers the daemon uses, so every threshold comes
//! from the hardware description.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::constants::{lm75, sensor::MILLIDEGREES_PER_DEGREE};
use crate::data::{HardwareDescription, SensorDescription, ThresholdKind};
use crate::error::{Result, ThermError};
use crate::hw::{SensorBackend, SensorHandle, SubsystemBackend};

/// Register-level access to i2c buses
pub trait I2cBus: Send {
    /// Select `address` on `bus`, write `register`, then read `buf.len()` bytes
    fn read_register(&mut self, bus: u32, address: u16, register: u8, buf: &mut [u8]) -> io::Result<()>;
}

/// `/dev/i2c-<bus>` through the Linux i2c-dev interface
#[derive(Debug, Clone)]
pub struct LinuxI2cBus {
    dev_dir: PathBuf,
}

impl LinuxI2cBus {
    pub fn new(dev_dir: impl Into<PathBuf>) -> Self {
        Self { dev_dir: dev_dir.into() }
    }
}

impl I2cBus for LinuxI2cBus {
    fn read_register(&mut self, bus: u32, address: u16, register: u8, buf: &mut [u8]) -> io::Result<()> {
        let path = self.dev_dir.join(format!("i2c-{}", bus));
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        // SAFETY: the descriptor belongs to `file`, which outlives the call, and
        // I2C_SLAVE takes the address by value.
        let rc = unsafe {
            libc::ioctl(file.as_raw_fd(), lm75::I2C_SLAVE as _, address as libc::c_ulong)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        file.write_all(&[register])?;
        file.read_exact(buf)?;
        trace!(bus, address, register, bytes = buf.len(), "i2c read");
        Ok(())
    }
}

type SharedBus = Arc<Mutex<Box<dyn I2cBus>>>;

/// Decode the two LM75 temperature bytes into millidegrees
pub fn decode_lm75(raw: [u8; 2]) -> i32 {
    let mut millidegrees = (raw[0] as i8 as i32) * MILLIDEGREES_PER_DEGREE;
    if raw[1] & lm75::HALF_DEGREE_BIT != 0 {
        millidegrees += lm75::HALF_DEGREE_MILLIDEGREES;
    }
    millidegrees
}

/// Backend for LM75-class sensors
#[derive(Clone)]
pub struct I2cBackend {
    bus: SharedBus,
}

impl I2cBackend {
    pub fn new(bus: impl I2cBus + 'static) -> Self {
        let bus: Box<dyn I2cBus> = Box::new(bus);
        Self {
            bus: Arc::new(Mutex::new(bus)),
        }
    }
}

impl SubsystemBackend for I2cBackend {
    fn prepare(&self, subsystem: &str, description: &HardwareDescription) -> Result<()> {
        if let Some(bad) = description.devices.iter().find(|d| d.address > lm75::MAX_ADDRESS) {
            return Err(ThermError::subsystem_construct(
                subsystem,
                format!("device {} has invalid address {:#x}", bad.name, bad.address),
            ));
        }
        Ok(())
    }
}

impl SensorBackend for I2cBackend {
    fn construct(
        &self,
        subsystem: &str,
        description: &HardwareDescription,
        sensor: &SensorDescription,
    ) -> Result<Box<dyn SensorHandle>> {
        let name = format!("{}-{}", subsystem, sensor.number);

        if !sensor.sensor_type.eq_ignore_ascii_case("lm75") {
            return Err(ThermError::sensor_construct(
                &name,
                format!("unsupported sensor type '{}'", sensor.sensor_type),
            ));
        }

        let device = description.device(&sensor.device).ok_or_else(|| {
            ThermError::sensor_construct(&name, format!("unknown device '{}'", sensor.device))
        })?;

        debug!(sensor = %name, bus = device.bus, address = device.address, "Bound LM75 sensor");

        Ok(Box::new(Lm75Sensor {
            name,
            bus_number: device.bus,
            address: device.address,
            bus: Arc::clone(&self.bus),
        }))
    }
}

pub struct Lm75Sensor {
    name: String,
    bus_number: u32,
    address: u16,
    bus: SharedBus,
}

impl SensorHandle for Lm75Sensor {
    fn read_operable(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn read_temperature(&mut self) -> Result<i32> {
        let mut raw = [0u8; 2];
        self.bus
            .lock()
            .read_register(self.bus_number, self.address, lm75::TEMP_REGISTER, &mut raw)
            .map_err(|source| ThermError::I2c {
                bus: self.bus_number,
                address: self.address,
                source,
            })?;
        let millidegrees = decode_lm75(raw);
        trace!(sensor = %self.name, millidegrees, "LM75 reading");
        Ok(millidegrees)
    }

    fn read_threshold(&mut self, _kind: ThresholdKind) -> Option<f32> {
        None
    }
}
