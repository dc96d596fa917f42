use std::{ops::RangeInclusive, path::Path};

use pwmctl_core::error::TransportError;
use rppal::i2c::I2c;

use crate::error::transport_error;

pub const BUS_PATH_PREFIX: &str = "/dev/i2c-";

///An open handle to one I2C bus. Each call is exactly one bus transaction.
pub trait I2cBus {
    ///Target all following transactions at `address` (7 bit).
    fn set_slave_address(&mut self, address: u8) -> Result<(), TransportError>;

    ///SMBus "read byte data": one byte from `register` of the selected slave.
    fn read_byte_data(&mut self, register: u8) -> Result<u8, TransportError>;

    ///SMBus "write byte data": one byte to `register` of the selected slave.
    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<(), TransportError>;

    ///Release the handle.
    fn close(self) -> Result<(), TransportError>
    where
        Self: Sized;
}

///Something that can open a bus by path. `BusDevice` asks it for a fresh handle on every open.
pub trait BusProvider {
    type Bus: I2cBus;

    fn open(&self, path: &str) -> Result<Self::Bus, TransportError>;
}

///Opens the Linux i2c-dev character devices (`/dev/i2c-N`) through rppal.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxI2c;

impl BusProvider for LinuxI2c {
    type Bus = I2c;

    fn open(&self, path: &str) -> Result<I2c, TransportError> {
        let bus = bus_index(path).ok_or_else(|| {
            TransportError::message(format!(
                "expected a bus path like {}1 or a bus number",
                BUS_PATH_PREFIX
            ))
        })?;
        I2c::with_bus(bus).map_err(transport_error)
    }
}

impl I2cBus for I2c {
    fn set_slave_address(&mut self, address: u8) -> Result<(), TransportError> {
        I2c::set_slave_address(self, u16::from(address)).map_err(transport_error)
    }

    fn read_byte_data(&mut self, register: u8) -> Result<u8, TransportError> {
        self.smbus_read_byte(register).map_err(transport_error)
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        self.smbus_write_byte(register, value).map_err(transport_error)
    }

    fn close(self) -> Result<(), TransportError> {
        //the file descriptor is released when rppal's handle drops
        drop(self);
        Ok(())
    }
}

///`/dev/i2c-<bus>`
pub fn bus_path(bus: u8) -> String {
    format!("{}{}", BUS_PATH_PREFIX, bus)
}

///Bus number from either `/dev/i2c-<N>` or a bare `<N>`.
pub fn bus_index(path: &str) -> Option<u8> {
    path.strip_prefix(BUS_PATH_PREFIX)
        .unwrap_or(path)
        .parse()
        .ok()
}

///Bus paths in `buses` that exist on this machine.
pub fn available_buses(buses: RangeInclusive<u8>) -> Vec<String> {
    buses
        .map(bus_path)
        .filter(|path| Path::new(path).exists())
        .collect()
}
