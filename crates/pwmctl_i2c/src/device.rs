use pwmctl_core::error::{DriverError, Transfer, TransportError};
use tracing::{debug, warn};

use crate::bus::{BusProvider, I2cBus};

///A 7 bit I2C slave address.
///
/// Everything in this crate takes 7 bit addresses. Datasheets often print the 8 bit "write address" instead (the 7 bit address shifted left over the r/w bit, e.g. 0x80 for 0x40); convert those explicitly with `from_write_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlaveAddress(u8);

impl SlaveAddress {
    pub const MAX: u8 = 0x7F;

    pub fn new(address: u8) -> Option<Self> {
        (address <= Self::MAX).then_some(Self(address))
    }

    ///Drops the r/w bit of an 8 bit datasheet address.
    pub fn from_write_address(address: u8) -> Self {
        Self(address >> 1)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<SlaveAddress> for u8 {
    fn from(address: SlaveAddress) -> u8 {
        address.0
    }
}

struct BusHandle<B> {
    path: String,
    bus: B,
    address: Option<u8>,
}

///One bus connection with one selected slave, offering byte wide register access.
///
/// The handle is closed when it is dropped, so an error on any path can not leak an open bus.
pub struct BusDevice<P: BusProvider> {
    provider: P,
    handle: Option<BusHandle<P::Bus>>,
}

impl<P: BusProvider> BusDevice<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            handle: None,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    ///True only when a bus is open *and* a slave address is selected.
    pub fn is_connected(&self) -> bool {
        self.address().is_some()
    }

    pub fn bus_path(&self) -> Option<&str> {
        self.handle.as_ref().map(|handle| handle.path.as_str())
    }

    pub fn address(&self) -> Option<u8> {
        self.handle.as_ref().and_then(|handle| handle.address)
    }

    ///Opens the bus at `path`, closing whatever was open before. No slave is selected afterwards.
    pub fn open_bus(&mut self, path: &str) -> Result<(), DriverError> {
        self.close()?;
        let bus = self
            .provider
            .open(path)
            .map_err(|source| DriverError::BusUnavailable {
                path: path.to_string(),
                source,
            })?;
        debug!("opened I2C bus {}", path);
        self.handle = Some(BusHandle {
            path: path.to_string(),
            bus,
            address: None,
        });
        Ok(())
    }

    ///Targets all further register access at the 7 bit `address`.
    pub fn select_device(&mut self, address: u8) -> Result<(), DriverError> {
        let handle = self.handle.as_mut().ok_or(DriverError::BusNotOpen)?;
        handle.address = None;
        if SlaveAddress::new(address).is_none() {
            return Err(DriverError::AddressSelectFailed {
                address,
                source: TransportError::message(format!(
                    "{:#04x} is not a 7 bit address",
                    address
                )),
            });
        }
        handle
            .bus
            .set_slave_address(address)
            .map_err(|source| DriverError::AddressSelectFailed { address, source })?;
        handle.address = Some(address);
        debug!("selected I2C device {:#04x} on {}", address, handle.path);
        Ok(())
    }

    ///`open_bus` followed by `select_device`. If either step fails the handle is left closed.
    pub fn open_device(&mut self, path: &str, address: u8) -> Result<(), DriverError> {
        self.open_bus(path)?;
        if let Err(err) = self.select_device(address) {
            if let Err(close_err) = self.close() {
                warn!("error closing I2C bus after failed device select: {}", close_err);
            }
            return Err(err);
        }
        Ok(())
    }

    ///Releases the bus if one is open. Closing a closed device is a no-op.
    ///
    /// The device is closed afterwards even when the release itself reports an error.
    pub fn close(&mut self) -> Result<(), DriverError> {
        match self.handle.take() {
            Some(BusHandle { path, bus, .. }) => {
                bus.close()
                    .map_err(|source| DriverError::CloseFailed {
                        path: path.clone(),
                        source,
                    })?;
                debug!("closed I2C bus {}", path);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, DriverError> {
        let (bus, address) = self.selected()?;
        bus.read_byte_data(register)
            .map_err(|source| DriverError::TransferFailed {
                transfer: Transfer::Read,
                register,
                address,
                source,
            })
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError> {
        let (bus, address) = self.selected()?;
        bus.write_byte_data(register, value)
            .map_err(|source| DriverError::TransferFailed {
                transfer: Transfer::Write { value },
                register,
                address,
                source,
            })
    }

    fn selected(&mut self) -> Result<(&mut P::Bus, u8), DriverError> {
        match self.handle.as_mut() {
            Some(BusHandle {
                bus,
                address: Some(address),
                ..
            }) => Ok((bus, *address)),
            _ => Err(DriverError::NotConnected),
        }
    }
}

impl<P: BusProvider> Drop for BusDevice<P> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("error closing I2C bus on drop: {}", err);
        }
    }
}
