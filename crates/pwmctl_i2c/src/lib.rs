//!This library owns the connection to an I2C bus. It is a thin layer over the rppal library.
//!
//! A `BusDevice` holds at most one open bus and one selected slave address and offers single register byte reads and writes. It knows nothing about the chip on the other end; chip drivers in `pwmctl_devices` are built on top of it.

//conversion from rppal errors into transport errors
pub mod error;

//the bus seam: bus providers, bus handles and bus paths
pub mod bus;

//single bus connection with register access
pub mod device;

//register file simulator for tests
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use bus::{available_buses, bus_index, bus_path, BusProvider, I2cBus, LinuxI2c};
pub use device::{BusDevice, SlaveAddress};
pub use rppal;
