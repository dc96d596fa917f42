use pwmctl_core::error::TransportError;

///Converts an rppal I2C error into the transport error carried by `DriverError`.
///
/// Io errors keep their raw OS error number so callers can tell e.g. a missing device (ENXIO) from a permission problem (EACCES).
pub fn transport_error(err: rppal::i2c::Error) -> TransportError {
    match err {
        rppal::i2c::Error::Io(io) => TransportError::from(io),
        other => TransportError::message(format!("RpiI2cError - Cause: {}", other)),
    }
}
