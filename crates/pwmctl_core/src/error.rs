//!A mod for the error types
use std::fmt::{self, Debug, Display};

///Error reported by the operating system bus primitive underneath a bus device.
///
/// `code` is the raw OS error number when there is one (`errno` on Linux).
#[derive(Clone, PartialEq, Eq)]
pub struct TransportError {
    pub code: Option<i32>,
    pub message: String,
}

impl TransportError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        let code = err.raw_os_error();
        let text = err.to_string();
        //io::Error appends " (os error N)" which we already carry in `code`
        let message = match code {
            Some(code) => text
                .strip_suffix(&format!(" (os error {})", code))
                .unwrap_or(&text)
                .to_string(),
            None => text,
        };
        Self::new(code, message)
    }
}

impl std::error::Error for TransportError {}

impl Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "Error {}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportError({})", self)
    }
}

///The kind of register transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Read,
    Write { value: u8 },
}

impl Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Read => f.write_str("read"),
            Transfer::Write { value } => write!(f, "write {:#04x} to", value),
        }
    }
}

///Every fallible bus device and pwm driver operation reports one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to open I2C bus \"{path}\" ({source})")]
    BusUnavailable {
        path: String,
        source: TransportError,
    },

    #[error("Failed to open I2C device: I2C bus is not open")]
    BusNotOpen,

    #[error("Failed to open I2C device {address:#04x} ({source})")]
    AddressSelectFailed {
        address: u8,
        source: TransportError,
    },

    #[error("I2C device is not connected")]
    NotConnected,

    #[error("Failed to {transfer} register {register:#04x} on I2C device {address:#04x} ({source})")]
    TransferFailed {
        transfer: Transfer,
        register: u8,
        address: u8,
        source: TransportError,
    },

    #[error("Invalid PWM channel {0}, expected 0 to 15")]
    InvalidChannel(i64),

    #[error("Failed to close I2C bus \"{path}\" ({source})")]
    CloseFailed {
        path: String,
        source: TransportError,
    },
}

impl DriverError {
    ///The underlying transport error, for the kinds that carry one.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::BusUnavailable { source, .. }
            | Self::AddressSelectFailed { source, .. }
            | Self::TransferFailed { source, .. }
            | Self::CloseFailed { source, .. } => Some(source),
            Self::BusNotOpen | Self::NotConnected | Self::InvalidChannel(_) => None,
        }
    }
}

///Everything wrong with a configuration, or the reason a device could not be built from it.
///
/// Validation keeps going after the first problem, so a config with several mistakes reports them all at once.
pub enum ConfigError {
    Message(String),
    Messages(Vec<String>),
}

impl ConfigError {
    pub fn from_string(msg: String) -> Self {
        ConfigError::Message(msg)
    }

    ///Flattens several errors into one list, in order.
    pub fn from_errs(errs: Vec<ConfigError>) -> Self {
        Self::Messages(errs.into_iter().flat_map(ConfigError::into_messages).collect())
    }

    ///Prefixes every message with `context`, e.g. the name of the output it is about.
    pub fn context(self, context: &str) -> Self {
        match self {
            Self::Message(msg) => Self::Message(format!("{}: {}", context, msg)),
            Self::Messages(msgs) => Self::Messages(
                msgs.into_iter()
                    .map(|msg| format!("{}: {}", context, msg))
                    .collect(),
            ),
        }
    }

    pub fn into_messages(self) -> Vec<String> {
        match self {
            Self::Message(msg) => vec![msg],
            Self::Messages(msgs) => msgs,
        }
    }
}

impl From<DriverError> for ConfigError {
    fn from(err: DriverError) -> Self {
        ConfigError::Message(err.to_string())
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            Self::Messages(msgs) => {
                for (i, msg) in msgs.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "- {}", msg)?;
                }
                Ok(())
            }
        }
    }
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(_) => write!(f, "ConfigError: {}", self),
            Self::Messages(msgs) => write!(f, "ConfigError ({} problems):\n{}", msgs.len(), self),
        }
    }
}
