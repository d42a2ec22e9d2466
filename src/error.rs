//! Error taxonomy for modem operations

use core::fmt;

use crate::modem::traits::TransportError;

/// Errors surfaced by the AT engine, the registry and the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// Platform transport failed to write, read or drive the reset line
    Transport(TransportError),
    /// No completion token observed within the response window
    Timeout,
    /// Modem answered with an explicit error token
    Protocol,
    /// A GET response or downlink did not match the expected shape
    Parse,
    /// Invalid registry instance, function or command form
    InvalidParam,
    /// Value does not fit in the command or receive buffer
    Overflow,
}

impl From<TransportError> for ModemError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Timeout => f.write_str("no completion token before timeout"),
            Self::Protocol => f.write_str("modem returned an error token"),
            Self::Parse => f.write_str("malformed response"),
            Self::InvalidParam => f.write_str("invalid parameter"),
            Self::Overflow => f.write_str("buffer overflow"),
        }
    }
}
