use std::time::Duration;

use thiserror::Error;

pub mod codec;
pub mod command;
pub mod response;

#[cfg(test)]
pub(crate) mod fake;

pub type Result<T> = std::result::Result<T, ProtoError>;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Serial port is not open")]
    NotConnected,

    #[error("Serial port is already open")]
    AlreadyOpen,

    #[error("No response within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Device closed the connection")]
    Abort,

    #[error("Device lost after {0} consecutive failures")]
    DeviceLost(u32),
}

impl ProtoError {
    /// Errors after which the serial handle can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Serial(_) | Self::Io(_) | Self::Abort)
    }
}
