//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("link closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("transmitter busy")]
    Busy,

    #[error("timeout")]
    Timeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the caller may retry the operation
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TransportError::ConnectionClosed)
    }
}
