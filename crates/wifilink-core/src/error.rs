//! Error types for WifiLink parsing and request building

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested field, key or boundary is not present in the buffer
    #[error("not found")]
    NotFound,

    /// Caller supplied an empty, zero or out-of-range argument
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Destination buffer cannot hold the rendered output
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// A fixed-capacity field would overflow
    #[error("{field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Request method is not supported by the builder
    #[error("unsupported method: {0}")]
    UnsupportedMethod(&'static str),
}
