//! Client error types

use thiserror::Error;

use crate::init::InitState;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("send lock not acquired in time")]
    LockTimeout,

    #[error("transport error: {0}")]
    Transport(#[from] wifilink_transport::TransportError),

    #[error("parse error: {0}")]
    Parse(#[from] wifilink_core::Error),

    #[error("no response containing {expected}")]
    NoResponse { expected: String },

    #[error("previous frame not released")]
    FrameHeld,

    #[error("command of {len} bytes exceeds {capacity} byte buffer")]
    CommandTooLong { len: usize, capacity: usize },

    #[error("connection already open")]
    Busy,

    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("not associated with {0}")]
    NotAssociated(String),

    #[error("initialization failed in {state}")]
    InitFailed { state: InitState },

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the operation may be retried without re-initializing
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::InitFailed { .. } => false,
            ClientError::Transport(e) => e.is_recoverable(),
            _ => true,
        }
    }
}
