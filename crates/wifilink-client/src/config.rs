//! Client configuration
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON file only
//! needs the fields it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Longest SSID the module accepts
pub const SSID_MAX_LEN: usize = 32;

/// Longest WPA passphrase the module accepts
pub const PASSPHRASE_MAX_LEN: usize = 64;

/// Command link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// UART baud rate, used for transmit timeouts
    pub baud_rate: u32,
    /// How long to wait for the send lock
    pub lock_timeout_ms: u64,
    /// Frames buffered between interrupt and task side
    pub queue_depth: usize,
    /// Command buffer size including the line terminator
    pub command_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            lock_timeout_ms: 500,
            queue_depth: 4,
            command_capacity: 256,
        }
    }
}

impl LinkConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_lock_timeout(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Operating mode set with `AT+CWMODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiMode {
    #[default]
    Station,
    SoftAp,
    StationSoftAp,
}

impl WifiMode {
    /// Numeric argument of `AT+CWMODE`
    pub fn code(&self) -> u8 {
        match self {
            WifiMode::Station => 1,
            WifiMode::SoftAp => 2,
            WifiMode::StationSoftAp => 3,
        }
    }
}

/// Access point credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub passphrase: String,
    pub mode: WifiMode,
}

impl WifiConfig {
    pub fn new(ssid: &str, passphrase: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
            mode: WifiMode::Station,
        }
    }

    pub fn with_mode(mut self, mode: WifiMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(ClientError::InvalidArgument("empty ssid"));
        }
        if self.ssid.len() > SSID_MAX_LEN {
            return Err(ClientError::InvalidArgument("ssid longer than 32 bytes"));
        }
        if self.passphrase.len() > PASSPHRASE_MAX_LEN {
            return Err(ClientError::InvalidArgument("passphrase longer than 64 bytes"));
        }
        Ok(())
    }
}

/// Initialization state machine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Consecutive failures of one state before a full reset
    pub retry_ceiling: u32,
    /// Pause between attempts
    pub backoff_ms: u64,
    pub check_timeout_ms: u64,
    pub mode_timeout_ms: u64,
    pub associate_timeout_ms: u64,
    pub address_timeout_ms: u64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            backoff_ms: 1000,
            check_timeout_ms: 500,
            mode_timeout_ms: 2000,
            associate_timeout_ms: 15000,
            address_timeout_ms: 2000,
        }
    }
}

impl InitConfig {
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    pub fn with_backoff(mut self, ms: u64) -> Self {
        self.backoff_ms = ms;
        self
    }
}

/// TCP session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Plain commands (`AT+CIPSTATUS`, `AT+CIPSEND`, ...)
    pub command_timeout_ms: u64,
    /// `AT+CIPSTART` until `CONNECT`
    pub connect_timeout_ms: u64,
    /// Payload sent until `+IPD`
    pub response_timeout_ms: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 500,
            connect_timeout_ms: 5000,
            response_timeout_ms: 5000,
        }
    }
}

impl TcpConfig {
    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_response_timeout(mut self, ms: u64) -> Self {
        self.response_timeout_ms = ms;
        self
    }
}

/// Everything a [`LinkHandle`](crate::LinkHandle) needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub link: LinkConfig,
    pub wifi: WifiConfig,
    pub init: InitConfig,
    pub tcp: TcpConfig,
}

impl ClientConfig {
    pub fn new(wifi: WifiConfig) -> Self {
        Self {
            wifi,
            ..Default::default()
        }
    }

    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    pub fn with_init(mut self, init: InitConfig) -> Self {
        self.init = init;
        self
    }

    pub fn with_tcp(mut self, tcp: TcpConfig) -> Self {
        self.tcp = tcp;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
