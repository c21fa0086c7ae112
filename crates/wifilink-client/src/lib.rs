//! WifiLink Client Library
//!
//! Async driver for AT-command Wi-Fi co-processors (ESP8266 class).
//!
//! # Example
//!
//! ```ignore
//! use wifilink_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::new(WifiConfig::new("lab", "secret"));
//!     let (irq, inbox) = irq_channel(config.link.queue_depth);
//!     let port = SerialPeripheral::open("/dev/ttyUSB0", SerialConfig::default(), irq)?;
//!     let link = LinkHandle::new(port, inbox, config)?;
//!
//!     let report = link.initialize().await?;
//!     println!("station address {:?}", report.station_ip);
//!
//!     let mut request = HttpRequest::get("example.com", "/")?;
//!     let body = link.http_get(&mut request).await?;
//!     println!("{}", String::from_utf8_lossy(&body));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod init;
pub mod protocol;
pub mod tcp;

pub use config::{ClientConfig, InitConfig, LinkConfig, TcpConfig, WifiConfig, WifiMode};
pub use error::{ClientError, Result};
pub use init::{ConnectionHandle, InitReport, InitState};
pub use protocol::{transmit_timeout, FrameRef, LinkHandle, Release, Session};
pub use tcp::{ConnectionKind, TcpSession, TcpState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{ClientConfig, WifiConfig, WifiMode};
    pub use crate::error::{ClientError, Result};
    pub use crate::init::{InitReport, InitState};
    pub use crate::protocol::{FrameRef, LinkHandle, Release, Session};
    pub use crate::tcp::{ConnectionKind, TcpState};
    pub use wifilink_core::{token, HttpRequest};
    pub use wifilink_transport::{irq_channel, Peripheral, SerialConfig, SerialPeripheral};
}
