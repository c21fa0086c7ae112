//! WifiLink Transport Layer
//!
//! Moves bytes between the Wi-Fi module and the task side:
//! - [`Peripheral`]: the UART/DMA seam (register-level, never blocks)
//! - [`IrqHandle`]: interrupt-side frame hand-off and send completion
//! - [`FrameTransport`]: task-side frame pull and completion-notified transmit
//! - Serial (optional, for a module on a host serial port)

pub mod error;
pub mod irq;
pub mod traits;
pub mod transport;

pub mod serial;

pub use error::{Result, TransportError};
pub use irq::{irq_channel, FrameInbox, IrqHandle, LinkStats, StatsSnapshot};
pub use serial::{SerialConfig, SerialPeripheral};
pub use traits::Peripheral;
pub use transport::FrameTransport;
