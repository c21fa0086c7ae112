//! Peripheral seam

use std::sync::Arc;

use crate::error::Result;

/// The UART/DMA block that talks to the Wi-Fi module.
///
/// All methods are register-level operations and must return promptly; the
/// peripheral reports progress upward only through an
/// [`IrqHandle`](crate::IrqHandle): `on_frame_boundary` when the receive line
/// goes idle and `on_send_complete` when a transmission has drained.
pub trait Peripheral: Send + Sync {
    /// Start continuous capture into a staging buffer of `capacity` bytes.
    ///
    /// Capture stays armed across frame boundaries until the peripheral is
    /// reset.
    fn start_capture(&self, capacity: usize) -> Result<()>;

    /// Hand `data` to the transmitter. Fails immediately when the
    /// transmitter is busy or the request cannot be issued.
    fn begin_send(&self, data: &[u8]) -> Result<()>;

    /// Abort an in-flight transmission, if any
    fn abort_send(&self);

    /// Full restart of the module
    fn hardware_reset(&self) -> Result<()>;
}

impl<P: Peripheral + ?Sized> Peripheral for Arc<P> {
    fn start_capture(&self, capacity: usize) -> Result<()> {
        (**self).start_capture(capacity)
    }

    fn begin_send(&self, data: &[u8]) -> Result<()> {
        (**self).begin_send(data)
    }

    fn abort_send(&self) {
        (**self).abort_send()
    }

    fn hardware_reset(&self) -> Result<()> {
        (**self).hardware_reset()
    }
}
