//! Task-side frame transport
//!
//! Owns the peripheral and the receiving end of the interrupt hand-off.
//! Inbound frames are pulled in capture order; outbound buffers are handed
//! to the peripheral and the caller sleeps until the completion signal or
//! the timeout, whichever comes first.

use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};
use wifilink_core::{Frame, FRAME_CAPACITY};

use crate::error::{Result, TransportError};
use crate::irq::{FrameInbox, StatsSnapshot};
use crate::traits::Peripheral;

pub struct FrameTransport<P> {
    peripheral: P,
    inbox: FrameInbox,
    delivered: u64,
    seen_dropped: u64,
    seen_truncated: u64,
}

impl<P: Peripheral> FrameTransport<P> {
    pub fn new(peripheral: P, inbox: FrameInbox) -> Self {
        Self {
            peripheral,
            inbox,
            delivered: 0,
            seen_dropped: 0,
            seen_truncated: 0,
        }
    }

    /// Arm continuous capture
    pub fn start(&self) -> Result<()> {
        self.peripheral.start_capture(FRAME_CAPACITY)?;
        debug!(tag = "ESP", "capture armed ({} byte staging)", FRAME_CAPACITY);
        Ok(())
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Send `data` and wait for the completion signal.
    ///
    /// A peripheral that refuses the request fails immediately with
    /// [`TransportError::SendFailed`]. If the
    /// completion signal does not arrive within `timeout` the transmission
    /// is aborted and [`TransportError::Timeout`] returned.
    pub async fn transmit(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        if data.is_empty() {
            return Err(TransportError::InvalidArgument("empty transmission"));
        }

        // A completion from an aborted transmission may still be stored.
        let _ = self.inbox.tx_done.notified().now_or_never();

        self.peripheral.begin_send(data).map_err(|e| match e {
            TransportError::SendFailed(_) => e,
            other => TransportError::SendFailed(other.to_string()),
        })?;

        match tokio::time::timeout(timeout, self.inbox.tx_done.notified()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    tag = "ESP",
                    "transmission of {} bytes timed out after {:?}, aborting",
                    data.len(),
                    timeout
                );
                self.peripheral.abort_send();
                Err(TransportError::Timeout)
            }
        }
    }

    /// Next frame in capture order, waiting up to `timeout`
    pub async fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let received = tokio::time::timeout(timeout, self.inbox.frames.recv()).await;
        self.report_losses();

        match received {
            Ok(Some(frame)) => {
                self.delivered += 1;
                Ok(frame)
            }
            Ok(None) => Err(TransportError::ConnectionClosed),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Frames captured but not yet pulled
    pub fn pending(&self) -> u64 {
        let stats = self.stats();
        stats
            .frames_captured
            .saturating_sub(stats.frames_dropped)
            .saturating_sub(self.delivered)
    }

    /// Discard every queued frame, returning how many were dropped
    pub fn flush(&mut self) -> usize {
        let mut flushed = 0;
        loop {
            match self.inbox.frames.try_recv() {
                Ok(_) => {
                    self.delivered += 1;
                    flushed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        flushed
    }

    /// Restart the module and drop anything captured before the reset
    pub fn reset_peripheral(&mut self) -> Result<()> {
        self.peripheral.abort_send();
        self.peripheral.hardware_reset()?;
        let flushed = self.flush();
        if flushed > 0 {
            debug!(tag = "ESP", "discarded {} frames on reset", flushed);
        }
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inbox.stats.snapshot()
    }

    fn report_losses(&mut self) {
        let stats = self.stats();

        if stats.frames_dropped > self.seen_dropped {
            warn!(
                tag = "ESP",
                "delivery queue overflow: {} frames dropped",
                stats.frames_dropped - self.seen_dropped
            );
            self.seen_dropped = stats.frames_dropped;
        }

        if stats.bytes_truncated > self.seen_truncated {
            warn!(
                tag = "ESP",
                "oversized frame: {} bytes truncated",
                stats.bytes_truncated - self.seen_truncated
            );
            self.seen_truncated = stats.bytes_truncated;
        }
    }
}
