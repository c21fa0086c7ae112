//! Interrupt-side signal handling
//!
//! [`IrqHandle`] is what the peripheral calls from its completion context.
//! Both handlers only copy bytes, post to a bounded queue or wake a single
//! waiter: no blocking, no locks, no logging. Anything worth reporting is
//! counted in [`LinkStats`] and picked up by the task side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use wifilink_core::Frame;

/// Counters shared between interrupt and task side
#[derive(Debug, Default)]
pub struct LinkStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_truncated: AtomicU64,
    sends_completed: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frame boundaries seen
    pub frames_captured: u64,
    /// Frames lost because the delivery queue was full
    pub frames_dropped: u64,
    /// Bytes cut off frames longer than the frame capacity
    pub bytes_truncated: u64,
    /// Completion signals received
    pub sends_completed: u64,
}

impl LinkStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            bytes_truncated: self.bytes_truncated.load(Ordering::Relaxed),
            sends_completed: self.sends_completed.load(Ordering::Relaxed),
        }
    }
}

/// Handle given to the peripheral for upward signals
#[derive(Clone, Debug)]
pub struct IrqHandle {
    frames: mpsc::Sender<Frame>,
    tx_done: Arc<Notify>,
    stats: Arc<LinkStats>,
}

impl IrqHandle {
    /// Idle-line event: `staging[..len]` holds one complete frame.
    ///
    /// The bytes are copied into a new frame and the staging region is
    /// zeroed so capture can continue into it. When the delivery queue is
    /// full the new frame is dropped and counted.
    pub fn on_frame_boundary(&self, staging: &mut [u8], len: usize) {
        let len = len.min(staging.len());
        let (frame, truncated) = Frame::from_slice(&staging[..len]);
        staging[..len].fill(0);

        self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
        if truncated > 0 {
            self.stats
                .bytes_truncated
                .fetch_add(truncated as u64, Ordering::Relaxed);
        }

        if self.frames.try_send(frame).is_err() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Transmission-complete event; wakes the one task waiting in
    /// [`FrameTransport::transmit`](crate::FrameTransport::transmit).
    pub fn on_send_complete(&self) {
        self.stats.sends_completed.fetch_add(1, Ordering::Relaxed);
        self.tx_done.notify_one();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Task-side end of the interrupt channel
#[derive(Debug)]
pub struct FrameInbox {
    pub(crate) frames: mpsc::Receiver<Frame>,
    pub(crate) tx_done: Arc<Notify>,
    pub(crate) stats: Arc<LinkStats>,
}

/// Create the interrupt hand-off with a delivery queue of `depth` frames
pub fn irq_channel(depth: usize) -> (IrqHandle, FrameInbox) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    let tx_done = Arc::new(Notify::new());
    let stats = Arc::new(LinkStats::default());

    let handle = IrqHandle {
        frames: tx,
        tx_done: tx_done.clone(),
        stats: stats.clone(),
    };
    let inbox = FrameInbox {
        frames: rx,
        tx_done,
        stats,
    };

    (handle, inbox)
}
