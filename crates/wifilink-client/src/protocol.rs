//! Command/response protocol
//!
//! One exchange at a time: a command is rendered into the link's command
//! buffer and transmitted, then frames are pulled until one carries the
//! expected token. That frame moves into the Last-Frame slot and stays there
//! until released; a second wait while it is held is refused.
//!
//! ```ignore
//! let mut session = link.lock().await?;
//! session.send_command("AT+CIPSTATUS").await?;
//! let mut frame = session.wait_for(b"+CIPSTATUS:", timeout).await?;
//! let id = frame.number("CIPSTATUS", Release::Auto)?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info};
use wifilink_core::{parser, token, FieldKind, Frame, LINE_TERMINATOR};
use wifilink_transport::{FrameInbox, FrameTransport, Peripheral, StatsSnapshot, TransportError};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::init::{ConnectionHandle, InitState};
use crate::tcp::{TcpSession, TcpState};

/// Lower bound for any transmission
pub const MIN_TRANSMIT_TIMEOUT_MS: u64 = 100;

/// Upper bound for any transmission
pub const MAX_TRANSMIT_TIMEOUT_MS: u64 = 5000;

/// Time allowed for `len` bytes at `baud`: 1.5x the wire time of 10 bits per
/// byte, clamped to [100 ms, 5000 ms].
pub fn transmit_timeout(len: usize, baud: u32) -> Duration {
    if baud == 0 {
        return Duration::from_millis(MAX_TRANSMIT_TIMEOUT_MS);
    }
    let per_bit_us = 1_000_000 / u64::from(baud);
    let transfer_us = (len as u64).saturating_mul(10).saturating_mul(per_bit_us);
    let ms = transfer_us.saturating_mul(3) / 2 / 1000;
    Duration::from_millis(ms.clamp(MIN_TRANSMIT_TIMEOUT_MS, MAX_TRANSMIT_TIMEOUT_MS))
}

/// What a frame accessor does with the slot after reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Release {
    /// Leave the frame held for further reads
    #[default]
    Keep,
    /// Release the frame once this read is done, whether it matched or not
    Auto,
}

/// Last-Frame slot
pub(crate) struct FrameSlot {
    frame: Frame,
    held: bool,
    mirror: Arc<AtomicBool>,
}

impl FrameSlot {
    fn new(mirror: Arc<AtomicBool>) -> Self {
        Self {
            frame: Frame::empty(),
            held: false,
            mirror,
        }
    }

    fn store(&mut self, frame: Frame) {
        self.frame = frame;
        self.held = true;
        self.mirror.store(true, Ordering::Release);
    }

    fn release(&mut self) {
        if self.held {
            self.frame.clear();
            self.held = false;
            self.mirror.store(false, Ordering::Release);
        }
    }
}

/// Shared link context: transport, command buffer, frame slot and the
/// connection state built on top of them.
pub(crate) struct Link<P> {
    pub(crate) transport: FrameTransport<P>,
    command: Vec<u8>,
    slot: FrameSlot,
    pub(crate) config: ClientConfig,
    pub(crate) connection: ConnectionHandle,
    pub(crate) tcp: TcpSession,
    pub(crate) init_state: InitState,
}

/// Cloneable handle to one module link
pub struct LinkHandle<P> {
    inner: Arc<Mutex<Link<P>>>,
    held: Arc<AtomicBool>,
    lock_timeout: Duration,
}

impl<P> Clone for LinkHandle<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            held: self.held.clone(),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<P: Peripheral> LinkHandle<P> {
    /// Wrap `peripheral` and arm frame capture.
    ///
    /// `inbox` must come from the same [`irq_channel`](wifilink_transport::irq_channel)
    /// whose [`IrqHandle`](wifilink_transport::IrqHandle) the peripheral signals.
    pub fn new(peripheral: P, inbox: FrameInbox, config: ClientConfig) -> Result<Self> {
        let transport = FrameTransport::new(peripheral, inbox);
        transport.start()?;

        let held = Arc::new(AtomicBool::new(false));
        let lock_timeout = config.link.lock_timeout();
        let link = Link {
            transport,
            command: Vec::with_capacity(config.link.command_capacity),
            slot: FrameSlot::new(held.clone()),
            connection: ConnectionHandle::new(&config.wifi),
            tcp: TcpSession::default(),
            init_state: InitState::CheckLink,
            config,
        };

        info!(
            tag = "ESP",
            "link ready ({} baud, {} byte command buffer)",
            link.config.link.baud_rate,
            link.config.link.command_capacity
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(link)),
            held,
            lock_timeout,
        })
    }

    /// Acquire the send lock, waiting at most the configured lock timeout
    pub async fn lock(&self) -> Result<Session<P>> {
        let link = tokio::time::timeout(self.lock_timeout, self.inner.clone().lock_owned())
            .await
            .map_err(|_| ClientError::LockTimeout)?;
        Ok(Session { link })
    }

    /// Whether a delivered frame is still waiting to be released.
    /// Does not take the lock.
    pub fn frame_pending(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Lock, send one command, unlock
    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.lock().await?.send_command(command).await
    }
}

/// Exclusive use of the link for as long as it lives.
///
/// Every operation composed on one `Session` runs under a single acquisition
/// of the send lock.
pub struct Session<P> {
    pub(crate) link: OwnedMutexGuard<Link<P>>,
}

impl<P: Peripheral> Session<P> {
    /// Copy `command` into the command buffer, append CR LF and transmit it.
    ///
    /// Nothing is sent when the command does not fit the command buffer
    /// with room for the terminator.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        let len = self.render(command)?;
        let timeout = transmit_timeout(len, self.link.config.link.baud_rate);

        let link = &mut *self.link;
        let text = &link.command[..len - LINE_TERMINATOR.len()];
        debug!(tag = "ESP", "-> {}", String::from_utf8_lossy(text));

        link.transport.transmit(&link.command[..len], timeout).await?;
        Ok(())
    }

    /// Transmit raw payload bytes, no terminator added
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let timeout = transmit_timeout(data.len(), self.link.config.link.baud_rate);
        self.link.transport.transmit(data, timeout).await?;
        Ok(())
    }

    fn render(&mut self, command: &str) -> Result<usize> {
        let link = &mut *self.link;
        let capacity = link.config.link.command_capacity;
        let len = command.len();
        link.command.clear();

        if len == 0 {
            return Err(ClientError::InvalidArgument("empty command"));
        }
        if len >= capacity.saturating_sub(LINE_TERMINATOR.len()) {
            return Err(ClientError::CommandTooLong { len, capacity });
        }

        link.command.extend_from_slice(command.as_bytes());
        link.command.extend_from_slice(LINE_TERMINATOR);
        Ok(len + LINE_TERMINATOR.len())
    }

    /// Wait for a frame containing `expected`.
    ///
    /// Frames without it are discarded. Fails with
    /// [`ClientError::FrameHeld`] before touching the transport when the
    /// previous frame has not been released.
    pub async fn wait_for(&mut self, expected: &[u8], timeout: Duration) -> Result<FrameRef<'_>> {
        let (_, frame) = self.wait_for_any(&[expected], timeout).await?;
        Ok(frame)
    }

    /// Like [`wait_for`](Self::wait_for) with several candidate tokens.
    ///
    /// Returns the index of the first needle, in the order given, that the
    /// matching frame contains. Put failure tokens first when a success
    /// token can appear inside them.
    pub async fn wait_for_any(
        &mut self,
        needles: &[&[u8]],
        timeout: Duration,
    ) -> Result<(usize, FrameRef<'_>)> {
        if self.link.slot.held {
            return Err(ClientError::FrameHeld);
        }
        if needles.is_empty() {
            return Err(ClientError::InvalidArgument("no expected token"));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = match self.link.transport.next_frame(remaining).await {
                Ok(frame) => frame,
                Err(TransportError::Timeout) => {
                    return Err(ClientError::NoResponse {
                        expected: describe(needles),
                    })
                }
                Err(e) => return Err(e.into()),
            };

            self.note_link_closed(&frame);

            match needles.iter().position(|needle| frame.contains(needle)) {
                Some(index) => {
                    debug!(tag = "ESP", "<- {:?}", frame);
                    self.link.slot.store(frame);
                    return Ok((index, FrameRef { slot: &mut self.link.slot }));
                }
                None => debug!(tag = "ESP", "discarding unmatched frame {:?}", frame),
            }
        }
    }

    /// Drop the TCP session when the module reports the open link closed
    fn note_link_closed(&mut self, frame: &Frame) {
        if self.link.tcp.state == TcpState::Connected && reports_closed(frame.as_bytes()) {
            info!(
                tag = "TCP",
                "{}:{} closed by peer",
                self.link.tcp.host,
                self.link.tcp.port
            );
            self.link.tcp = TcpSession::default();
        }
    }

    /// The frame left in the slot by the last successful wait
    pub(crate) fn held_frame(&mut self) -> FrameRef<'_> {
        FrameRef {
            slot: &mut self.link.slot,
        }
    }

    /// Release the held frame, if any
    pub fn release_frame(&mut self) {
        self.link.slot.release();
    }

    /// Send `command`, wait for `expected`, release the frame
    pub async fn expect(
        &mut self,
        command: &str,
        expected: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        if self.link.slot.held {
            return Err(ClientError::FrameHeld);
        }
        self.send_command(command).await?;
        self.wait_for(expected, timeout).await?.release();
        Ok(())
    }

    pub fn frame_pending(&self) -> bool {
        self.link.slot.held
    }

    pub fn config(&self) -> &ClientConfig {
        &self.link.config
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.link.connection
    }

    pub fn tcp(&self) -> &TcpSession {
        &self.link.tcp
    }

    pub fn init_state(&self) -> InitState {
        self.link.init_state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.link.transport.stats()
    }
}

fn describe(needles: &[&[u8]]) -> String {
    needles
        .iter()
        .map(|needle| String::from_utf8_lossy(needle).into_owned())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// `CLOSED` on a line of its own, or `<id>,CLOSED` in multi-link mode
fn reports_closed(bytes: &[u8]) -> bool {
    bytes.split(|&b| b == b'\n').any(|line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match line.strip_suffix(token::CLOSED) {
            Some([]) => true,
            Some([id @ .., b',']) => !id.is_empty() && id.iter().all(u8::is_ascii_digit),
            _ => false,
        }
    })
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Borrow of the frame in the Last-Frame slot.
///
/// Dropping a `FrameRef` does not release the frame; call
/// [`release`](Self::release) or read with [`Release::Auto`]. After an
/// automatic release the frame is empty and further reads find nothing.
pub struct FrameRef<'a> {
    slot: &'a mut FrameSlot,
}

impl FrameRef<'_> {
    pub fn bytes(&self) -> &[u8] {
        self.slot.frame.as_bytes()
    }

    pub fn contains(&self, needle: &[u8]) -> bool {
        self.slot.frame.contains(needle)
    }

    /// Contents of the `index`-th quoted field (1-based)
    pub fn quoted(&mut self, index: usize, release: Release) -> Result<String> {
        let bytes = self.bytes();
        let value = parser::quoted(bytes, index).map(|span| text(&bytes[span]));
        self.finish(release);
        Ok(value?)
    }

    /// Decimal value after `+<key>:`
    pub fn number(&mut self, key: &str, release: Release) -> Result<u32> {
        let value = parser::number_after(self.bytes(), key);
        self.finish(release);
        Ok(value?)
    }

    /// The `index`-th field of `kind`
    pub fn field(&mut self, kind: FieldKind, index: usize, release: Release) -> Result<String> {
        let bytes = self.bytes();
        let value = parser::field(bytes, kind, index).map(|span| text(&bytes[span]));
        self.finish(release);
        Ok(value?)
    }

    /// Quoted value following the literal `key`
    pub fn quoted_after_key(&mut self, key: &[u8], release: Release) -> Result<String> {
        let bytes = self.bytes();
        let value = parser::quoted_after_key(bytes, key).map(|span| text(&bytes[span]));
        self.finish(release);
        Ok(value?)
    }

    /// Copy the quoted value following `key` into `out`, truncating.
    /// Returns the number of bytes copied.
    pub fn string_after_key(
        &mut self,
        key: &[u8],
        out: &mut [u8],
        release: Release,
    ) -> Result<usize> {
        let value = parser::string_after_key(self.bytes(), key, out);
        self.finish(release);
        Ok(value?)
    }

    /// Mark the slot consumed. Releasing twice is harmless.
    pub fn release(self) {
        self.slot.release();
    }

    fn finish(&mut self, release: Release) {
        if release == Release::Auto {
            self.slot.release();
        }
    }
}

impl fmt::Debug for FrameRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FrameRef").field(&self.slot.frame).finish()
    }
}
