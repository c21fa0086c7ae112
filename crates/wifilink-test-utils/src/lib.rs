//! Test helpers for WifiLink
//!
//! This crate provides:
//! - [`SimulatedPeer`]: a [`Peripheral`] that answers like a Wi-Fi module
//! - [`Script`]: command-prefix to response-frame tables
//! - Send stalls and refusals for exercising timeout paths

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use wifilink_transport::{IrqHandle, Peripheral, Result, TransportError};

/// Station address handed out by [`Script::always_ok`]
pub const SIMULATED_STATION_IP: &str = "192.168.1.42";

/// Response table keyed by the start of what was sent.
///
/// The longest matching prefix wins, so `"AT"` can act as a catch-all for
/// plain commands while `"AT+CIFSR"` gets its own answer.
#[derive(Debug, Clone, Default)]
pub struct Script {
    rules: Vec<(Vec<u8>, Vec<Vec<u8>>)>,
    fallback: Vec<Vec<u8>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer anything starting with `prefix` with `frames`, one frame each
    pub fn on(mut self, prefix: &str, frames: &[&str]) -> Self {
        self.rules.push((
            prefix.as_bytes().to_vec(),
            frames.iter().map(|f| f.as_bytes().to_vec()).collect(),
        ));
        self
    }

    /// Answer for anything no rule matches
    pub fn otherwise(mut self, frames: &[&str]) -> Self {
        self.fallback = frames.iter().map(|f| f.as_bytes().to_vec()).collect();
        self
    }

    /// A module that accepts every command and has an address
    pub fn always_ok() -> Self {
        let cifsr = format!(
            "+CIFSR:STAIP,\"{}\"\r\n+CIFSR:STAMAC,\"5c:cf:7f:01:02:03\"\r\n\r\nOK\r\n",
            SIMULATED_STATION_IP
        );
        Self::new()
            .on("AT+CIFSR", &[&cifsr])
            .otherwise(&["OK\r\n"])
    }

    pub fn respond(&self, sent: &[u8]) -> Vec<Vec<u8>> {
        self.rules
            .iter()
            .filter(|(prefix, _)| sent.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, frames)| frames.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// In-memory module.
///
/// Every accepted send completes at once and the scripted answer is
/// delivered as frames before `begin_send` returns.
pub struct SimulatedPeer {
    irq: IrqHandle,
    script: Mutex<Script>,
    sent: Mutex<Vec<Vec<u8>>>,
    resets: AtomicU32,
    aborts: AtomicU32,
    captures: AtomicU32,
    stall_sends: AtomicBool,
    refuse_sends: AtomicBool,
}

impl SimulatedPeer {
    pub fn new(irq: IrqHandle, script: Script) -> Arc<Self> {
        Arc::new(Self {
            irq,
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
            resets: AtomicU32::new(0),
            aborts: AtomicU32::new(0),
            captures: AtomicU32::new(0),
            stall_sends: AtomicBool::new(false),
            refuse_sends: AtomicBool::new(false),
        })
    }

    /// A module that completes sends but never answers
    pub fn silent(irq: IrqHandle) -> Arc<Self> {
        Self::new(irq, Script::new())
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    /// Accept sends but never signal completion
    pub fn stall_sends(&self, stall: bool) {
        self.stall_sends.store(stall, Ordering::SeqCst);
    }

    /// Reject sends outright
    pub fn refuse_sends(&self, refuse: bool) {
        self.refuse_sends.store(refuse, Ordering::SeqCst);
    }

    /// Deliver an unsolicited frame
    pub fn inject(&self, frame: &[u8]) {
        let mut staging = frame.to_vec();
        let len = staging.len();
        self.irq.on_frame_boundary(&mut staging, len);
    }

    /// Everything accepted for sending, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Sent buffers as text without the line terminator
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|s| String::from_utf8_lossy(s).trim_end_matches("\r\n").to_string())
            .collect()
    }

    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Peripheral for SimulatedPeer {
    fn start_capture(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(TransportError::InvalidArgument("zero capture capacity"));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn begin_send(&self, data: &[u8]) -> Result<()> {
        if self.refuse_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Busy);
        }
        self.sent.lock().push(data.to_vec());

        if self.stall_sends.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.irq.on_send_complete();

        let frames = self.script.lock().respond(data);
        for frame in frames {
            self.inject(&frame);
        }
        Ok(())
    }

    fn abort_send(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }

    fn hardware_reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
