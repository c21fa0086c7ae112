//! Serial port peripheral
//!
//! Drives a Wi-Fi module attached to a host serial port (USB-UART bridge),
//! standing in for the UART/DMA block of the target board.
//!
//! Typical uses:
//! - Bench testing firmware logic against a real ESP8266
//! - Driving a module from a Linux SBC
//!
//! The reader task treats a gap of `idle_gap_ms` without new bytes as the
//! idle-line signal and reports the accumulated bytes as one frame.

#[cfg(feature = "serial")]
use std::sync::Arc;
#[cfg(feature = "serial")]
use std::time::Duration;

#[cfg(feature = "serial")]
use parking_lot::Mutex;
#[cfg(feature = "serial")]
use tracing::{error, info};

use crate::error::{Result, TransportError};
use crate::irq::IrqHandle;
use crate::traits::Peripheral;

/// Serial peripheral configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Quiet period that ends a frame (default: 5 ms)
    pub idle_gap_ms: u64,
    /// Read chunk size (default: 256)
    pub read_chunk: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            idle_gap_ms: 5,
            read_chunk: 256,
        }
    }
}

impl SerialConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_idle_gap(mut self, ms: u64) -> Self {
        self.idle_gap_ms = ms;
        self
    }
}

#[cfg(feature = "serial")]
type PortReader = tokio::io::ReadHalf<tokio_serial::SerialStream>;
#[cfg(feature = "serial")]
type PortWriter = tokio::io::WriteHalf<tokio_serial::SerialStream>;

/// Serial port peripheral
#[cfg(feature = "serial")]
pub struct SerialPeripheral {
    config: SerialConfig,
    irq: IrqHandle,
    reader: Mutex<Option<PortReader>>,
    writer: Arc<tokio::sync::Mutex<PortWriter>>,
    in_flight: Mutex<Option<tokio::task::JoinHandle<()>>>,
    capture: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[cfg(feature = "serial")]
impl SerialPeripheral {
    /// List available serial ports
    pub fn list_ports() -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports().map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to list ports: {}", e))
        })?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    /// Open `port_name`. Must be called from within a Tokio runtime.
    pub fn open(port_name: &str, config: SerialConfig, irq: IrqHandle) -> Result<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(port_name, config.baud_rate)
            .open_native_async()
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to open port: {}", e)))?;

        info!(
            tag = "ESP",
            "Serial port opened: {} @ {} baud", port_name, config.baud_rate
        );

        let (reader, writer) = tokio::io::split(port);

        Ok(Self {
            config,
            irq,
            reader: Mutex::new(Some(reader)),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            in_flight: Mutex::new(None),
            capture: Mutex::new(None),
        })
    }
}

#[cfg(feature = "serial")]
async fn run_capture(
    mut reader: PortReader,
    irq: IrqHandle,
    capacity: usize,
    idle_gap: Duration,
    read_chunk: usize,
) {
    use tokio::io::AsyncReadExt;

    let mut staging = vec![0u8; capacity];
    let mut filled = 0usize;
    let mut chunk = vec![0u8; read_chunk.max(1)];

    loop {
        match tokio::time::timeout(idle_gap, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                error!(tag = "ESP", "Serial port closed");
                break;
            }
            Ok(Ok(n)) => {
                let mut rest = &chunk[..n];
                while !rest.is_empty() {
                    let take = rest.len().min(capacity - filled);
                    staging[filled..filled + take].copy_from_slice(&rest[..take]);
                    filled += take;
                    rest = &rest[take..];
                    if filled == capacity {
                        irq.on_frame_boundary(&mut staging, filled);
                        filled = 0;
                    }
                }
            }
            Ok(Err(e)) => {
                error!(tag = "ESP", "Serial read error: {}", e);
                break;
            }
            Err(_) => {
                if filled > 0 {
                    irq.on_frame_boundary(&mut staging, filled);
                    filled = 0;
                }
            }
        }
    }
}

#[cfg(feature = "serial")]
impl Peripheral for SerialPeripheral {
    fn start_capture(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(TransportError::InvalidArgument("zero capture capacity"));
        }

        let Some(reader) = self.reader.lock().take() else {
            // Already capturing
            return Ok(());
        };

        let handle = tokio::spawn(run_capture(
            reader,
            self.irq.clone(),
            capacity,
            Duration::from_millis(self.config.idle_gap_ms.max(1)),
            self.config.read_chunk,
        ));
        *self.capture.lock() = Some(handle);
        Ok(())
    }

    fn begin_send(&self, data: &[u8]) -> Result<()> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(TransportError::Busy);
        }

        let data = data.to_vec();
        let writer = self.writer.clone();
        let irq = self.irq.clone();

        *in_flight = Some(tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;

            let mut port = writer.lock().await;
            let written = async {
                port.write_all(&data).await?;
                port.flush().await
            }
            .await;

            match written {
                Ok(()) => irq.on_send_complete(),
                Err(e) => error!(tag = "ESP", "Serial write failed: {}", e),
            }
        }));
        Ok(())
    }

    fn abort_send(&self) {
        if let Some(handle) = self.in_flight.lock().take() {
            handle.abort();
        }
    }

    fn hardware_reset(&self) -> Result<()> {
        // No reset line on a USB-UART bridge: ask the firmware to restart.
        self.abort_send();
        self.begin_send(b"AT+RST\r\n")
    }
}

#[cfg(feature = "serial")]
impl Drop for SerialPeripheral {
    fn drop(&mut self) {
        if let Some(handle) = self.capture.lock().take() {
            handle.abort();
        }
        self.abort_send();
    }
}

// Stub implementations when serial feature is disabled
#[cfg(not(feature = "serial"))]
pub struct SerialPeripheral;

#[cfg(not(feature = "serial"))]
impl SerialPeripheral {
    pub fn list_ports() -> Result<Vec<String>> {
        Err(TransportError::ConnectionFailed(
            "Serial feature not enabled. Compile with --features serial".into(),
        ))
    }

    pub fn open(_port_name: &str, _config: SerialConfig, _irq: IrqHandle) -> Result<Self> {
        Err(TransportError::ConnectionFailed(
            "Serial feature not enabled. Compile with --features serial".into(),
        ))
    }
}

#[cfg(not(feature = "serial"))]
impl Peripheral for SerialPeripheral {
    fn start_capture(&self, _capacity: usize) -> Result<()> {
        Err(TransportError::ConnectionClosed)
    }

    fn begin_send(&self, _data: &[u8]) -> Result<()> {
        Err(TransportError::ConnectionClosed)
    }

    fn abort_send(&self) {}

    fn hardware_reset(&self) -> Result<()> {
        Err(TransportError::ConnectionClosed)
    }
}
