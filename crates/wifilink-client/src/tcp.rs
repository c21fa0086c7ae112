//! Single TCP connection over the module
//!
//! `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`,
//! with `Error` when the module stops answering mid-transition. Only one
//! connection exists at a time (`AT+CIPMUX=0`) in normal transfer mode
//! (`AT+CIPMODE=0`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wifilink_core::token;
use wifilink_transport::Peripheral;

use crate::error::{ClientError, Result};
use crate::protocol::{FrameRef, Release, Session};

/// Longest remote host name accepted by `AT+CIPSTART`
pub const HOST_MAX_LEN: usize = 64;

/// Largest payload for one `AT+CIPSEND`
pub const MAX_PAYLOAD_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TcpState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionKind {
    #[default]
    Tcp,
    Udp,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Tcp => "TCP",
            ConnectionKind::Udp => "UDP",
        }
    }
}

/// The one connection the module holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpSession {
    pub state: TcpState,
    pub link_id: Option<u32>,
    pub host: String,
    pub port: u16,
    /// Address the module resolved `host` to
    pub remote_ip: Option<String>,
}

impl TcpSession {
    pub fn is_connected(&self) -> bool {
        self.state == TcpState::Connected
    }
}

impl<P: Peripheral> Session<P> {
    fn tcp_command_timeout(&self) -> Duration {
        Duration::from_millis(self.link.config.tcp.command_timeout_ms)
    }

    /// Put the module into single-connection, normal-transfer mode.
    ///
    /// Fails with [`ClientError::NotAssociated`] unless the module is joined
    /// to the configured access point.
    pub async fn tcp_prepare(&mut self) -> Result<()> {
        let timeout = self.tcp_command_timeout();
        let wanted = self.link.config.wifi.ssid.clone();

        match self.query_association().await? {
            Some(ssid) if ssid == wanted => {}
            Some(ssid) => {
                warn!(tag = "TCP", "joined to {} instead of {}", ssid, wanted);
                return Err(ClientError::NotAssociated(wanted));
            }
            None => return Err(ClientError::NotAssociated(wanted)),
        }

        self.send_command("AT+CIPMUX?").await?;
        let mux = self
            .wait_for(b"+CIPMUX:", timeout)
            .await?
            .number("CIPMUX", Release::Auto)?;
        match mux {
            0 => {}
            1 => {
                debug!(tag = "TCP", "switching to single connection mode");
                self.expect("AT+CIPMUX=0", token::OK, timeout).await?;
            }
            other => return Err(ClientError::UnexpectedReply(format!("CIPMUX {}", other))),
        }

        self.send_command("AT+CIPMODE?").await?;
        let mode = self
            .wait_for(b"+CIPMODE:", timeout)
            .await?
            .number("CIPMODE", Release::Auto)?;
        match mode {
            0 => {}
            1 => {
                debug!(tag = "TCP", "switching to normal transfer mode");
                self.expect("AT+CIPMODE=0", token::OK, timeout).await?;
            }
            other => return Err(ClientError::UnexpectedReply(format!("CIPMODE {}", other))),
        }

        self.link.tcp = TcpSession::default();
        info!(tag = "TCP", "ready");
        Ok(())
    }

    /// Open a connection to `host:port`
    pub async fn tcp_connect(&mut self, host: &str, port: u16, kind: ConnectionKind) -> Result<()> {
        if host.is_empty() || host.len() > HOST_MAX_LEN {
            return Err(ClientError::InvalidArgument("host must be 1..=64 bytes"));
        }
        if port == 0 {
            return Err(ClientError::InvalidArgument("port 0"));
        }
        if self.link.tcp.is_connected() {
            return Err(ClientError::Busy);
        }

        self.link.tcp.state = TcpState::Connecting;
        info!(tag = "TCP", "connecting to {}:{} ({})", host, port, kind.as_str());

        let connect_timeout = Duration::from_millis(self.link.config.tcp.connect_timeout_ms);
        match self.start_connection(host, port, kind, connect_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                self.link.tcp.state = TcpState::Disconnected;
                warn!(tag = "TCP", "{}:{} refused", host, port);
                return Err(ClientError::ConnectFailed(format!("{}:{}", host, port)));
            }
            Err(e) => {
                self.link.tcp.state = TcpState::Error;
                warn!(tag = "TCP", "connect to {}:{} failed: {}", host, port, e);
                return Err(e);
            }
        }

        self.link.tcp.state = TcpState::Connected;
        self.link.tcp.host = host.to_string();
        self.link.tcp.port = port;

        match self.read_status().await {
            Ok((link_id, remote_ip)) => {
                info!(tag = "TCP", "connected to {} (link {})", remote_ip, link_id);
                self.link.tcp.link_id = Some(link_id);
                self.link.tcp.remote_ip = Some(remote_ip);
            }
            Err(e) => warn!(tag = "TCP", "connected, status unavailable: {}", e),
        }
        Ok(())
    }

    /// `true` on `CONNECT`, `false` on `ERROR`
    async fn start_connection(
        &mut self,
        host: &str,
        port: u16,
        kind: ConnectionKind,
        timeout: Duration,
    ) -> Result<bool> {
        self.send_command(&format!(
            "AT+CIPSTART=\"{}\",\"{}\",{}",
            kind.as_str(),
            host,
            port
        ))
        .await?;

        // "ALREADY CONNECTED ... ERROR" contains CONNECT
        let (index, frame) = self
            .wait_for_any(&[token::ERROR, token::CONNECT], timeout)
            .await?;
        frame.release();
        Ok(index == 1)
    }

    async fn read_status(&mut self) -> Result<(u32, String)> {
        let timeout = self.tcp_command_timeout();
        self.send_command("AT+CIPSTATUS").await?;

        let mut frame = self.wait_for(token::STATUS, timeout).await?;
        let link_id = match frame.number("CIPSTATUS", Release::Keep) {
            Ok(id) => id,
            Err(e) => {
                frame.release();
                return Err(e);
            }
        };
        let remote_ip = frame.quoted(2, Release::Auto)?;
        Ok((link_id, remote_ip))
    }

    /// Send `data` and wait for the module to report inbound data.
    ///
    /// The returned frame holds the `+IPD` data and must be released by the
    /// caller. An `ERROR` in place of the send prompt means the module has
    /// no open link; the session is dropped and [`ClientError::NotConnected`]
    /// returned.
    pub async fn tcp_send(&mut self, data: &[u8]) -> Result<FrameRef<'_>> {
        if !self.link.tcp.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if data.is_empty() || data.len() > MAX_PAYLOAD_LEN {
            return Err(ClientError::InvalidArgument("payload must be 1..=2048 bytes"));
        }

        let timeout = self.tcp_command_timeout();
        self.send_command(&format!("AT+CIPSEND={}", data.len()))
            .await?;
        let (index, frame) = self
            .wait_for_any(&[token::ERROR, token::SEND_PROMPT], timeout)
            .await?;
        frame.release();
        if index == 0 {
            // "link is not valid"
            warn!(tag = "TCP", "module has no open link, dropping session");
            self.link.tcp = TcpSession::default();
            return Err(ClientError::NotConnected);
        }

        debug!(tag = "TCP", "sending {} bytes", data.len());
        self.send_raw(data).await?;

        let response_timeout = Duration::from_millis(self.link.config.tcp.response_timeout_ms);
        self.wait_for(token::INBOUND_DATA, response_timeout).await?;
        Ok(self.held_frame())
    }

    /// Close the connection; nothing to do when already disconnected.
    ///
    /// `ERROR` from the module means the link was already gone and counts
    /// as closed.
    pub async fn tcp_disconnect(&mut self) -> Result<()> {
        if self.link.tcp.state == TcpState::Disconnected {
            return Ok(());
        }

        self.link.tcp.state = TcpState::Disconnecting;
        let timeout = self.tcp_command_timeout();

        let closed = async {
            self.send_command("AT+CIPCLOSE").await?;
            let (index, frame) = self
                .wait_for_any(&[token::ERROR, token::CLOSED, token::OK], timeout)
                .await?;
            frame.release();
            Ok::<bool, ClientError>(index == 0)
        }
        .await;

        match closed {
            Ok(already_closed) => {
                if already_closed {
                    info!(tag = "TCP", "link was already closed");
                } else {
                    info!(tag = "TCP", "closed {}:{}", self.link.tcp.host, self.link.tcp.port);
                }
                self.link.tcp = TcpSession::default();
                Ok(())
            }
            Err(e) => {
                warn!(tag = "TCP", "close failed: {}", e);
                self.link.tcp.state = TcpState::Error;
                Err(e)
            }
        }
    }
}
