//! Module initialization
//!
//! Brings the module from power-on to an associated station with an address:
//!
//! ```text
//! CheckLink -> SetMode -> Associate -> AcquireAddress -> Complete
//!     \___________\___________\_______________\______-> Error
//! ```
//!
//! Each state is retried after a fixed backoff. Hitting the retry ceiling
//! resets the module through the transport and ends in `Error`.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use wifilink_core::token;
use wifilink_transport::Peripheral;

use crate::config::{WifiConfig, WifiMode};
use crate::error::{ClientError, Result};
use crate::protocol::{LinkHandle, Release, Session};
use crate::tcp::TcpSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitState {
    CheckLink,
    SetMode,
    Associate,
    AcquireAddress,
    Complete,
    Error,
}

impl InitState {
    fn next(self) -> Self {
        match self {
            InitState::CheckLink => InitState::SetMode,
            InitState::SetMode => InitState::Associate,
            InitState::Associate => InitState::AcquireAddress,
            InitState::AcquireAddress => InitState::Complete,
            InitState::Complete => InitState::Complete,
            InitState::Error => InitState::Error,
        }
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitState::CheckLink => "check-link",
            InitState::SetMode => "set-mode",
            InitState::Associate => "associate",
            InitState::AcquireAddress => "acquire-address",
            InitState::Complete => "complete",
            InitState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Wi-Fi side of the link: what was asked for and what was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub target_mode: WifiMode,
    pub current_mode: Option<WifiMode>,
    pub ssid: String,
    pub passphrase: String,
    pub station_ip: Option<Ipv4Addr>,
    /// Consecutive failures of the current init state
    pub retries: u32,
}

impl ConnectionHandle {
    pub fn new(wifi: &WifiConfig) -> Self {
        Self {
            target_mode: wifi.mode,
            current_mode: None,
            ssid: wifi.ssid.clone(),
            passphrase: wifi.passphrase.clone(),
            station_ip: None,
            retries: 0,
        }
    }

    /// Forget everything learned from the module
    pub fn reset(&mut self) {
        self.current_mode = None;
        self.station_ip = None;
        self.retries = 0;
    }
}

/// Outcome of a successful initialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Every state change, in order
    pub transitions: Vec<(InitState, InitState)>,
    pub station_ip: Option<Ipv4Addr>,
    /// Failed attempts across all states
    pub failures: u32,
}

impl<P: Peripheral> LinkHandle<P> {
    /// Lock the link and run [`Session::initialize`]
    pub async fn initialize(&self) -> Result<InitReport> {
        self.lock().await?.initialize().await
    }
}

impl<P: Peripheral> Session<P> {
    /// Run the initialization state machine to completion.
    ///
    /// Only [`ClientError::InitFailed`] is returned once the machine has
    /// started; every other failure is retried.
    pub async fn initialize(&mut self) -> Result<InitReport> {
        self.link.config.wifi.validate()?;

        self.release_frame();
        let flushed = self.link.transport.flush();
        if flushed > 0 {
            warn!(tag = "INIT", "discarded {} stale frames", flushed);
        }

        let wifi = self.link.config.wifi.clone();
        self.link.connection = ConnectionHandle::new(&wifi);
        self.link.tcp = TcpSession::default();

        let ceiling = self.link.config.init.retry_ceiling.max(1);
        let backoff = Duration::from_millis(self.link.config.init.backoff_ms);
        let mut report = InitReport::default();
        let mut state = InitState::CheckLink;
        self.link.init_state = state;

        info!(tag = "INIT", "initializing module for {}", wifi.ssid);

        while state != InitState::Complete {
            match self.run_state(state).await {
                Ok(()) => {
                    let next = state.next();
                    info!(tag = "INIT", "{} -> {}", state, next);
                    report.transitions.push((state, next));
                    self.link.connection.retries = 0;
                    state = next;
                    self.link.init_state = state;
                }
                Err(e) => {
                    report.failures += 1;
                    self.link.connection.retries += 1;
                    let retries = self.link.connection.retries;
                    warn!(
                        tag = "INIT",
                        "{} failed ({}/{}): {}", state, retries, ceiling, e
                    );

                    if retries >= ceiling {
                        return Err(self.fail(state));
                    }
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        report.station_ip = self.link.connection.station_ip;
        Ok(report)
    }

    async fn run_state(&mut self, state: InitState) -> Result<()> {
        let init = self.link.config.init.clone();
        match state {
            InitState::CheckLink => {
                let timeout = Duration::from_millis(init.check_timeout_ms);
                self.expect("AT", token::OK, timeout).await
            }
            InitState::SetMode => {
                let mode = self.link.connection.target_mode;
                self.set_mode(mode).await
            }
            InitState::Associate => {
                self.associate(Duration::from_millis(init.associate_timeout_ms))
                    .await
            }
            InitState::AcquireAddress => {
                self.acquire_address(Duration::from_millis(init.address_timeout_ms))
                    .await
            }
            InitState::Complete | InitState::Error => Ok(()),
        }
    }

    fn fail(&mut self, state: InitState) -> ClientError {
        error!(
            tag = "INIT",
            "{} exhausted its retries, resetting module", state
        );
        self.link.init_state = InitState::Error;
        self.release_frame();
        if let Err(e) = self.link.transport.reset_peripheral() {
            error!(tag = "INIT", "module reset failed: {}", e);
        }
        self.link.connection.reset();
        self.link.tcp = TcpSession::default();
        ClientError::InitFailed { state }
    }

    /// `AT+CWMODE=<mode>`
    pub async fn set_mode(&mut self, mode: WifiMode) -> Result<()> {
        let timeout = Duration::from_millis(self.link.config.init.mode_timeout_ms);
        self.expect(&format!("AT+CWMODE={}", mode.code()), token::OK, timeout)
            .await?;
        self.link.connection.current_mode = Some(mode);
        Ok(())
    }

    async fn associate(&mut self, timeout: Duration) -> Result<()> {
        let ssid = self.link.connection.ssid.clone();
        let passphrase = self.link.connection.passphrase.clone();

        self.send_command(&format!("AT+CWJAP=\"{}\",\"{}\"", ssid, passphrase))
            .await?;
        let (index, frame) = self
            .wait_for_any(&[token::FAIL, token::ERROR, token::OK], timeout)
            .await?;
        frame.release();

        if index < 2 {
            return Err(ClientError::ConnectFailed(format!(
                "association with {} rejected",
                ssid
            )));
        }
        info!(tag = "INIT", "associated with {}", ssid);
        Ok(())
    }

    async fn acquire_address(&mut self, timeout: Duration) -> Result<()> {
        self.send_command("AT+CIFSR").await?;
        let address = self
            .wait_for(token::STATION_IP, timeout)
            .await?
            .quoted_after_key(token::STATION_IP, Release::Auto)?;

        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| ClientError::Parse(wifilink_core::Error::NotFound))?;
        info!(tag = "INIT", "station address {}", ip);
        self.link.connection.station_ip = Some(ip);
        Ok(())
    }

    /// SSID of the access point the module is joined to, if any (`AT+CWJAP?`)
    pub async fn query_association(&mut self) -> Result<Option<String>> {
        let timeout = Duration::from_millis(self.link.config.tcp.command_timeout_ms);
        self.send_command("AT+CWJAP?").await?;
        let (index, mut frame) = self
            .wait_for_any(&[token::JOINED_AP, token::OK, token::ERROR], timeout)
            .await?;

        if index != 0 {
            frame.release();
            return Ok(None);
        }
        let ssid = frame.quoted_after_key(token::JOINED_AP, Release::Auto)?;
        Ok(Some(ssid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        let mut state = InitState::CheckLink;
        let mut seen = vec![state];
        while state != InitState::Complete {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            [
                InitState::CheckLink,
                InitState::SetMode,
                InitState::Associate,
                InitState::AcquireAddress,
                InitState::Complete,
            ]
        );
        assert_eq!(InitState::Error.next(), InitState::Error);
    }

    #[test]
    fn test_handle_reset_keeps_credentials() {
        let mut handle = ConnectionHandle::new(&WifiConfig::new("lab", "secret"));
        handle.station_ip = Some(Ipv4Addr::new(10, 0, 0, 2));
        handle.current_mode = Some(WifiMode::Station);
        handle.retries = 2;

        handle.reset();
        assert_eq!(handle.station_ip, None);
        assert_eq!(handle.current_mode, None);
        assert_eq!(handle.retries, 0);
        assert_eq!(handle.ssid, "lab");
    }
}
