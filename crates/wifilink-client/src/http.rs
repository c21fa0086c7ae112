//! HTTP GET over the TCP session

use bytes::Bytes;
use tracing::{debug, info};
use wifilink_core::http::{IPD_PREFIX, REQUEST_BUFFER_LEN};
use wifilink_core::{extract_body, find_substring, Error, HttpRequest};
use wifilink_transport::Peripheral;

use crate::error::Result;
use crate::protocol::{LinkHandle, Session};
use crate::tcp::ConnectionKind;

/// Port used when `http_get` has to open the connection itself
pub const HTTP_PORT: u16 = 80;

impl<P: Peripheral> LinkHandle<P> {
    /// Lock the link and run [`Session::http_get`]
    pub async fn http_get(&self, request: &mut HttpRequest) -> Result<Bytes> {
        self.lock().await?.http_get(request).await
    }
}

impl<P: Peripheral> Session<P> {
    /// Send `request` and return the response body.
    ///
    /// Connects to the request host on port 80 first when no connection is
    /// open. The connection is left open afterwards.
    pub async fn http_get(&mut self, request: &mut HttpRequest) -> Result<Bytes> {
        let mut buffer = [0u8; REQUEST_BUFFER_LEN];
        let len = request.build(&mut buffer)?;

        if !self.tcp().is_connected() {
            let host = request.host().to_string();
            self.tcp_connect(&host, HTTP_PORT, ConnectionKind::Tcp)
                .await?;
        }

        info!(tag = "HTTP", "GET http://{}{}", request.host(), request.path());
        debug!(tag = "HTTP", "{} byte request", len);

        let frame = self.tcp_send(&buffer[..len]).await?;
        let body = match find_substring(frame.bytes(), IPD_PREFIX) {
            Some(start) => extract_body(&frame.bytes()[start..]).map(Bytes::copy_from_slice),
            None => Err(Error::NotFound),
        };
        frame.release();

        let body = body?;
        debug!(tag = "HTTP", "{} byte body", body.len());
        Ok(body)
    }
}
