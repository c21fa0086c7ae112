//! Minimal HTTP/1.1 request builder and response body extraction
//!
//! Requests are rendered into a caller-owned buffer and sent as a raw TCP
//! payload. The size check happens before anything is written: a request
//! that does not fit is rejected, never truncated.
//!
//! ```text
//! GET <path> HTTP/1.1\r\n
//! Host: <host>\r\n
//! Connection: close\r\n
//! [extra headers\r\n]
//! \r\n
//! ```

use serde::{Deserialize, Serialize};

use crate::matcher::find_substring;
use crate::{Error, Result};

/// Maximum host length in bytes
pub const HOST_MAX_LEN: usize = 63;

/// Maximum path (and query) length in bytes
pub const PATH_MAX_LEN: usize = 255;

/// Capacity of the accumulated extra-header text
pub const EXTRA_HEADERS_CAPACITY: usize = 128;

/// Default size of the request scratch buffer
pub const REQUEST_BUFFER_LEN: usize = 512;

/// Envelope the module puts in front of inbound TCP data
pub const IPD_PREFIX: &[u8] = b"+IPD,";

const HEADER_BOUNDARY: &[u8] = b"\r\n\r\n";
const CONNECTION_CLOSE: &[u8] = b"Connection: close\r\n";

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Request descriptor, built once per request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    method: HttpMethod,
    host: String,
    path: String,
    extra_headers: String,
    total_len: usize,
}

impl HttpRequest {
    /// Create an empty request for `method`
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Shorthand for a GET request with host and path set
    pub fn get(host: &str, path: &str) -> Result<Self> {
        let mut req = Self::new(HttpMethod::Get);
        req.set_host(host)?;
        req.set_path(path)?;
        Ok(req)
    }

    /// Set the target host (no port); used for the `Host` header and the
    /// TCP connection.
    pub fn set_host(&mut self, host: &str) -> Result<()> {
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::InvalidArgument("empty host"));
        }
        if host.len() > HOST_MAX_LEN {
            return Err(Error::FieldTooLong {
                field: "host",
                len: host.len(),
                max: HOST_MAX_LEN,
            });
        }
        self.host = host.to_string();
        Ok(())
    }

    /// Set the request path; must start with `/`
    pub fn set_path(&mut self, path: &str) -> Result<()> {
        if !path.starts_with('/') {
            return Err(Error::InvalidArgument("path must start with '/'"));
        }
        if path.len() > PATH_MAX_LEN {
            return Err(Error::FieldTooLong {
                field: "path",
                len: path.len(),
                max: PATH_MAX_LEN,
            });
        }
        self.path = path.to_string();
        Ok(())
    }

    /// Append one `Key: Value` header (without trailing CR LF)
    pub fn add_header(&mut self, header: &str) -> Result<()> {
        if header.is_empty() {
            return Err(Error::InvalidArgument("empty header"));
        }

        let needed = self.extra_headers.len() + header.len() + 2;
        if needed >= EXTRA_HEADERS_CAPACITY {
            return Err(Error::FieldTooLong {
                field: "extra headers",
                len: needed,
                max: EXTRA_HEADERS_CAPACITY - 1,
            });
        }

        if !self.extra_headers.is_empty() {
            self.extra_headers.push_str("\r\n");
        }
        self.extra_headers.push_str(header);
        Ok(())
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn extra_headers(&self) -> &str {
        &self.extra_headers
    }

    /// Length of the last successful [`build`](Self::build)
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Exact number of bytes [`build`](Self::build) will write
    pub fn required_len(&self) -> usize {
        let headers = if self.extra_headers.is_empty() {
            0
        } else {
            self.extra_headers.len() + 2
        };

        self.method.as_str().len()
            + 1
            + self.path.len()
            + b" HTTP/1.1\r\n".len()
            + b"Host: ".len()
            + self.host.len()
            + 2
            + CONNECTION_CLOSE.len()
            + headers
            + 2
    }

    /// Render the request into `out`, returning the number of bytes written
    pub fn build(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.host.is_empty() || self.path.is_empty() {
            return Err(Error::InvalidArgument("host or path not set"));
        }
        if self.method != HttpMethod::Get {
            return Err(Error::UnsupportedMethod(self.method.as_str()));
        }

        let needed = self.required_len();
        if out.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                have: out.len(),
            });
        }

        let mut w = SliceWriter { out, pos: 0 };
        w.put(self.method.as_str().as_bytes());
        w.put(b" ");
        w.put(self.path.as_bytes());
        w.put(b" HTTP/1.1\r\nHost: ");
        w.put(self.host.as_bytes());
        w.put(b"\r\n");
        w.put(CONNECTION_CLOSE);
        if !self.extra_headers.is_empty() {
            w.put(self.extra_headers.as_bytes());
            w.put(b"\r\n");
        }
        w.put(b"\r\n");

        debug_assert_eq!(w.pos, needed);
        self.total_len = w.pos;
        Ok(w.pos)
    }
}

struct SliceWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl SliceWriter<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.out[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

/// Recover the HTTP body from a raw inbound frame.
///
/// A leading `+IPD,<len>:` envelope is skipped when present; the body is
/// everything after the first blank line.
pub fn extract_body(raw: &[u8]) -> Result<&[u8]> {
    let mut start = 0;

    if raw.starts_with(IPD_PREFIX) {
        start = IPD_PREFIX.len();
        while start < raw.len() && raw[start].is_ascii_digit() {
            start += 1;
        }
        if start < raw.len() && raw[start] == b':' {
            start += 1;
        }
    }

    let boundary = find_substring(&raw[start..], HEADER_BOUNDARY).ok_or(Error::NotFound)?;
    Ok(&raw[start + boundary + HEADER_BOUNDARY.len()..])
}
