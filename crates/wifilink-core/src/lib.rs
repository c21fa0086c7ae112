//! WifiLink Core
//!
//! Parsing primitives for the AT command protocol spoken by serial Wi-Fi
//! co-processors. Everything here works on explicit, bounds-checked slices:
//! receive frames are not NUL-terminated and may carry binary payload.
//!
//! This crate provides:
//! - Substring search over raw buffers ([`matcher`])
//! - Field extraction from response frames ([`parser`])
//! - The fixed-capacity receive [`Frame`]
//! - HTTP request building and body extraction ([`http`])
//! - Flat key lookup in JSON bodies ([`json`])

pub mod error;
pub mod frame;
pub mod http;
pub mod json;
pub mod matcher;
pub mod parser;

pub use error::{Error, Result};
pub use frame::{Frame, FRAME_CAPACITY};
pub use http::{extract_body, HttpMethod, HttpRequest};
pub use matcher::{contains, find_substring};
pub use parser::FieldKind;

/// Line terminator appended to every command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Response status tokens
pub mod token {
    pub const OK: &[u8] = b"OK";
    pub const ERROR: &[u8] = b"ERROR";
    pub const FAIL: &[u8] = b"FAIL";
    pub const CONNECT: &[u8] = b"CONNECT";
    pub const CLOSED: &[u8] = b"CLOSED";
    pub const SEND_PROMPT: &[u8] = b">";
    pub const INBOUND_DATA: &[u8] = b"+IPD";
    pub const STATION_IP: &[u8] = b"+CIFSR:STAIP";
    pub const STATUS: &[u8] = b"+CIPSTATUS:";
    pub const JOINED_AP: &[u8] = b"+CWJAP:";
}
