//! Field extraction from AT response frames
//!
//! Every extractor takes the frame's valid region as a slice and returns a
//! span or value only when the whole field, terminator included, lies inside
//! that region. A frame that ends mid-field yields [`Error::NotFound`]; a
//! partial value is never returned.
//!
//! ```text
//! +CIPSTATUS:0,"TCP","93.184.216.34",80,12345,0
//!            │  └─1─┘ └──────2──────┘
//!            └ AfterColon(1)        └ BetweenCommas(3)
//! ```

use std::ops::Range;

use crate::matcher::{find_nth_byte, find_substring};
use crate::{Error, Result};

/// Bytes that end a delimited field
pub const FIELD_STOP_SET: &[u8] = b",;:\0\r\n";

/// Longest `+<key>:` pattern accepted by [`number_after`]
pub const MAX_LABEL_PATTERN: usize = 31;

/// How a field is located inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Contents of the n-th quote pair
    InQuotes,
    /// Text following the n-th `:`
    AfterColon,
    /// Text following the n-th `,`
    BetweenCommas,
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn skip_ws(buf: &[u8], mut pos: usize) -> usize {
    while pos < buf.len() && is_ws(buf[pos]) {
        pos += 1;
    }
    pos
}

/// Span of the `index`-th (1-based) quoted string.
///
/// Pair k opens at quote number 2k-1. Whitespace right after the opening
/// quote is skipped.
pub fn quoted(buf: &[u8], index: usize) -> Result<Range<usize>> {
    let nth = index
        .checked_mul(2)
        .and_then(|n| n.checked_sub(1))
        .ok_or(Error::NotFound)?;
    let open = find_nth_byte(buf, b'"', nth).ok_or(Error::NotFound)?;

    let start = skip_ws(buf, open + 1);
    if start >= buf.len() {
        return Err(Error::NotFound);
    }

    let len = buf[start..]
        .iter()
        .position(|&b| b == b'"')
        .ok_or(Error::NotFound)?;

    Ok(start..start + len)
}

fn after_delimiter(buf: &[u8], delimiter: u8, index: usize) -> Result<Range<usize>> {
    let at = find_nth_byte(buf, delimiter, index).ok_or(Error::NotFound)?;

    let start = skip_ws(buf, at + 1);
    if start >= buf.len() {
        return Err(Error::NotFound);
    }

    let len = buf[start..]
        .iter()
        .position(|b| FIELD_STOP_SET.contains(b))
        .ok_or(Error::NotFound)?;

    Ok(start..start + len)
}

/// Span of a field selected by kind and 1-based occurrence index
pub fn field(buf: &[u8], kind: FieldKind, index: usize) -> Result<Range<usize>> {
    match kind {
        FieldKind::InQuotes => quoted(buf, index),
        FieldKind::AfterColon => after_delimiter(buf, b':', index),
        FieldKind::BetweenCommas => after_delimiter(buf, b',', index),
    }
}

/// Unsigned decimal following `+<key>:`.
///
/// Leading whitespace is skipped and the maximal run of ASCII digits is
/// consumed. No sign, no radix prefix; overflow wraps and range checks are
/// left to the caller.
pub fn number_after(buf: &[u8], key: &str) -> Result<u32> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("empty key"));
    }

    let pattern_len = key.len() + 2;
    if pattern_len > MAX_LABEL_PATTERN {
        return Err(Error::FieldTooLong {
            field: "label",
            len: pattern_len,
            max: MAX_LABEL_PATTERN,
        });
    }

    let mut pattern = [0u8; MAX_LABEL_PATTERN];
    pattern[0] = b'+';
    pattern[1..=key.len()].copy_from_slice(key.as_bytes());
    pattern[pattern_len - 1] = b':';

    let found = find_substring(buf, &pattern[..pattern_len]).ok_or(Error::NotFound)?;
    let start = skip_ws(buf, found + pattern_len);

    let digits = buf[start..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold((0u32, 0usize), |(value, count), &b| {
            (value.wrapping_mul(10).wrapping_add(u32::from(b - b'0')), count + 1)
        });

    match digits {
        (_, 0) => Err(Error::NotFound),
        (value, _) => Ok(value),
    }
}

/// Span of the quoted value that follows a literal `key`.
///
/// Anything between the key and the opening quote (`:`, `=`, spaces) is
/// skipped.
pub fn quoted_after_key(buf: &[u8], key: &[u8]) -> Result<Range<usize>> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("empty key"));
    }

    let found = find_substring(buf, key).ok_or(Error::NotFound)?;
    let after_key = found + key.len();

    let open = buf[after_key..]
        .iter()
        .position(|&b| b == b'"')
        .map(|i| after_key + i)
        .ok_or(Error::NotFound)?;

    let start = open + 1;
    let len = buf[start..]
        .iter()
        .position(|&b| b == b'"')
        .ok_or(Error::NotFound)?;

    Ok(start..start + len)
}

/// Copy the quoted value after `key` into `out`, truncating to fit.
///
/// Returns the number of bytes written.
pub fn string_after_key(buf: &[u8], key: &[u8], out: &mut [u8]) -> Result<usize> {
    if out.is_empty() {
        return Err(Error::InvalidArgument("empty output buffer"));
    }

    let span = quoted_after_key(buf, key)?;
    let n = span.len().min(out.len());
    out[..n].copy_from_slice(&buf[span.start..span.start + n]);
    Ok(n)
}
