//! Flat key lookup in small JSON bodies
//!
//! Not a JSON parser: a literal scan for `"key":` followed by a string or
//! number value. Keys are tried in order and the first one present wins,
//! so callers can pass alternative spellings (`"city"`, `"name"`, ...).

use crate::matcher::find_substring_from;
use crate::{Error, Result};

fn is_structural(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b',' | b':' | b'{' | b'[')
}

/// Offset just past the `:` of the first `"key":` occurrence used as a field
/// name.
fn value_start(body: &[u8], key: &str) -> Option<usize> {
    let mut quoted_key = Vec::with_capacity(key.len() + 2);
    quoted_key.push(b'"');
    quoted_key.extend_from_slice(key.as_bytes());
    quoted_key.push(b'"');

    let mut from = 0;
    while let Some(at) = find_substring_from(body, from, &quoted_key) {
        let mut pos = at + quoted_key.len();
        while pos < body.len() && body[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < body.len() && body[pos] == b':' {
            let mut pos = pos + 1;
            while pos < body.len() && is_structural(body[pos]) {
                pos += 1;
            }
            return Some(pos);
        }
        from = at + 1;
    }
    None
}

fn string_at(body: &[u8], pos: usize) -> Option<String> {
    if body.get(pos) != Some(&b'"') {
        return None;
    }

    let start = pos + 1;
    let mut end = start;
    while end < body.len() {
        if body[end] == b'"' && body[end - 1] != b'\\' {
            let value = String::from_utf8_lossy(&body[start..end]);
            return Some(value.trim().to_string());
        }
        end += 1;
    }
    None
}

fn number_at(body: &[u8], pos: usize) -> Option<f64> {
    let mut end = pos;
    while end < body.len() {
        let b = body[end];
        let sign_ok = (b == b'-' || b == b'+') && end == pos;
        if b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E') || sign_ok {
            end += 1;
        } else {
            break;
        }
    }

    std::str::from_utf8(&body[pos..end]).ok()?.parse().ok()
}

/// String value of the first key in `keys` that maps to a string
pub fn get_string(body: &[u8], keys: &[&str]) -> Result<String> {
    if keys.is_empty() {
        return Err(Error::InvalidArgument("no keys"));
    }

    keys.iter()
        .filter_map(|key| value_start(body, key).and_then(|pos| string_at(body, pos)))
        .next()
        .ok_or(Error::NotFound)
}

/// Numeric value of the first key in `keys` that maps to a number
pub fn get_number(body: &[u8], keys: &[&str]) -> Result<f64> {
    if keys.is_empty() {
        return Err(Error::InvalidArgument("no keys"));
    }

    keys.iter()
        .filter_map(|key| value_start(body, key).and_then(|pos| number_at(body, pos)))
        .next()
        .ok_or(Error::NotFound)
}
