//! Substring search over raw receive buffers
//!
//! Frames captured from the module are not NUL-terminated and may carry
//! binary payload (`+IPD`), so every search here works on explicit slices
//! and never looks past `haystack.len()`.

/// Find the first occurrence of `needle` in `haystack`.
///
/// An empty needle matches at offset 0. A needle longer than the haystack
/// is rejected without scanning.
pub fn find_substring(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    (0..=last_start).find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Find `needle` starting the search at `from`; the returned offset is
/// relative to the start of `haystack`.
pub fn find_substring_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    find_substring(&haystack[from..], needle).map(|i| i + from)
}

/// Whether `needle` occurs anywhere in `haystack`
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find_substring(haystack, needle).is_some()
}

/// Offset of the `n`-th (1-based) occurrence of `byte`.
///
/// `n == 0` and `n > buf.len()` are rejected up front.
pub fn find_nth_byte(buf: &[u8], byte: u8, n: usize) -> Option<usize> {
    if n == 0 || n > buf.len() {
        return None;
    }

    buf.iter()
        .enumerate()
        .filter(|(_, &b)| b == byte)
        .nth(n - 1)
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_needle_matches_at_zero() {
        assert_eq!(find_substring(b"", b""), Some(0));
        assert_eq!(find_substring(b"OK\r\n", b""), Some(0));
    }

    #[test]
    fn test_needle_longer_than_haystack() {
        assert_eq!(find_substring(b"OK", b"OK\r\n"), None);
        assert_eq!(find_substring(b"", b"x"), None);
    }

    #[test]
    fn test_finds_first_occurrence() {
        let frame = b"AT\r\n\r\nOK\r\nOK\r\n";
        assert_eq!(find_substring(frame, b"OK"), Some(6));
        assert_eq!(find_substring(frame, b"ERROR"), None);
    }

    #[test]
    fn test_match_at_tail() {
        assert_eq!(find_substring(b"SEND OK", b"OK"), Some(5));
        assert_eq!(find_substring(b"SEND OK", b"SEND OK"), Some(0));
    }

    #[test]
    fn test_binary_payload_with_nul() {
        let frame = b"+IPD,4:\0\0\xff\x01\r\nCLOSED";
        assert_eq!(find_substring(frame, b"CLOSED"), Some(13));
        assert!(contains(frame, b"\0\xff"));
    }

    #[test]
    fn test_find_from_offset() {
        let frame = b"OK OK OK";
        assert_eq!(find_substring_from(frame, 1, b"OK"), Some(3));
        assert_eq!(find_substring_from(frame, 8, b"OK"), None);
        assert_eq!(find_substring_from(frame, 9, b"OK"), None);
    }

    #[test]
    fn test_find_nth_byte() {
        let status = br#"+CIPSTATUS:0,"TCP","93.184.216.34",80"#;
        assert_eq!(find_nth_byte(status, b'"', 1), Some(13));
        assert_eq!(find_nth_byte(status, b'"', 3), Some(19));
        assert_eq!(find_nth_byte(status, b'"', 5), None);
        assert_eq!(find_nth_byte(status, b'"', 0), None);
        assert_eq!(find_nth_byte(b"ab", b'a', 3), None);
    }
}
