//! Received frame buffer
//!
//! One frame is everything the module sent between two idle-line events.
//! Frames live in a fixed-capacity buffer so the receive path never
//! allocates; `len` marks the valid region and nothing past it is ever read.

use std::fmt;

use crate::matcher;

/// Largest single response the link must hold, with headroom for `+IPD`
/// payload echoes.
pub const FRAME_CAPACITY: usize = 1536;

/// One delimited unit of inbound bytes
#[derive(Clone)]
pub struct Frame {
    data: [u8; FRAME_CAPACITY],
    len: usize,
}

impl Frame {
    /// An empty frame
    pub const fn empty() -> Self {
        Self {
            data: [0u8; FRAME_CAPACITY],
            len: 0,
        }
    }

    /// Copy `bytes` into a new frame.
    ///
    /// Input beyond [`FRAME_CAPACITY`] is cut off; the second value reports
    /// how many bytes were discarded.
    pub fn from_slice(bytes: &[u8]) -> (Self, usize) {
        let mut frame = Self::empty();
        let dropped = frame.fill(bytes);
        (frame, dropped)
    }

    /// Replace the contents with `bytes`, returning the number of bytes that
    /// did not fit.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(FRAME_CAPACITY);
        self.data[..n].copy_from_slice(&bytes[..n]);
        if n < self.len {
            self.data[n..self.len].fill(0);
        }
        self.len = n;
        bytes.len() - n
    }

    /// Valid region of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the valid region contains `needle`
    pub fn contains(&self, needle: &[u8]) -> bool {
        matcher::contains(self.as_bytes(), needle)
    }

    /// Zero the valid region and reset the length
    pub fn clear(&mut self) {
        self.data[..self.len].fill(0);
        self.len = 0;
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len)
            .field("data", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Frame {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice() {
        let (frame, dropped) = Frame::from_slice(b"OK\r\n");
        assert_eq!(dropped, 0);
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.as_bytes(), b"OK\r\n");
        assert!(frame.contains(b"OK"));
    }

    #[test]
    fn test_oversized_input_is_truncated() {
        let big = vec![b'A'; FRAME_CAPACITY + 10];
        let (frame, dropped) = Frame::from_slice(&big);
        assert_eq!(frame.len(), FRAME_CAPACITY);
        assert_eq!(dropped, 10);
    }

    #[test]
    fn test_refill_shorter_zeroes_tail() {
        let (mut frame, _) = Frame::from_slice(b"WIFI GOT IP");
        frame.fill(b"OK");
        assert_eq!(frame.as_bytes(), b"OK");
        assert!(!frame.contains(b"GOT"));
        assert!(frame.data[2..11].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clear() {
        let (mut frame, _) = Frame::from_slice(b"ERROR");
        frame.clear();
        assert!(frame.is_empty());
        assert!(frame.data.iter().all(|&b| b == 0));
        frame.clear();
        assert!(frame.is_empty());
    }
}
