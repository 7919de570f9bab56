use std::collections::VecDeque;

use bytes::Bytes;
use serde::Serialize;

/// Bytes of console history kept for late readers.
pub const CONSOLE_CAPACITY: usize = 1024;

/// Ring of recent MCU console output with absolute positions.
///
/// Positions count every byte ever written, so a reader can resume from
/// where it left off and detect what it missed.
#[derive(Debug)]
pub struct ConsoleBuffer {
    buf: VecDeque<u8>,
    capacity: usize,
    /// Absolute position of `buf[0]`.
    start: u64,
}

/// Result of [`ConsoleBuffer::read_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleSnapshot {
    /// Absolute position of the first returned byte.
    pub start: u64,
    #[serde(with = "lossy_text")]
    pub bytes: Bytes,
}

impl ConsoleSnapshot {
    /// Position to pass on the next read.
    pub fn next(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::with_capacity(CONSOLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            start: 0,
        }
    }

    /// Append, dropping the oldest bytes once full.
    pub fn write(&mut self, data: &[u8]) {
        if self.capacity == 0 {
            self.start += data.len() as u64;
            return;
        }
        for &byte in data {
            if self.buf.len() == self.capacity {
                self.buf.pop_front();
                self.start += 1;
            }
            self.buf.push_back(byte);
        }
    }

    /// Bytes from absolute position `from` to the end.
    ///
    /// A position older than the retained history reads from the oldest byte;
    /// a position past the end reads nothing.
    pub fn read_from(&self, from: u64) -> ConsoleSnapshot {
        let end = self.position();
        let start = from.clamp(self.start, end);
        let skip = (start - self.start) as usize;
        let bytes: Vec<u8> = self.buf.iter().skip(skip).copied().collect();
        ConsoleSnapshot {
            start,
            bytes: Bytes::from(bytes),
        }
    }

    /// Forget the history; positions keep counting.
    pub fn clear(&mut self) {
        self.start = self.position();
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Absolute position one past the newest byte.
    pub fn position(&self) -> u64 {
        self.start + self.buf.len() as u64
    }
}

mod lossy_text {
    use bytes::Bytes;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(value))
    }
}
