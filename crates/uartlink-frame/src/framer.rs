use bytes::{Bytes, BytesMut};

use crate::slip::{END, ESC, ESC_END, ESC_ESC};

/// Default bound on an un-escaped packet.
pub const DEFAULT_MAX_PACKET_LEN: usize = 1024;

/// Default number of console bytes held before they are flushed.
pub const DEFAULT_CONSOLE_FLUSH_LEN: usize = 128;

/// Framer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramerConfig {
    /// Bytes past this bound are dropped; the packet is still delimited.
    pub max_packet_len: usize,
    /// Treat a delimited run whose first two bytes are printable as console
    /// text rather than a packet.
    pub console_sniff: bool,
    /// Console bytes are emitted once this many are pending.
    pub console_flush_len: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            console_sniff: true,
            console_flush_len: DEFAULT_CONSOLE_FLUSH_LEN,
        }
    }
}

impl FramerConfig {
    pub fn with_console_sniff(mut self, enabled: bool) -> Self {
        self.console_sniff = enabled;
        self
    }

    pub fn with_max_packet_len(mut self, len: usize) -> Self {
        self.max_packet_len = len;
        self
    }
}

/// Output of the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// A complete, un-escaped packet (CRC still attached).
    PacketReady(Bytes),
    /// Console text seen outside any packet.
    ConsoleBytes(Bytes),
}

/// Byte-at-a-time SLIP decoder that also recognises console text.
///
/// The framer starts outside any packet, so bytes before the first
/// delimiter are console text.
#[derive(Debug)]
pub struct Framer {
    config: FramerConfig,
    buf: BytesMut,
    in_packet: bool,
    escaped: bool,
    truncated: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(FramerConfig::default())
    }
}

impl Framer {
    pub fn new(config: FramerConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(config.max_packet_len),
            config,
            in_packet: false,
            escaped: false,
            truncated: 0,
        }
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Whether the framer is currently accumulating a packet.
    pub fn in_packet(&self) -> bool {
        self.in_packet
    }

    /// Feed one byte.
    pub fn feed(&mut self, byte: u8) -> Option<FramerEvent> {
        if byte == END {
            let event = self.take_pending();
            self.in_packet = true;
            self.escaped = false;
            return event;
        }

        if self.escaped {
            self.escaped = false;
            let byte = match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                other => other,
            };
            self.push_packet_byte(byte);
            return None;
        }

        if !self.in_packet {
            self.buf.extend_from_slice(&[byte]);
            if self.buf.len() >= self.config.console_flush_len {
                return Some(FramerEvent::ConsoleBytes(self.buf.split().freeze()));
            }
            return None;
        }

        if byte == ESC {
            self.escaped = true;
            return None;
        }

        if self.config.console_sniff
            && self.buf.len() == 1
            && is_console_byte(self.buf[0])
            && is_console_byte(byte)
        {
            self.in_packet = false;
            self.buf.extend_from_slice(&[byte]);
            return None;
        }

        self.push_packet_byte(byte);
        None
    }

    /// Feed one UART read batch.
    ///
    /// Events come out in arrival order; console text still pending at the
    /// end of the batch is flushed so it is never held back.
    pub fn feed_buf(&mut self, data: &[u8]) -> Vec<FramerEvent> {
        let mut events = Vec::new();
        for &byte in data {
            if let Some(event) = self.feed(byte) {
                events.push(event);
            }
        }
        if let Some(event) = self.flush_console() {
            events.push(event);
        }
        events
    }

    /// Emit pending console text, if any.
    pub fn flush_console(&mut self) -> Option<FramerEvent> {
        if self.in_packet || self.buf.is_empty() {
            return None;
        }
        Some(FramerEvent::ConsoleBytes(self.buf.split().freeze()))
    }

    /// Drop any partial packet or console text and return to console mode.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_packet = false;
        self.escaped = false;
        self.truncated = 0;
    }

    fn push_packet_byte(&mut self, byte: u8) {
        if self.buf.len() < self.config.max_packet_len {
            self.buf.extend_from_slice(&[byte]);
        } else {
            self.truncated += 1;
        }
    }

    fn take_pending(&mut self) -> Option<FramerEvent> {
        if self.truncated > 0 {
            tracing::debug!(
                dropped = self.truncated,
                max = self.config.max_packet_len,
                "oversized packet truncated"
            );
            self.truncated = 0;
        }
        if self.buf.is_empty() {
            return None;
        }
        let bytes = self.buf.split().freeze();
        Some(if self.in_packet {
            FramerEvent::PacketReady(bytes)
        } else {
            FramerEvent::ConsoleBytes(bytes)
        })
    }
}

/// Printable ASCII, CR or LF.
fn is_console_byte(byte: u8) -> bool {
    (b' '..=b'~').contains(&byte) || byte == b'\n' || byte == b'\r'
}
