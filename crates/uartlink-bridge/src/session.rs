use std::fmt;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::telnet::TelnetParser;

/// Handle of a pooled session: slot index plus a generation so a stale
/// handle never reaches a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId {
    pub slot: usize,
    pub generation: u32,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

/// Which listening port a session came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    /// Transparent/telnet port.
    Bridge,
    /// Programming port.
    Programming,
}

/// How a session's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Nothing received yet.
    Init,
    /// Accepted on the programming port, nothing received yet.
    ProgrammingInit,
    Transparent,
    Telnet,
    Programming,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ProgrammingInit => "programming_init",
            Self::Transparent => "transparent",
            Self::Telnet => "telnet",
            Self::Programming => "programming",
        }
    }

    /// Sessions that see console output.
    pub fn receives_console(self) -> bool {
        !matches!(self, Self::Programming | Self::ProgrammingInit)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded transmit queue towards one TCP peer.
///
/// At most one batch is in flight: bytes go out immediately when the peer
/// has acknowledged the previous batch, otherwise they wait here.
#[derive(Debug)]
pub struct OutputQueue {
    buf: BytesMut,
    capacity: usize,
    ready: bool,
    overflow_since: Option<Instant>,
}

impl OutputQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            ready: true,
            overflow_since: None,
        }
    }

    /// Queue `data`. Returns a batch to transmit now, if the peer is ready.
    ///
    /// If `data` does not fit it is dropped. The overflow clock starts only
    /// while a batch is in flight, since an idle queue has nothing left to
    /// drain and would never stop it.
    pub fn enqueue(&mut self, data: &[u8], now: Instant) -> Option<Bytes> {
        if data.is_empty() {
            return None;
        }
        if self.buf.len() + data.len() > self.capacity {
            if self.ready {
                tracing::debug!(len = data.len(), capacity = self.capacity, "oversized chunk dropped");
            } else if self.overflow_since.is_none() {
                self.overflow_since = Some(now);
            }
            return None;
        }
        self.buf.extend_from_slice(data);
        if self.ready {
            return self.take_batch();
        }
        None
    }

    /// The previous batch was written; returns the next one, if any.
    ///
    /// Any acknowledgement means the peer is draining, so the overflow clock
    /// stops even when nothing is waiting.
    pub fn on_sent(&mut self) -> Option<Bytes> {
        self.ready = true;
        self.overflow_since = None;
        self.take_batch()
    }

    pub fn overflow_since(&self) -> Option<Instant> {
        self.overflow_since
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn take_batch(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        self.ready = false;
        self.overflow_since = None;
        Some(self.buf.split().freeze())
    }
}

/// One pooled TCP connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub listener: ListenerKind,
    pub mode: ConnectionMode,
    pub queue: OutputQueue,
    pub telnet: TelnetParser,
    /// Bytes received while the reset sequence is still running.
    pub held: BytesMut,
    pub opened_at: Instant,
}

impl Session {
    pub fn new(id: SessionId, listener: ListenerKind, tx_capacity: usize, now: Instant) -> Self {
        let mode = match listener {
            ListenerKind::Bridge => ConnectionMode::Init,
            ListenerKind::Programming => ConnectionMode::ProgrammingInit,
        };
        Self {
            id,
            listener,
            mode,
            queue: OutputQueue::new(tx_capacity),
            telnet: TelnetParser::new(),
            held: BytesMut::new(),
            opened_at: now,
        }
    }
}
