use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uartlink_frame::{FramerConfig, DEFAULT_CONSOLE_FLUSH_LEN, DEFAULT_MAX_PACKET_LEN};

/// Default number of simultaneous TCP sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Default per-session output queue bound in bytes.
pub const DEFAULT_TX_BUFFER_SIZE: usize = 2048;

/// Default time a session may stay overflowed before it is closed.
pub const DEFAULT_OVERFLOW_TIMEOUT: Duration = Duration::from_secs(10);

/// Bridge behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub max_sessions: usize,
    pub tx_buffer_size: usize,
    #[serde(with = "uartlink_transport::duration_ms")]
    pub overflow_timeout: Duration,
    /// When false, UART input bypasses the framer and is all console text.
    pub slip_enabled: bool,
    pub max_packet_len: usize,
    pub console_sniff: bool,
    pub reset: ResetTiming,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            tx_buffer_size: DEFAULT_TX_BUFFER_SIZE,
            overflow_timeout: DEFAULT_OVERFLOW_TIMEOUT,
            slip_enabled: true,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            console_sniff: true,
            reset: ResetTiming::default(),
        }
    }
}

impl BridgeConfig {
    pub fn framer(&self) -> FramerConfig {
        FramerConfig {
            max_packet_len: self.max_packet_len,
            console_sniff: self.console_sniff,
            console_flush_len: DEFAULT_CONSOLE_FLUSH_LEN,
        }
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_tx_buffer_size(mut self, size: usize) -> Self {
        self.tx_buffer_size = size;
        self
    }

    pub fn with_overflow_timeout(mut self, timeout: Duration) -> Self {
        self.overflow_timeout = timeout;
        self
    }
}

/// Pin timing of the reset-into-bootloader sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetTiming {
    /// Reset held low before ISP is asserted; also the release pulse width.
    #[serde(with = "uartlink_transport::duration_ms")]
    pub reset_hold: Duration,
    /// ISP held low before reset is released.
    #[serde(with = "uartlink_transport::duration_ms")]
    pub isp_hold: Duration,
    /// Wait after reset release before forwarding bytes.
    #[serde(with = "uartlink_transport::duration_ms")]
    pub settle: Duration,
}

impl Default for ResetTiming {
    fn default() -> Self {
        Self {
            reset_hold: Duration::from_millis(1),
            isp_hold: Duration::from_millis(1),
            settle: Duration::from_millis(1),
        }
    }
}

/// TCP listening addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    pub bind: IpAddr,
    /// Transparent/telnet port.
    pub port: u16,
    /// Programming port; sessions here start in programming mode.
    pub programming_port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 23,
            programming_port: 2323,
        }
    }
}

impl ListenConfig {
    pub fn bridge_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn programming_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.programming_port)
    }
}
