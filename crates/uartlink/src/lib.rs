//! Share one MCU serial link between a SLIP command protocol, the MCU's
//! console and a handful of TCP clients.
//!
//! # Crate Structure
//!
//! - [`transport`]: UART and reset/ISP pin abstraction
//! - [`frame`]: SLIP framing with console-text detection and CRC16
//! - [`cmd`]: Command packets, the command table and the dispatcher
//! - [`bridge`]: TCP session multiplexer (behind `bridge` feature)

/// Re-export transport types.
pub mod transport {
    pub use uartlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use uartlink_frame::*;
}

/// Re-export command protocol types.
pub mod cmd {
    pub use uartlink_cmd::*;
}

/// Re-export bridge types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod bridge {
    pub use uartlink_bridge::*;
}
