//! UART and MCU control-line abstraction.
//!
//! This is the lowest layer of uartlink. It provides:
//! - [`UartPort`], the byte sink every response and passthrough write goes to
//! - [`McuPins`], the reset and ISP/program-select outputs wired to the MCU
//! - a `serialport`-backed device ([`SerialUart`]) and in-memory stand-ins
//!
//! Everything above this crate is written against the traits, so the framer,
//! dispatcher and multiplexer run unchanged against real hardware or tests.

pub mod duration_ms;
pub mod error;
pub mod pins;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use pins::{Level, McuPins, ModemLine, ModemLinePins, NoPins, PinEvent, RecordingPins};
pub use serial::{SerialConfig, SerialUart};
pub use traits::{CaptureUart, DataBits, LineSettings, Parity, StopBits, UartPort};
