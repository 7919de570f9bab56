//! The multiplexer that shares one UART between the MCU command protocol,
//! the console and up to `max_sessions` TCP clients.
//!
//! [`Bridge`] is a sans-IO state machine: the caller feeds it UART batches,
//! TCP payloads and the current time, and drains [`Effect`]s telling it what
//! to send to which TCP peer. `runtime::serve` (feature `runtime`) drives it
//! from a tokio event loop.
//!
//! Per-session connection modes:
//! - `Transparent`: raw bytes both ways
//! - `Telnet`: RFC 854 escaping plus RFC 2217 serial-port control
//! - `Programming`: the MCU is reset into its bootloader and owns the UART
//!   exclusively until the session ends

pub mod bridge;
pub mod classify;
pub mod config;
pub mod console;
pub mod error;
pub mod pool;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod sequencer;
pub mod session;
pub mod telnet;

pub use bridge::{Bridge, CloseReason, Effect};
pub use classify::classify;
pub use config::{BridgeConfig, ListenConfig, ResetTiming};
pub use console::{ConsoleBuffer, ConsoleSnapshot, CONSOLE_CAPACITY};
pub use error::{BridgeError, Result};
pub use pool::SessionPool;
#[cfg(feature = "runtime")]
pub use runtime::{serve, serve_listeners};
pub use sequencer::ResetSequencer;
pub use session::{ConnectionMode, ListenerKind, OutputQueue, Session, SessionId};
pub use telnet::{ComPortRequest, TelnetEvent, TelnetParser, TelnetState};
