//! SLIP framing for the MCU link.
//!
//! Bytes arriving from the UART are a mix of SLIP-framed binary packets and
//! plain console text the MCU prints between them. [`Framer`] separates the
//! two one byte at a time; [`FrameReader`] wraps it for blocking streams.
//!
//! Wire format of a packet:
//! ```text
//! 0xC0 | escaped payload | escaped CRC16 (LE) | 0xC0
//! ```
//! `0xC0` inside the payload is sent as `0xDB 0xDC`, `0xDB` as `0xDB 0xDD`.

pub mod crc;
pub mod error;
pub mod framer;
pub mod reader;
pub mod slip;

pub use crc::{crc16, crc16_update};
pub use error::{FrameError, Result};
pub use framer::{Framer, FramerConfig, FramerEvent, DEFAULT_CONSOLE_FLUSH_LEN, DEFAULT_MAX_PACKET_LEN};
pub use reader::FrameReader;
pub use slip::{encode_packet, escape, escape_into, unescape, END, ESC, ESC_END, ESC_ESC};
