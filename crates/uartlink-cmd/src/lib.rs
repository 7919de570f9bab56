//! The binary command protocol spoken by the attached MCU.
//!
//! A request is a SLIP packet carrying
//! ```text
//! cmd (u16 LE) | argc (u16 LE) | value (u32 LE) | argc x { len (u16 LE) | data } | crc16 (LE)
//! ```
//! [`Dispatcher`] validates it, looks the command id up in a
//! [`CommandTable`] and runs the handler. If `value` is non-zero a response
//! frame carrying the handler's return value is written back, with `value`
//! echoed as the callback token.
//!
//! Malformed packets are dropped without telling the peer; the reason is
//! reported through [`DispatchOutcome`].

pub mod callbacks;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod packet;
pub mod response;
pub mod table;

pub use callbacks::{CallbackRegistry, MAX_CALLBACKS, MAX_CALLBACK_NAME_LEN};
pub use dispatch::{write_response, DispatchOutcome, Dispatcher, DropReason};
pub use error::{ArgError, CmdError, Result};
pub use handlers::{core_table, register_core};
pub use packet::{ArgCursor, CommandPacket, PacketHeader, Request, RequestBuilder, HEADER_LEN};
pub use response::{
    encode_response, padded_len, response_body, response_end, response_start, ResponseFrame,
};
pub use table::{CommandEntry, CommandHandler, CommandTable};
