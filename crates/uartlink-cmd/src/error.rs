/// Errors raised by the command layer.
///
/// Malformed requests are not errors; see
/// [`DropReason`](crate::dispatch::DropReason).
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// Two handlers were registered for the same command id.
    #[error("command id {id} already registered as {existing:?}")]
    DuplicateCommand { id: u16, existing: String },

    /// A callback name longer than the registry allows.
    #[error("callback name is {len} bytes (max {max})")]
    CallbackNameTooLong { len: usize, max: usize },

    /// Every callback slot is taken.
    #[error("callback registry full ({max} entries)")]
    CallbackRegistryFull { max: usize },

    /// No callback registered under this name.
    #[error("no callback registered as {0:?}")]
    UnknownCallback(String),

    /// A count or length does not fit the u16 field that carries it.
    #[error("{what} is {len}, more than a u16 field holds")]
    TooLong { what: &'static str, len: usize },

    /// A response frame failed to decode.
    #[error("invalid response frame: {0}")]
    InvalidResponse(String),

    /// Writing to the UART failed.
    #[error("command I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned to handlers by the argument cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    /// All `argc` arguments have been consumed.
    #[error("no arguments left")]
    Exhausted,

    /// The next argument does not have the length the handler asked for.
    #[error("argument is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The argument's length prefix or body runs past the packet.
    #[error("argument runs past the end of the packet")]
    Truncated,
}

pub type Result<T> = std::result::Result<T, CmdError>;

/// Narrow a wire length or count to its u16 field.
pub(crate) fn wire_u16(what: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| CmdError::TooLong { what, len })
}
