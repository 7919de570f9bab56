use crate::session::SessionId;

/// Errors that can occur in the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Every session slot is taken; the connection must be refused.
    #[error("session pool full ({capacity} sessions)")]
    PoolFull { capacity: usize },

    /// The session is not (or no longer) open.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The operation is not allowed while the MCU is being programmed.
    #[error("MCU programming in progress")]
    Interlocked,

    /// UART or listener failure.
    #[error(transparent)]
    Transport(#[from] uartlink_transport::TransportError),

    /// Command layer failure.
    #[error(transparent)]
    Cmd(#[from] uartlink_cmd::CmdError),

    /// An I/O error on the UART.
    #[error("bridge I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
