use std::net::SocketAddr;

/// Errors that can occur in UART or listener operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {device}: {source}")]
    Open {
        device: String,
        source: serialport::Error,
    },

    /// Failed to bind a TCP listener.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the UART or a socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial driver rejected a settings or modem-line change.
    #[error("serial control error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
