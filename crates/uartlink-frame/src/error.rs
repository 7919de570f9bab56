/// Errors that can occur while reading framed streams.
///
/// Corrupt framing is not an error: the framer resynchronises on the next
/// delimiter.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
