/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The encoded frame line exceeds the configured maximum.
    #[error("frame line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF.
    #[error("connection closed")]
    ConnectionClosed,

    /// A writer panicked while holding the shared sink.
    #[error("frame sink poisoned by a panicked writer")]
    Poisoned,
}

/// A field of a recognised frame line failed to decode.
///
/// Carried inside the [`Frame`](crate::Frame) rather than returned, so a
/// single malformed frame never ends a read loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid correlation id: {0}")]
    InvalidId(String),

    #[error("invalid call name: {0}")]
    InvalidCallName(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
