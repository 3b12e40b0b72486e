use std::time::Duration;

/// Error type returned by handlers and executors.
///
/// Its `Display` text is what travels back to the caller as the reply payload.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in host and plugin operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] parasite_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] parasite_frame::FrameError),

    /// A reply arrived but one of its fields could not be decoded.
    #[error("undecodable reply: {0}")]
    Decode(#[from] parasite_frame::DecodeError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A pending call waited longer than the staleness window.
    #[error("call reclaimed after waiting longer than {0:?}")]
    Reclaimed(Duration),

    /// The connection was stopped while the call was outstanding.
    #[error("call cancelled: connection stopped")]
    Cancelled,

    /// No plugin with this name is loaded.
    #[error("no plugin named '{0}' is loaded")]
    UnknownPlugin(String),

    /// A handler init hook failed.
    #[error("handler '{name}' failed to initialise: {message}")]
    HandlerInit { name: String, message: String },

    /// Runtime options are incomplete.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A log record was not a JSON object with the required keys.
    #[error("invalid log record: {0}")]
    InvalidLogRecord(String),

    /// The process-wide log subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),

    /// Termination signal handler could not be installed.
    #[error("signal handler error: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;
