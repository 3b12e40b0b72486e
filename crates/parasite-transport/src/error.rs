use std::path::PathBuf;

/// Errors that can occur while discovering or spawning plugin processes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The plugin executable could not be started.
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The child started but one of its stdio pipes was not attached.
    #[error("plugin {0} pipe was not attached")]
    MissingPipe(&'static str),

    /// The plugin directory could not be listed.
    #[error("failed to read plugin directory {path}: {source}")]
    Discover {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred while managing the child process.
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
