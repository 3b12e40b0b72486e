//! Host and plugin runtimes for the parasite call protocol.
//!
//! A host launches each plugin executable with a handshake blob, then
//! exchanges framed calls with it over the child's stdin and stdout. Either
//! side may call the other; replies are correlated by id, and calls left
//! unanswered are reclaimed after a staleness window.

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod host;
pub mod log_forward;
pub mod log_layer;
pub mod pending;
pub mod runtime;

pub use config::{ConnectionConfig, HostConfig, DEFAULT_REAP_INTERVAL, DEFAULT_STALE_AFTER};
pub use connection::{shared_sink, Connection, Dispatch, ReplyWriter, SharedSink};
pub use error::{HandlerError, PeerError, Result};
pub use handshake::{validate_handshake, HandshakeConfig, HandshakeRecord, HANDSHAKE_FLAG};
pub use host::{Executor, Host, HostIdentity};
pub use log_forward::LogRecord;
pub use log_layer::FrameLogLayer;
pub use pending::{CallResult, PendingCalls};
pub use runtime::{Handler, Parasite, ParasiteOptions, Shutdown};
