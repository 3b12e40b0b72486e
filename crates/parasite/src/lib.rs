//! Call into plugin executables, and let them call back, over their stdio.
//!
//! A host launches every executable in a plugin directory, hands each one an
//! opaque handshake blob on its command line, and then exchanges framed calls
//! with it over the child's stdin and stdout.
//!
//! # Crate Structure
//!
//! - [`transport`]: Plugin discovery and child process spawning
//! - [`frame`]: Line-oriented frame codec that tolerates stray output
//! - [`peer`]: Host and plugin runtimes (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use parasite_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use parasite_frame::*;
}

/// Re-export host and plugin runtime types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use parasite_peer::*;
}
