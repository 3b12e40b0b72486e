//! Child-process transport for plugins.
//!
//! A plugin is an executable file. This crate finds plugin executables in a
//! directory and spawns them with piped standard input and output:
//! - [`discover`] lists the executables a host should load
//! - [`PluginProcess`] owns a spawned child and hands out its stdio pipes
//!
//! This is the lowest layer of parasite. Framing and the call protocol are
//! built on top of the pipes returned here.

pub mod discover;
pub mod error;
pub mod process;

pub use discover::{discover, plugin_name, PluginEntry};
pub use error::{Result, TransportError};
pub use process::{PluginProcess, ProcessStreams};
