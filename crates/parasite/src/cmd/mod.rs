use clap::{Args, Subcommand};
use std::path::PathBuf;

use parasite_peer::HostIdentity;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod handshake;
pub mod list;
pub mod verify;
pub mod version;

/// Host name plugins built against the demo expect.
pub const DEFAULT_HOST_NAME: &str = "parasite-host";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the plugins in a directory and make one call.
    Call(CallArgs),
    /// List the plugin executables in a directory.
    List(ListArgs),
    /// Print the handshake blob handed to plugins.
    Handshake(HandshakeArgs),
    /// Check a handshake blob the way a plugin would.
    VerifyHandshake(VerifyArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::List(args) => list::run(args, format),
        Command::Handshake(args) => handshake::run(args, format),
        Command::VerifyHandshake(args) => verify::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Host name presented to plugins.
    #[arg(long, env = "PARASITE_HOST_NAME", default_value = DEFAULT_HOST_NAME)]
    pub host_name: String,
    /// Host version presented to plugins.
    #[arg(long, env = "PARASITE_HOST_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub host_version: String,
}

impl HostArgs {
    pub fn identity(&self) -> HostIdentity {
        HostIdentity::new(&self.host_name, &self.host_version)
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Directory of plugin executables.
    pub dir: PathBuf,
    /// Plugin to call (executable file name without `.exe`).
    pub plugin: String,
    /// Call name.
    pub call: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Send without waiting for a reply.
    #[arg(long)]
    pub notice: bool,
    /// Give up on a reply after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub stale_after: String,
    /// How often unanswered calls are checked (e.g. 500ms).
    #[arg(long, default_value = "500ms")]
    pub reap_interval: String,
    #[command(flatten)]
    pub host: HostArgs,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Directory of plugin executables.
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct HandshakeArgs {
    #[command(flatten)]
    pub host: HostArgs,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Handshake blob, as passed after `-h`.
    pub blob: String,
    /// Host name the plugin requires.
    #[arg(long, default_value = DEFAULT_HOST_NAME)]
    pub expect_host: String,
    /// Lowest host version the plugin accepts.
    #[arg(long)]
    pub min_version: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
