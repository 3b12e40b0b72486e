//! Demo plugin.
//!
//! Started by a host as `parasite-echo -h <blob>`. Answers:
//! - `echo`: returns the payload unchanged
//! - `upper`: ASCII upper-cases the payload
//! - `fail`: always fails
//! - `sleep`: waits for the number of milliseconds in the payload
//! - `count`: number of calls answered by `count` so far
//!
//! Its logs travel to the host as log frames.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use parasite::peer::{log_layer, Handler, HandlerError, Parasite, ParasiteOptions, PeerError};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

const HOST_NAME: &str = "parasite-host";
const MIN_HOST_VERSION: &str = "0.1.0";

const HANDSHAKE_REJECTED: i32 = 1;
const FAILURE: i32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "parasite-echo",
    version,
    about = "Demo parasite plugin",
    disable_help_flag = true
)]
struct Args {
    /// Handshake blob supplied by the host.
    #[arg(short = 'h', value_name = "BLOB")]
    handshake: Option<String>,

    /// Lowest level forwarded to the host.
    #[arg(long, env = "PARASITE_ECHO_LOG_LEVEL", default_value = "info")]
    log_level: LevelFilter,

    /// Print help.
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn echo(payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
    info!(bytes = payload.len(), "echo");
    Ok(payload.to_vec())
}

fn upper(payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
    Ok(payload.to_ascii_uppercase())
}

fn fail(_payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
    Err("the fail handler always fails".into())
}

fn sleep(payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
    let millis: u64 = std::str::from_utf8(payload)?.trim().parse()?;
    thread::sleep(Duration::from_millis(millis));
    Ok(b"slept".to_vec())
}

#[derive(Default)]
struct Counter {
    calls: AtomicU64,
}

impl Handler for Counter {
    fn init(&self) -> Result<(), HandlerError> {
        debug!("counter ready");
        Ok(())
    }

    fn teardown(&self) {
        info!(calls = self.calls.load(Ordering::Relaxed), "counter done");
    }

    fn handle(&self, _payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(calls.to_string().into_bytes())
    }
}

fn main() {
    let args = Args::parse();

    let Some(handshake) = args.handshake else {
        eprintln!("parasite-echo is a plugin for {HOST_NAME} {MIN_HOST_VERSION}+ and cannot be run on its own.");
        process::exit(HANDSHAKE_REJECTED);
    };

    let options = ParasiteOptions {
        name: "echo".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        host_name: HOST_NAME.into(),
        min_host_version: MIN_HOST_VERSION.into(),
    };
    let parasite = Parasite::new(options)
        .register("echo", echo)
        .register("upper", upper)
        .register("fail", fail)
        .register("sleep", sleep)
        .register("count", Counter::default());

    if let Err(err) = log_layer::install(parasite.sink(), args.log_level) {
        eprintln!("warning: {err}");
    }

    match parasite.run(&handshake) {
        Ok(_) => process::exit(0),
        Err(PeerError::HandshakeFailed(reason)) => {
            eprintln!("parasite-echo is a plugin for {HOST_NAME} {MIN_HOST_VERSION}+ and cannot be run on its own: {reason}");
            process::exit(HANDSHAKE_REJECTED);
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(FAILURE);
        }
    }
}
