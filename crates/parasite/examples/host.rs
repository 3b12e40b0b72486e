//! Minimal host: loads every plugin in a directory and calls `echo` on each.
//!
//! Run with:
//!   cargo build --bin parasite-echo --features cli
//!   mkdir -p /tmp/parasite-plugins && cp target/debug/parasite-echo /tmp/parasite-plugins/echo
//!   cargo run --example host -- /tmp/parasite-plugins

use std::path::PathBuf;

use parasite::peer::{HandlerError, Host, HostIdentity};

fn clock(call: &str, _payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
    match call {
        "host_time" => {
            let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)?;
            Ok(now.as_secs().to_string().into_bytes())
        }
        other => Err(format!("unknown host call '{other}'").into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/parasite-plugins"));

    let host = Host::new(HostIdentity::new("parasite-host", "0.1.0"), clock);
    let loaded = host.load(&dir)?;
    eprintln!("Loaded {loaded} plugin(s) from {}", dir.display());

    for plugin in host.plugins() {
        match host.call(&plugin, "echo", b"hello from the host") {
            Ok(reply) => eprintln!("{plugin}: {}", String::from_utf8_lossy(&reply)),
            Err(err) => eprintln!("{plugin}: {err}"),
        }
    }

    host.shutdown();
    Ok(())
}
