use std::fs;
use std::time::Duration;

use parasite_peer::{ConnectionConfig, HandlerError, Host, HostConfig};
use tracing::debug;

use crate::cmd::CallArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let config = HostConfig {
        connection: ConnectionConfig {
            stale_after: parse_duration(&args.stale_after)?,
            reap_interval: parse_duration(&args.reap_interval)?,
            ..ConnectionConfig::default()
        },
    };
    let payload = resolve_payload(&args)?;

    let host = Host::with_config(args.host.identity(), refuse_plugin_calls, config);
    let loaded = host
        .load(&args.dir)
        .map_err(|err| peer_error("loading plugins failed", err))?;
    debug!(loaded, dir = %args.dir.display(), "plugins ready");

    if args.notice {
        host.notice(&args.plugin, &args.call, &payload)
            .map_err(|err| peer_error("notice failed", err))?;
    } else {
        let reply = host
            .call(&args.plugin, &args.call, &payload)
            .map_err(|err| peer_error("call failed", err))?;
        print_reply(&args.plugin, &args.call, &reply, format);
    }

    host.shutdown();
    Ok(SUCCESS)
}

/// The CLI offers no calls of its own to plugins.
fn refuse_plugin_calls(call: &str, _payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
    Err(format!("the parasite CLI does not answer '{call}'").into())
}

fn resolve_payload(args: &CallArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
