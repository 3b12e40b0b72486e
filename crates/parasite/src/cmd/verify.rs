use parasite_peer::{validate_handshake, HandshakeConfig};

use crate::cmd::VerifyArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_handshake, OutputFormat};

pub fn run(args: VerifyArgs, format: OutputFormat) -> CliResult<i32> {
    let config = HandshakeConfig {
        expected_host_name: args.expect_host,
        min_host_version: args.min_version,
    };
    let record = validate_handshake(&args.blob, &config)
        .map_err(|err| peer_error("handshake rejected", err))?;
    print_handshake(&record, &args.blob, format);
    Ok(SUCCESS)
}
