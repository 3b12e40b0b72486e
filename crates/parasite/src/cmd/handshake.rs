use parasite_peer::HandshakeRecord;

use crate::cmd::HandshakeArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_handshake, OutputFormat};

pub fn run(args: HandshakeArgs, format: OutputFormat) -> CliResult<i32> {
    let record = HandshakeRecord::new(&args.host.host_name, &args.host.host_version);
    let blob = record
        .encode()
        .map_err(|err| peer_error("encoding handshake failed", err))?;
    print_handshake(&record, &blob, format);
    Ok(SUCCESS)
}
