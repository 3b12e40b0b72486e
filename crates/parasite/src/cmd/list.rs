use parasite_transport::discover;

use crate::cmd::ListArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_plugins, OutputFormat};

pub fn run(args: ListArgs, format: OutputFormat) -> CliResult<i32> {
    let plugins = discover(&args.dir).map_err(|err| {
        transport_error(&format!("failed reading {}", args.dir.display()), err)
    })?;
    print_plugins(&plugins, format);
    Ok(SUCCESS)
}
