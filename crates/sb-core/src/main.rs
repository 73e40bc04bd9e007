//! splat-bench binary entry point.

use clap::Parser;
use sb_core::cli::{self, Cli};
use sb_core::logging;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose, cli.quiet);
    let code = cli::run(&cli);
    std::process::exit(code.as_i32());
}
