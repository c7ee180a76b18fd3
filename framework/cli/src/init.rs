use clap::Parser;

use crate::cli::SquallCli;

/// Initialise the CLI and logging for squall.
pub fn init() -> SquallCli {
    env_logger::init();

    SquallCli::parse()
}
