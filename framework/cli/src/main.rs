mod cli;
mod init;
mod list;
mod run;
mod shutdown;

use crate::cli::Command;

fn main() -> anyhow::Result<()> {
    let cli = init::init();

    match cli.command {
        Command::List(source) => list::list(&source),
        Command::Run(args) => run::run(args),
    }
}
