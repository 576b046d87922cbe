mod workflows;

use anyhow::Result;
use clap::Parser;
use sylph_build::verbose::Verbosity;

use workflows::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    Verbosity::from_flags(cli.quiet, cli.verbose).install();

    let root = workflows::locate_repo_root(cli.root.as_deref())?;
    match &cli.command {
        Command::Build(args) => workflows::cmd_build(&root, args),
        Command::Clean => workflows::cmd_clean(&root),
        Command::Dump => workflows::cmd_dump(&root),
        Command::Run(args) => workflows::cmd_run(&root, args),
        Command::Test(args) => workflows::cmd_test(&root, args),
    }
}
