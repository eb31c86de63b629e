use clap::Parser;

use intcode::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    intcode::cli(cli)
}
