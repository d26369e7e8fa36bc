use anyhow::Result;
use clap::Parser;
use smmc_infer::cli::{evaluate, simulate, train, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.command {
        Commands::Simulate(args) => {
            simulate::run(args)?;
        }
        Commands::Train(args) => {
            train::run(args)?;
        }
        Commands::Evaluate(args) => {
            evaluate::run(args)?;
        }
    }

    Ok(())
}
