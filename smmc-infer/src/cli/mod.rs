pub mod evaluate;
pub mod simulate;
pub mod train;

use clap::{Parser, Subcommand};

pub use evaluate::EvaluateArgs;
pub use simulate::SimulateArgs;
pub use train::TrainArgs;

#[derive(Parser)]
#[command(name = "smmc")]
#[command(about = "Bayesian surrogates for statistical model checking")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a toy 1-D dataset with a known satisfaction curve
    Simulate(SimulateArgs),
    /// Fit a surrogate and write its artifact
    Train(TrainArgs),
    /// Score a saved surrogate on a validation set
    Evaluate(EvaluateArgs),
}

impl Cli {
    /// Whether `info!` logging was asked for on the command line
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Simulate(_) => false,
            Commands::Train(args) => args.verbose,
            Commands::Evaluate(args) => args.verbose,
        }
    }
}
