use anyhow::Result;
use clap::Args;
use log::info;
use ndarray::prelude::*;
use smmc_data::{linspace, simulate_dataset, ObservationSet};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(short, long, help = "Output JSON (.json or .json.gz)")]
    pub output: String,

    #[arg(long, default_value = "20", help = "Parameter points")]
    pub n_points: usize,

    #[arg(long, default_value = "50", help = "Bernoulli trials per point")]
    pub n_trials: usize,

    #[arg(long, default_value = "0.0")]
    pub lb: f32,

    #[arg(long, default_value = "1.0")]
    pub ub: f32,

    #[arg(long, default_value = "0.5", help = "Parameter value where P(satisfied) = 0.5")]
    pub midpoint: f64,

    #[arg(long, default_value = "10.0", help = "Slope of the logistic satisfaction curve")]
    pub steepness: f64,

    #[arg(long, default_value = "0")]
    pub seed: u64,
}

/// Logistic satisfaction probability along one parameter
fn satisfaction_curve(x: f64, midpoint: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * (x - midpoint)).exp())
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    if args.n_points == 0 || args.n_trials == 0 {
        anyhow::bail!("need at least one point and one trial");
    }
    if args.lb > args.ub {
        anyhow::bail!("empty parameter range [{}, {}]", args.lb, args.ub);
    }

    let x_n1 = Array2::from_shape_vec((args.n_points, 1), linspace(args.lb, args.ub, args.n_points))?;
    let (mid, k) = (args.midpoint, args.steepness);
    let data = simulate_dataset(
        &x_n1,
        args.n_trials,
        |row| satisfaction_curve(row[0] as f64, mid, k),
        args.seed,
    )?;

    let obs = ObservationSet::from_bernoulli(&data)?;
    info!(
        "simulated {} points x {} trials, mean satisfaction {:.3}",
        data.num_points(),
        data.num_trials(),
        obs.empirical_satisfaction().mean().unwrap_or(0.0)
    );

    data.to_json(&args.output)?;
    info!("wrote {}", args.output);
    Ok(())
}
