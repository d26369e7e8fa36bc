use crate::artifact::{read_training_time, ArtifactPaths};
use crate::pipeline::SmmcModel;

use anyhow::Result;
use clap::Args;
use log::{info, warn};
use smmc_data::common_io::write_string;
use smmc_data::{BernoulliDataset, ObservationSet};
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(short, long, help = "Model prefix written by `smmc train`")]
    pub model: String,

    #[arg(short, long, help = "Validation set JSON (params + 0/1 labels)")]
    pub data: String,

    #[arg(long, default_value = "1000", help = "Posterior predictive draws")]
    pub n_posterior_samples: usize,

    #[arg(long, default_value = "100", help = "Test-grid points per dimension")]
    pub n_test_points: usize,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    #[arg(short, long, help = "Metrics JSON (stdout if omitted)")]
    pub output: Option<String>,

    #[arg(long, help = "Also write predictions to this JSON file")]
    pub report: Option<String>,

    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: &EvaluateArgs) -> Result<()> {
    let model = SmmcModel::load(&args.model)?;
    let data = BernoulliDataset::from_json(&args.data)?;
    let val = ObservationSet::from_bernoulli(&data)?;
    info!("evaluating {:?} on {} points", model.method(), val.num_points());

    let report = model.evaluate(&val, args.n_posterior_samples, args.n_test_points, args.seed)?;

    let mut metrics: BTreeMap<String, f64> = report.metrics.to_map();
    match read_training_time(&ArtifactPaths::new(&args.model)) {
        Ok(secs) => {
            metrics.insert("training_time".to_string(), secs);
        }
        Err(err) => warn!("no training time recorded: {}", err),
    }

    let json = serde_json::to_string_pretty(&metrics)?;
    match &args.output {
        Some(file) => {
            write_string(&json, file)?;
            info!("wrote {}", file);
        }
        None => println!("{}", json),
    }

    if let Some(file) = &args.report {
        write_string(&serde_json::to_string(&report)?, file)?;
        info!("wrote {}", file);
    }
    Ok(())
}
