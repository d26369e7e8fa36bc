use crate::artifact::ArtifactPaths;
use crate::bnn::{Architecture, BnnConfig};
use crate::likelihood::{LikelihoodKind, DEFAULT_NUM_NODES};
use crate::pipeline::{FitConfig, Method, SmmcModel};
use crate::svgp::{GpConfig, VariationalFamily, VariationalStrategy};
use crate::train::TrainConfig;

use anyhow::Result;
use clap::Args;
use log::info;
use smmc_data::common_io::write_string;
use smmc_data::{BernoulliDataset, ObservationSet};

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(short, long, help = "Training set JSON (params + 0/1 labels)")]
    pub data: String,

    #[arg(short, long, help = "Output prefix ({output}.safetensors, {output}.json, ...)")]
    pub output: String,

    #[arg(short, long, value_enum, default_value = "svi-gp")]
    pub method: Method,

    #[arg(short, long, value_enum, default_value = "binomial")]
    pub likelihood: LikelihoodKind,

    #[arg(long, default_value = "1000")]
    pub epochs: usize,

    #[arg(long, default_value = "0.01")]
    pub lr: f64,

    #[arg(long, help = "Minibatch size (full batch if omitted)")]
    pub batch_size: Option<usize>,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    #[arg(long, value_enum, default_value = "cholesky", help = "GP variational family")]
    pub family: VariationalFamily,

    #[arg(long, value_enum, default_value = "whitened", help = "GP variational strategy")]
    pub strategy: VariationalStrategy,

    #[arg(long, help = "Cap on GP inducing points (all training points if omitted)")]
    pub max_inducing: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_NUM_NODES, help = "Gauss-Hermite nodes")]
    pub num_quadrature: usize,

    #[arg(long, value_enum, default_value = "three-layer", help = "BNN architecture")]
    pub architecture: Architecture,

    #[arg(long, default_value = "30", help = "BNN hidden units")]
    pub hidden_dim: usize,

    #[arg(long, default_value = "1", help = "BNN weight draws per step")]
    pub num_particles: usize,

    #[arg(long, help = "Write the per-epoch loss to {output}.loss.txt")]
    pub save_loss: bool,

    #[arg(long)]
    pub no_progress: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl TrainArgs {
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            gp: GpConfig {
                likelihood: self.likelihood,
                family: self.family,
                strategy: self.strategy,
                num_quadrature: self.num_quadrature,
                max_inducing: self.max_inducing,
                ..Default::default()
            },
            bnn: BnnConfig {
                architecture: self.architecture,
                hidden_dim: self.hidden_dim,
                likelihood: self.likelihood,
                num_particles: self.num_particles,
            },
            train: TrainConfig {
                learning_rate: self.lr,
                num_epochs: self.epochs,
                batch_size: self.batch_size,
                seed: self.seed,
                verbose: self.verbose,
                show_progress: !self.no_progress,
            },
        }
    }
}

pub fn run(args: &TrainArgs) -> Result<()> {
    let data = BernoulliDataset::from_json(&args.data)?;
    let train = ObservationSet::from_bernoulli(&data)?;

    let fitted = SmmcModel::fit(args.method, &train, &args.fit_config())?;
    fitted.save(&args.output)?;
    info!("wrote {}", ArtifactPaths::new(&args.output).meta);

    if args.save_loss {
        let file = format!("{}.loss.txt", args.output);
        let lines = fitted
            .loss_trace
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        write_string(&lines, &file)?;
        info!("wrote {}", file);
    }
    Ok(())
}
