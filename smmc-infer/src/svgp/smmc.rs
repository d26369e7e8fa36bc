use crate::artifact::{ArtifactMeta, ArtifactPaths, ModelMeta};
use crate::error::{config_err, Result};
use crate::evaluate::{evaluate_with, EvaluationReport};
use crate::likelihood::{LikelihoodKind, ObservationLikelihood, DEFAULT_NUM_NODES};
use crate::noise::NoiseSource;
use crate::params::ParamStore;
use crate::pipeline::Method;
use crate::svgp::model::{LatentPosterior, SparseGp};
use crate::svgp::train::train_sparse_gp;
use crate::svgp::variational::{VariationalFamily, VariationalStrategy};
use crate::tensor_util::{ToArray, ToTensor};
use crate::train::TrainConfig;

use candle_core::{DType, Device, Tensor};
use log::info;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smmc_data::{test_grid, MinMaxScaler, ObservationSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpConfig {
    pub likelihood: LikelihoodKind,
    pub family: VariationalFamily,
    pub strategy: VariationalStrategy,
    pub jitter: f64,
    pub num_quadrature: usize,
    /// Use every training point as an inducing point unless capped
    pub max_inducing: Option<usize>,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            likelihood: LikelihoodKind::Binomial,
            family: VariationalFamily::Cholesky,
            strategy: VariationalStrategy::Whitened,
            jitter: 1e-4,
            num_quadrature: DEFAULT_NUM_NODES,
            max_inducing: None,
        }
    }
}

/// Evenly strided rows when there are more than `max` candidates
fn select_inducing(z_nd: &Array2<f32>, max: Option<usize>) -> Array2<f32> {
    let n = z_nd.nrows();
    match max {
        Some(m) if m > 0 && m < n => {
            let rows = (0..m).map(|i| i * n / m).collect::<Vec<_>>();
            z_nd.select(Axis(0), &rows)
        }
        _ => z_nd.clone(),
    }
}

/// Sparse variational GP surrogate of a satisfaction probability,
/// with its input scaling and observation model.
pub struct SviGp {
    store: ParamStore,
    model: SparseGp,
    likelihood: Box<dyn ObservationLikelihood>,
    scaler: MinMaxScaler,
    inducing_points: Array2<f32>,
    config: GpConfig,
    n_trials: usize,
}

impl SviGp {
    /// Fix the input scaling from `train` and place the inducing points
    /// on the scaled training parameters.
    pub fn new(train: &ObservationSet, config: GpConfig) -> Result<Self> {
        let scaler = MinMaxScaler::fit(&train.parameters)?;
        let inducing = select_inducing(&scaler.transform(&train.parameters)?, config.max_inducing);
        Self::from_parts(config, scaler, inducing, train.n_trials)
    }

    fn from_parts(
        config: GpConfig,
        scaler: MinMaxScaler,
        inducing_points: Array2<f32>,
        n_trials: usize,
    ) -> Result<Self> {
        let likelihood = config.likelihood.build(n_trials, config.num_quadrature)?;
        let mut store = ParamStore::new(DType::F64, Device::Cpu);
        let model = SparseGp::new(
            &mut store,
            inducing_points.to_tensor(DType::F64, &Device::Cpu)?,
            config.family,
            config.strategy,
            config.jitter,
        )?;
        Ok(Self {
            store,
            model,
            likelihood,
            scaler,
            inducing_points,
            config,
            n_trials,
        })
    }

    pub fn config(&self) -> &GpConfig {
        &self.config
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn model(&self) -> &SparseGp {
        &self.model
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    fn scaled(&self, x_nd: &Array2<f32>) -> Result<Tensor> {
        let z_nd = self.scaler.transform(x_nd)?;
        Ok(z_nd.to_tensor(self.store.dtype(), self.store.device())?)
    }

    pub fn fit(&mut self, train: &ObservationSet, train_config: &TrainConfig) -> Result<Vec<f32>> {
        if train.n_trials != self.n_trials {
            return Err(config_err!(
                "training set has {} trials per point, model expects {}",
                train.n_trials,
                self.n_trials
            ));
        }
        let obs = self.config.likelihood.prepare(train)?;
        let x_nd = self.scaled(&obs.parameters)?;
        let y_n = obs.counts.to_tensor(self.store.dtype(), self.store.device())?;

        info!(
            "SVI-GP ({:?} likelihood, {:?} {:?})",
            self.config.likelihood, self.config.family, self.config.strategy
        );
        train_sparse_gp(
            &self.model,
            &self.store,
            self.likelihood.as_ref(),
            &x_nd,
            &y_n,
            train_config,
        )
    }

    /// Latent mean and variance at unscaled parameter points
    pub fn predict(&self, x_nd: &Array2<f32>) -> Result<LatentPosterior> {
        self.model.predict(&self.scaled(x_nd)?)
    }

    /// Closed-form predictive satisfaction probability
    pub fn predictive_probability(&self, x_nd: &Array2<f32>) -> Result<Tensor> {
        self.model
            .predictive_probability(&self.scaled(x_nd)?, self.likelihood.as_ref())
    }

    /// `(n_samples, n)` draws of the satisfaction probability
    pub fn posterior_samples(
        &self,
        x_nd: &Array2<f32>,
        n_samples: usize,
        noise: &mut NoiseSource,
    ) -> Result<Tensor> {
        self.model
            .posterior_samples(&self.scaled(x_nd)?, n_samples, noise)
    }

    /// Score against held-out counts; the uncertainty area is averaged
    /// over an `n_test_points`-per-dimension grid spanning the validation
    /// parameters. The report also carries the closed-form marginal.
    pub fn evaluate(
        &self,
        val: &ObservationSet,
        n_posterior_samples: usize,
        n_test_points: usize,
        seed: u64,
    ) -> Result<EvaluationReport> {
        let mut noise = NoiseSource::new(seed);
        let grid = test_grid(&val.parameters, n_test_points)?;
        let mut report = evaluate_with(val, &grid, |x_nd| {
            self.posterior_samples(x_nd, n_posterior_samples, &mut noise)
        })?;
        let marginal = self.predictive_probability(&val.parameters)?.to_array1()?;
        report.marginal = Some(marginal.to_vec());
        Ok(report)
    }

    pub fn meta(&self) -> ArtifactMeta {
        ArtifactMeta {
            method: Method::SviGp,
            input_dim: self.scaler.dim(),
            n_trials: self.n_trials,
            scaler: self.scaler.clone(),
            model: ModelMeta::Gp {
                config: self.config.clone(),
                inducing_points: self
                    .inducing_points
                    .outer_iter()
                    .map(|r| r.to_vec())
                    .collect(),
            },
        }
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let paths = ArtifactPaths::new(prefix);
        self.meta().write(&paths)?;
        self.store.save(&paths.params)?;
        info!("saved SVI-GP to {}", paths.params);
        Ok(())
    }

    pub fn load(prefix: &str) -> Result<Self> {
        let paths = ArtifactPaths::new(prefix);
        let meta = ArtifactMeta::read(&paths)?;
        Self::from_meta(meta, &paths)
    }

    pub(crate) fn from_meta(meta: ArtifactMeta, paths: &ArtifactPaths) -> Result<Self> {
        let ModelMeta::Gp {
            config,
            inducing_points,
        } = meta.model
        else {
            return Err(config_err!("{} does not describe a GP", paths.meta));
        };

        let m = inducing_points.len();
        let d = inducing_points.first().map(|r| r.len()).unwrap_or(0);
        if d != meta.input_dim {
            return Err(config_err!("inducing points have {} columns, expected {}", d, meta.input_dim));
        }
        let inducing = Array2::from_shape_vec((m, d), inducing_points.concat())
            .map_err(|e| config_err!("inducing points: {}", e))?;

        let mut ret = Self::from_parts(config, meta.scaler, inducing, meta.n_trials)?;
        ret.store.load(&paths.params)?;
        info!("loaded SVI-GP from {}", paths.params);
        Ok(ret)
    }
}
