use crate::artifact::{ArtifactMeta, ArtifactPaths, ModelMeta};
use crate::bnn::model::{BayesianNetwork, PredictiveSamples};
use crate::bnn::network::{Architecture, NetworkSpec};
use crate::error::{config_err, Result, SmmcError};
use crate::evaluate::{evaluate_with, EvaluationReport};
use crate::likelihood::LikelihoodKind;
use crate::noise::NoiseSource;
use crate::params::ParamStore;
use crate::pipeline::Method;
use crate::tensor_util::ToTensor;
use crate::train::TrainConfig;

use candle_core::{DType, Device, Tensor};
use log::info;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smmc_data::{test_grid, MinMaxScaler, ObservationSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BnnConfig {
    pub architecture: Architecture,
    pub hidden_dim: usize,
    pub likelihood: LikelihoodKind,
    /// reparameterised weight draws per gradient step
    pub num_particles: usize,
}

impl Default for BnnConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::ThreeLayer,
            hidden_dim: 30,
            likelihood: LikelihoodKind::Binomial,
            num_particles: 1,
        }
    }
}

/// Weight-space variational BNN surrogate with its input scaling
pub struct SviBnn {
    store: ParamStore,
    network: BayesianNetwork,
    scaler: MinMaxScaler,
    config: BnnConfig,
    n_trials: usize,
}

impl SviBnn {
    /// Fix the input scaling from `train` and draw the initial guide
    /// parameters from `seed`.
    pub fn new(train: &ObservationSet, config: BnnConfig, seed: u64) -> Result<Self> {
        let scaler = MinMaxScaler::fit(&train.parameters)?;
        Self::from_parts(config, scaler, train.n_trials, seed)
    }

    fn from_parts(config: BnnConfig, scaler: MinMaxScaler, n_trials: usize, seed: u64) -> Result<Self> {
        if config.likelihood == LikelihoodKind::Poisson {
            return Err(SmmcError::Unsupported("Poisson observation model".into()));
        }
        let spec = NetworkSpec::new(scaler.dim(), config.hidden_dim, config.architecture);
        let mut store = ParamStore::new(DType::F32, Device::Cpu);
        let network = BayesianNetwork::new(&mut store, spec, &mut NoiseSource::new(seed))?;
        Ok(Self {
            store,
            network,
            scaler,
            config,
            n_trials,
        })
    }

    pub fn config(&self) -> &BnnConfig {
        &self.config
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn network(&self) -> &BayesianNetwork {
        &self.network
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
        let m = self.config.likelihood.trials_per_observation(self.n_trials);

        info!(
            "SVI-BNN ({:?} likelihood, {:?}, {} hidden)",
            self.config.likelihood, self.config.architecture, self.config.hidden_dim
        );
        self.network.train(
            &self.store,
            &x_nd,
            &y_n,
            m,
            self.config.num_particles,
            train_config,
        )
    }

    /// Posterior predictive draws at unscaled parameter points
    pub fn predict(
        &self,
        x_nd: &Array2<f32>,
        n_samples: usize,
        noise: &mut NoiseSource,
    ) -> Result<PredictiveSamples> {
        self.network.forward(&self.scaled(x_nd)?, n_samples, noise)
    }

    /// Score against held-out counts over a grid spanning the validation
    /// parameters
    pub fn evaluate(
        &self,
        val: &ObservationSet,
        n_posterior_samples: usize,
        n_test_points: usize,
        seed: u64,
    ) -> Result<EvaluationReport> {
        let mut noise = NoiseSource::new(seed);
        let grid = test_grid(&val.parameters, n_test_points)?;
        evaluate_with(val, &grid, |x_nd| {
            Ok(self.predict(x_nd, n_posterior_samples, &mut noise)?.samples)
        })
    }

    pub fn meta(&self) -> ArtifactMeta {
        ArtifactMeta {
            method: Method::SviBnn,
            input_dim: self.scaler.dim(),
            n_trials: self.n_trials,
            scaler: self.scaler.clone(),
            model: ModelMeta::Bnn {
                config: self.config.clone(),
            },
        }
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let paths = ArtifactPaths::new(prefix);
        self.meta().write(&paths)?;
        self.store.save(&paths.params)?;
        info!("saved SVI-BNN to {}", paths.params);
        Ok(())
    }

    pub fn load(prefix: &str) -> Result<Self> {
        let paths = ArtifactPaths::new(prefix);
        let meta = ArtifactMeta::read(&paths)?;
        Self::from_meta(meta, &paths)
    }

    pub(crate) fn from_meta(meta: ArtifactMeta, paths: &ArtifactPaths) -> Result<Self> {
        let ModelMeta::Bnn { config } = meta.model else {
            return Err(config_err!("{} does not describe a BNN", paths.meta));
        };
        // every guide parameter is overwritten by the load
        let mut ret = Self::from_parts(config, meta.scaler, meta.n_trials, 0)?;
        ret.store.load(&paths.params)?;
        info!("loaded SVI-BNN from {}", paths.params);
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisson_is_unsupported() -> anyhow::Result<()> {
        let train = ObservationSet::new(array![[0.0_f32], [1.0]], array![1.0_f32, 2.0], 4)?;
        let config = BnnConfig {
            likelihood: LikelihoodKind::Poisson,
            ..Default::default()
        };
        assert!(matches!(
            SviBnn::new(&train, config, 0),
            Err(SmmcError::Unsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn bernoulli_training_uses_single_trials() -> anyhow::Result<()> {
        let train = ObservationSet::new(array![[0.0_f32], [1.0]], array![1.0_f32, 3.0], 4)?;
        let config = BnnConfig {
            likelihood: LikelihoodKind::Bernoulli,
            hidden_dim: 4,
            ..Default::default()
        };
        let mut bnn = SviBnn::new(&train, config, 1)?;
        let tc = TrainConfig {
            num_epochs: 3,
            show_progress: false,
            ..Default::default()
        };
        let trace = bnn.fit(&train, &tc)?;
        assert_eq!(trace.len(), 3);
        assert!(trace.iter().all(|l| l.is_finite()));
        Ok(())
    }

    #[test]
    fn test_grid_follows_validation_range() -> anyhow::Result<()> {
        let train = ObservationSet::new(array![[0.0_f32], [1.0]], array![1.0_f32, 3.0], 4)?;
        let config = BnnConfig {
            hidden_dim: 4,
            ..Default::default()
        };
        let bnn = SviBnn::new(&train, config, 0)?;

        let val = ObservationSet::new(array![[0.3_f32], [0.4]], array![2.0_f32, 2.0], 4)?;
        let report = bnn.evaluate(&val, 16, 5, 0)?;
        let lo = report.test_points.iter().map(|r| r[0]).fold(f32::INFINITY, f32::min);
        let hi = report.test_points.iter().map(|r| r[0]).fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(report.test_points.len(), 5);
        approx::assert_abs_diff_eq!(lo, 0.3, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(hi, 0.4, epsilon = 1e-6);
        assert!(report.marginal.is_none());
        Ok(())
    }
}
