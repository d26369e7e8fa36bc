//! Boundary operations: train on data, save/load artifacts, predict and
//! evaluate, whatever the surrogate.

use crate::artifact::{write_training_time, ArtifactMeta, ArtifactPaths};
use crate::bnn::{BnnConfig, SviBnn};
use crate::error::{Result, SmmcError};
use crate::evaluate::{EvaluationReport, PosteriorSummary};
use crate::noise::NoiseSource;
use crate::svgp::{GpConfig, SviGp};
use crate::train::TrainConfig;

use clap::ValueEnum;
use log::info;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smmc_data::ObservationSet;
use std::time::{Duration, Instant};

#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// expectation-propagation GP; needs an external backend
    EpGp,
    SviGp,
    SviBnn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitConfig {
    pub gp: GpConfig,
    pub bnn: BnnConfig,
    pub train: TrainConfig,
}

/// A trained surrogate
pub enum SmmcModel {
    Gp(SviGp),
    Bnn(SviBnn),
}

pub struct Fitted {
    pub model: SmmcModel,
    pub loss_trace: Vec<f32>,
    pub training_time: Duration,
}

impl Fitted {
    /// Parameters, metadata and the training-time record
    pub fn save(&self, prefix: &str) -> Result<()> {
        self.model.save(prefix)?;
        write_training_time(&ArtifactPaths::new(prefix), self.training_time)
    }
}

impl SmmcModel {
    pub fn fit(method: Method, train: &ObservationSet, config: &FitConfig) -> Result<Fitted> {
        let start = Instant::now();
        let (model, loss_trace) = match method {
            Method::EpGp => {
                return Err(SmmcError::Unsupported(
                    "EP-GP inference is provided by an external backend".into(),
                ))
            }
            Method::SviGp => {
                let mut gp = SviGp::new(train, config.gp.clone())?;
                let trace = gp.fit(train, &config.train)?;
                (SmmcModel::Gp(gp), trace)
            }
            Method::SviBnn => {
                let mut bnn = SviBnn::new(train, config.bnn.clone(), config.train.seed)?;
                let trace = bnn.fit(train, &config.train)?;
                (SmmcModel::Bnn(bnn), trace)
            }
        };
        let training_time = start.elapsed();
        info!("training took {:.2}s", training_time.as_secs_f64());

        Ok(Fitted {
            model,
            loss_trace,
            training_time,
        })
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Gp(_) => Method::SviGp,
            Self::Bnn(_) => Method::SviBnn,
        }
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        match self {
            Self::Gp(gp) => gp.save(prefix),
            Self::Bnn(bnn) => bnn.save(prefix),
        }
    }

    pub fn load(prefix: &str) -> Result<Self> {
        let paths = ArtifactPaths::new(prefix);
        let meta = ArtifactMeta::read(&paths)?;
        match meta.method {
            Method::SviGp => Ok(Self::Gp(SviGp::from_meta(meta, &paths)?)),
            Method::SviBnn => Ok(Self::Bnn(SviBnn::from_meta(meta, &paths)?)),
            Method::EpGp => Err(SmmcError::Unsupported(
                "EP-GP artifacts come from an external backend".into(),
            )),
        }
    }

    /// Posterior predictive summary of the satisfaction probability at
    /// unscaled parameter points
    pub fn predict(&self, x_nd: &Array2<f32>, n_samples: usize, seed: u64) -> Result<PosteriorSummary> {
        let mut noise = NoiseSource::new(seed);
        let samples = match self {
            Self::Gp(gp) => gp.posterior_samples(x_nd, n_samples, &mut noise)?,
            Self::Bnn(bnn) => bnn.predict(x_nd, n_samples, &mut noise)?.samples,
        };
        PosteriorSummary::from_samples(&samples)
    }

    pub fn evaluate(
        &self,
        val: &ObservationSet,
        n_posterior_samples: usize,
        n_test_points: usize,
        seed: u64,
    ) -> Result<EvaluationReport> {
        match self {
            Self::Gp(gp) => gp.evaluate(val, n_posterior_samples, n_test_points, seed),
            Self::Bnn(bnn) => bnn.evaluate(val, n_posterior_samples, n_test_points, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ep_gp_is_not_built_here() -> anyhow::Result<()> {
        let train = ObservationSet::new(array![[0.0_f32], [1.0]], array![1.0_f32, 2.0], 4)?;
        let res = SmmcModel::fit(Method::EpGp, &train, &FitConfig::default());
        assert!(matches!(res, Err(SmmcError::Unsupported(_))));
        Ok(())
    }
}
