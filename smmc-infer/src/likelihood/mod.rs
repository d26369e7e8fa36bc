pub mod binomial;
pub mod quadrature;

pub use binomial::*;
pub use quadrature::{GaussHermite, DEFAULT_NUM_NODES};

use crate::error::{Result, SmmcError};
use candle_core::Tensor;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use smmc_data::ObservationSet;

/// Discrete observation model on top of a latent function `f`.
pub trait ObservationLikelihood: Send + Sync {
    /// Number of trials behind each observed count
    fn n_trials(&self) -> Result<usize>;

    /// Conditional distribution `p(y | f)` at latent samples `f`
    fn forward(&self, f: &Tensor) -> Result<BinomialDist>;

    /// `log p(y | f)`
    ///
    /// # Arguments
    /// * `f` - latent values, shape (..., n)
    /// * `y` - observed counts, shape (n,)
    fn log_prob(&self, f: &Tensor, y: &Tensor) -> Result<Tensor>;

    /// `E_{q(f)}[log p(y | f)]` under `q(f) = N(mean, var)`, shape (n,)
    fn expected_log_prob(&self, y_n: &Tensor, mean_n: &Tensor, var_n: &Tensor) -> Result<Tensor>;

    /// Predictive observation distribution with `f` integrated out
    fn marginal(&self, mean_n: &Tensor, var_n: &Tensor) -> Result<BinomialDist>;

    fn log_marginal(&self, y_n: &Tensor, mean_n: &Tensor, var_n: &Tensor) -> Result<Tensor> {
        self.marginal(mean_n, var_n)?.log_prob(y_n)
    }
}

#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikelihoodKind {
    Bernoulli,
    Binomial,
    Poisson,
}

impl LikelihoodKind {
    /// Observations in the layout this likelihood consumes: aggregated
    /// counts for Binomial, one row per trial for Bernoulli.
    pub fn prepare(&self, obs: &ObservationSet) -> Result<ObservationSet> {
        match self {
            Self::Bernoulli => Ok(obs.to_bernoulli_points()),
            Self::Binomial => Ok(obs.clone()),
            Self::Poisson => Err(unsupported_poisson()),
        }
    }

    pub fn build(
        &self,
        n_trials: usize,
        num_quadrature: usize,
    ) -> Result<Box<dyn ObservationLikelihood>> {
        match self {
            Self::Bernoulli => Ok(Box::new(BernoulliLikelihood::new(num_quadrature)?)),
            Self::Binomial => Ok(Box::new(
                BinomialLikelihood::new(num_quadrature)?.with_n_trials(n_trials),
            )),
            Self::Poisson => Err(unsupported_poisson()),
        }
    }

    /// Trials per prepared observation
    pub fn trials_per_observation(&self, n_trials: usize) -> usize {
        match self {
            Self::Bernoulli => 1,
            _ => n_trials,
        }
    }
}

fn unsupported_poisson() -> SmmcError {
    SmmcError::Unsupported("Poisson observation model".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn poisson_is_rejected() -> anyhow::Result<()> {
        let obs = ObservationSet::new(array![[0.0_f32]], array![1.0_f32], 2)?;
        assert!(matches!(
            LikelihoodKind::Poisson.prepare(&obs),
            Err(SmmcError::Unsupported(_))
        ));
        assert!(matches!(
            LikelihoodKind::Poisson.build(2, 20),
            Err(SmmcError::Unsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn bernoulli_flattens_trials() -> anyhow::Result<()> {
        let obs = ObservationSet::new(array![[0.0_f32], [1.0]], array![1.0_f32, 3.0], 3)?;
        let flat = LikelihoodKind::Bernoulli.prepare(&obs)?;
        assert_eq!(flat.num_points(), 6);
        assert_eq!(LikelihoodKind::Bernoulli.trials_per_observation(3), 1);

        let lik = LikelihoodKind::Bernoulli.build(3, 20)?;
        assert_eq!(lik.n_trials()?, 1);
        let lik = LikelihoodKind::Binomial.build(3, 20)?;
        assert_eq!(lik.n_trials()?, 3);
        Ok(())
    }
}
