use crate::bnn::guide::WeightPosterior;
use crate::bnn::network::NetworkSpec;
use crate::error::Result;
use crate::likelihood::binomial_logit_log_prob;
use crate::noise::NoiseSource;
use crate::params::ParamStore;
use crate::train::{optimize, TrainConfig};

use candle_core::Tensor;
use log::info;

/// Monte-Carlo draws of the predictive probability at a batch of points
#[derive(Debug, Clone)]
pub struct PredictiveSamples {
    /// shape (S, n)
    pub samples: Tensor,
}

impl PredictiveSamples {
    /// shape (n,)
    pub fn mean(&self) -> Result<Tensor> {
        Ok(self.samples.mean(0)?)
    }

    /// unbiased sample standard deviation, shape (n,)
    pub fn std(&self) -> Result<Tensor> {
        if self.samples.dim(0)? < 2 {
            return Ok(self.samples.get(0)?.zeros_like()?);
        }
        Ok(self.samples.var(0)?.sqrt()?)
    }
}

/// A network whose weights are all latent, with its variational
/// posterior. The network itself is only a shape; weights come from the
/// guide at every call.
pub struct BayesianNetwork {
    spec: NetworkSpec,
    guide: WeightPosterior,
}

impl BayesianNetwork {
    pub fn new(store: &mut ParamStore, spec: NetworkSpec, noise: &mut NoiseSource) -> Result<Self> {
        let guide = WeightPosterior::new(store, &spec, noise)?;
        Ok(Self { spec, guide })
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn guide(&self) -> &WeightPosterior {
        &self.guide
    }

    /// Negative ELBO per observation on a minibatch
    ///
    /// ```text
    /// -( mean_{particles, b} log Binomial(y_b | m, σ(g(x_b; w))) - KL(q(w) || N(0, I)) / N )
    /// ```
    pub fn negative_elbo(
        &self,
        x_bd: &Tensor,
        y_b: &Tensor,
        n_trials: usize,
        n_total: usize,
        num_particles: usize,
        noise: &mut NoiseSource,
    ) -> Result<Tensor> {
        let w = self.guide.sample(num_particles.max(1), noise)?;
        let z_sb = self.spec.forward_logits(&w, x_bd)?;
        let llik = binomial_logit_log_prob(&z_sb, y_b, n_trials)?.mean_all()?;
        let kl = (self.guide.kl_divergence()? / n_total as f64)?;
        Ok(kl.sub(&llik)?)
    }

    /// # Arguments
    /// * `x_nd` - scaled inputs
    /// * `y_n` - counts out of `n_trials`
    pub fn train(
        &self,
        store: &ParamStore,
        x_nd: &Tensor,
        y_n: &Tensor,
        n_trials: usize,
        num_particles: usize,
        train_config: &TrainConfig,
    ) -> Result<Vec<f32>> {
        let n = x_nd.dim(0)?;
        info!(
            "training BNN: {} observations, {} weights, {} epochs",
            n,
            self.spec.num_weights(),
            train_config.num_epochs
        );

        let mut noise = NoiseSource::new(train_config.seed);
        optimize(store, n, train_config, &mut noise, |idx, noise| {
            let x_bd = x_nd.index_select(idx, 0)?;
            let y_b = y_n.index_select(idx, 0)?;
            self.negative_elbo(&x_bd, &y_b, n_trials, n, num_particles, noise)
        })
    }

    /// `n_samples` networks drawn from the guide, evaluated in one batch
    pub fn forward(
        &self,
        x_nd: &Tensor,
        n_samples: usize,
        noise: &mut NoiseSource,
    ) -> Result<PredictiveSamples> {
        let w = self.guide.sample(n_samples, noise)?;
        Ok(PredictiveSamples {
            samples: self.spec.forward(&w, x_nd)?,
        })
    }
}
