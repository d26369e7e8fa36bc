use crate::error::Result;
use crate::likelihood::ObservationLikelihood;
use crate::noise::NoiseSource;
use crate::params::ParamStore;
use crate::svgp::model::SparseGp;
use crate::train::{optimize, TrainConfig};

use candle_core::Tensor;
use log::info;

/// Negative ELBO per observation on a minibatch
///
/// ```text
/// -( mean_b E_q[log p(y_b | f_b)] - KL(q(u) || p(u)) / N )
/// ```
///
/// # Arguments
/// * `x_bd`, `y_b` - scaled inputs and counts of the minibatch
/// * `n_total` - size of the full training set
pub fn negative_elbo(
    model: &SparseGp,
    likelihood: &dyn ObservationLikelihood,
    x_bd: &Tensor,
    y_b: &Tensor,
    n_total: usize,
) -> Result<Tensor> {
    let post = model.predict(x_bd)?;
    let ell = likelihood
        .expected_log_prob(y_b, &post.mean, &post.var)?
        .mean_all()?;
    let kl = (model.kl_divergence()? / n_total as f64)?;
    Ok(kl.sub(&ell)?)
}

/// Maximise the ELBO over the kernel hyperparameters and `q(u)`.
///
/// # Returns
/// per-epoch mean loss
pub fn train_sparse_gp(
    model: &SparseGp,
    store: &ParamStore,
    likelihood: &dyn ObservationLikelihood,
    x_nd: &Tensor,
    y_n: &Tensor,
    train_config: &TrainConfig,
) -> Result<Vec<f32>> {
    let n = x_nd.dim(0)?;
    info!(
        "training sparse GP: {} observations, {} inducing points, {} epochs",
        n,
        model.num_inducing(),
        train_config.num_epochs
    );

    let mut noise = NoiseSource::new(train_config.seed);
    optimize(store, n, train_config, &mut noise, |idx, _| {
        let x_bd = x_nd.index_select(idx, 0)?;
        let y_b = y_n.index_select(idx, 0)?;
        negative_elbo(model, likelihood, &x_bd, &y_b, n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::BinomialLikelihood;
    use crate::svgp::variational::{VariationalFamily, VariationalStrategy};
    use candle_core::{DType, Device};

    #[test]
    fn elbo_improves_on_a_monotone_curve() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::new(&[[-1.0f64], [-0.5], [0.0], [0.5], [1.0]], &dev)?;
        let y = Tensor::new(&[2.0f64, 6.0, 10.0, 14.0, 18.0], &dev)?;
        let lik = BinomialLikelihood::new(20)?.with_n_trials(20);

        let mut store = ParamStore::new(DType::F64, dev.clone());
        let gp = SparseGp::new(
            &mut store,
            x.clone(),
            VariationalFamily::Cholesky,
            VariationalStrategy::Whitened,
            1e-4,
        )?;

        let config = TrainConfig {
            learning_rate: 0.05,
            num_epochs: 100,
            show_progress: false,
            ..Default::default()
        };
        let trace = train_sparse_gp(&gp, &store, &lik, &x, &y, &config)?;
        assert_eq!(trace.len(), 100);
        assert!(trace[99] < trace[0]);

        let mean = gp.predict(&x)?.mean.to_vec1::<f64>()?;
        assert!(mean[0] < mean[2] && mean[2] < mean[4]);
        Ok(())
    }

    #[test]
    fn minibatched_training_is_reproducible() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::new(&[[-1.0f64], [-0.6], [-0.2], [0.2], [0.6], [1.0]], &dev)?;
        let y = Tensor::new(&[1.0f64, 0.0, 1.0, 1.0, 0.0, 1.0], &dev)?;
        let lik = BinomialLikelihood::new(10)?.with_n_trials(1);

        let run = || -> Result<Vec<f64>> {
            let mut store = ParamStore::new(DType::F64, dev.clone());
            let gp = SparseGp::new(
                &mut store,
                x.clone(),
                VariationalFamily::MeanField,
                VariationalStrategy::Unwhitened,
                1e-4,
            )?;
            let config = TrainConfig {
                learning_rate: 0.02,
                num_epochs: 10,
                batch_size: Some(4),
                seed: 9,
                show_progress: false,
                ..Default::default()
            };
            train_sparse_gp(&gp, &store, &lik, &x, &y, &config)?;
            Ok(gp.predict(&x)?.mean.to_vec1::<f64>()?)
        };
        assert_eq!(run()?, run()?);
        Ok(())
    }
}
