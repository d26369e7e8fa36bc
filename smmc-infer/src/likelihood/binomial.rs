//! Probit-link Binomial / Bernoulli observation model.

use crate::error::{config_err, Result};
use crate::likelihood::quadrature::GaussHermite;
use crate::likelihood::ObservationLikelihood;
use crate::noise::NoiseSource;
use crate::ops::{ln_binomial_coefficient, log_normal_cdf, log_sigmoid, normal_cdf};

use candle_core::{DType, Tensor};

/// Probabilities are kept this far away from 0 and 1 in `log_prob`
const PROB_EPS: f64 = 1e-6;

/// `log C(m, y)` for every element of `y`
fn ln_choose(y: &Tensor, m: usize) -> Result<Tensor> {
    let ln_c = y
        .to_dtype(DType::F64)?
        .flatten_all()?
        .to_vec1::<f64>()?
        .into_iter()
        .map(|k| ln_binomial_coefficient(m as f64, k))
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(ln_c, y.dims(), y.device())?.to_dtype(y.dtype())?)
}

fn check_counts(y: &Tensor, f: &Tensor) -> Result<()> {
    let n = y.dim(0)?;
    if y.rank() != 1 || f.dims().last() != Some(&n) {
        return Err(config_err!(
            "counts of shape {:?} do not match latent values of shape {:?}",
            y.dims(),
            f.dims()
        ));
    }
    Ok(())
}

/// Binomial log-mass with the probit link, broadcast over leading dims.
///
/// ```text
/// log p(y | f) = log C(m, y) + y log Φ(f) + (m - y) log Φ(-f)
/// ```
///
/// # Arguments
/// * `f` - latent values, shape (..., n)
/// * `y` - success counts, shape (n,)
/// * `m` - number of trials per point
pub fn probit_binomial_log_prob(f: &Tensor, y: &Tensor, m: usize) -> Result<Tensor> {
    check_counts(y, f)?;
    let log_p = log_normal_cdf(f)?;
    let log_q = log_normal_cdf(&f.neg()?)?;
    let fail = y.affine(-1.0, m as f64)?;
    Ok(log_p
        .broadcast_mul(y)?
        .add(&log_q.broadcast_mul(&fail)?)?
        .broadcast_add(&ln_choose(y, m)?)?)
}

/// Same Binomial log-mass with a logistic link on network logits `z`:
/// `log σ(z) = -softplus(-z)`, `log (1 - σ(z)) = -softplus(z)`.
pub fn binomial_logit_log_prob(z: &Tensor, y: &Tensor, m: usize) -> Result<Tensor> {
    check_counts(y, z)?;
    let log_p = log_sigmoid(z)?;
    let log_q = log_sigmoid(&z.neg()?)?;
    let fail = y.affine(-1.0, m as f64)?;
    Ok(log_p
        .broadcast_mul(y)?
        .add(&log_q.broadcast_mul(&fail)?)?
        .broadcast_add(&ln_choose(y, m)?)?)
}

/// `Binomial(n_trials, probs)`, elementwise
#[derive(Debug, Clone)]
pub struct BinomialDist {
    pub n_trials: usize,
    pub probs: Tensor,
}

impl BinomialDist {
    pub fn probs(&self) -> &Tensor {
        &self.probs
    }

    /// `m p`
    pub fn mean(&self) -> Result<Tensor> {
        Ok((&self.probs * self.n_trials as f64)?)
    }

    /// `m p (1 - p)`
    pub fn variance(&self) -> Result<Tensor> {
        let q = self.probs.affine(-1.0, 1.0)?;
        Ok((self.probs.mul(&q)? * self.n_trials as f64)?)
    }

    pub fn log_prob(&self, y: &Tensor) -> Result<Tensor> {
        check_counts(y, &self.probs)?;
        let p = self.probs.clamp(PROB_EPS, 1.0 - PROB_EPS)?;
        let log_p = p.log()?;
        let log_q = p.affine(-1.0, 1.0)?.log()?;
        let fail = y.affine(-1.0, self.n_trials as f64)?;
        Ok(log_p
            .broadcast_mul(y)?
            .add(&log_q.broadcast_mul(&fail)?)?
            .broadcast_add(&ln_choose(y, self.n_trials)?)?)
    }
}

/// Aggregated counts out of `n_trials` with `p = Φ(f)`.
///
/// The trial count is usually known only once data arrive; every
/// operation that needs it fails with a configuration error until it is
/// set.
#[derive(Debug, Clone)]
pub struct BinomialLikelihood {
    n_trials: Option<usize>,
    quadrature: GaussHermite,
}

impl BinomialLikelihood {
    pub fn new(num_quadrature: usize) -> Result<Self> {
        Ok(Self {
            n_trials: None,
            quadrature: GaussHermite::new(num_quadrature)?,
        })
    }

    pub fn with_n_trials(mut self, n_trials: usize) -> Self {
        self.n_trials = Some(n_trials);
        self
    }

    /// Monte-Carlo estimate of the expected log-likelihood, the
    /// reference against which the quadrature rule is checked.
    pub fn expected_log_prob_mc(
        &self,
        y_n: &Tensor,
        mean_n: &Tensor,
        var_n: &Tensor,
        n_samples: usize,
        noise: &mut NoiseSource,
    ) -> Result<Tensor> {
        let m = self.n_trials()?;
        let n = mean_n.dim(0)?;
        let eps_sn = noise.standard_normal((n_samples, n), mean_n.dtype(), mean_n.device())?;
        let std_1n = var_n.maximum(1e-12)?.sqrt()?.unsqueeze(0)?;
        let f_sn = eps_sn.broadcast_mul(&std_1n)?.broadcast_add(&mean_n.unsqueeze(0)?)?;
        Ok(probit_binomial_log_prob(&f_sn, y_n, m)?.mean(0)?)
    }
}

impl ObservationLikelihood for BinomialLikelihood {
    fn n_trials(&self) -> Result<usize> {
        self.n_trials
            .ok_or_else(|| config_err!("n_trials must be set on the Binomial likelihood"))
    }

    fn forward(&self, f: &Tensor) -> Result<BinomialDist> {
        Ok(BinomialDist {
            n_trials: self.n_trials()?,
            probs: normal_cdf(f)?,
        })
    }

    fn log_prob(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        probit_binomial_log_prob(f, y, self.n_trials()?)
    }

    fn expected_log_prob(&self, y_n: &Tensor, mean_n: &Tensor, var_n: &Tensor) -> Result<Tensor> {
        let m = self.n_trials()?;
        self.quadrature
            .expectation(mean_n, var_n, |f_qn| probit_binomial_log_prob(f_qn, y_n, m))
    }

    /// `p = Φ(mean / sqrt(1 + var))`
    fn marginal(&self, mean_n: &Tensor, var_n: &Tensor) -> Result<BinomialDist> {
        let scale = (var_n + 1.0)?.sqrt()?;
        Ok(BinomialDist {
            n_trials: self.n_trials()?,
            probs: normal_cdf(&mean_n.div(&scale)?)?,
        })
    }
}

/// Individual 0/1 trials; a Binomial with one trial per observation.
#[derive(Debug, Clone)]
pub struct BernoulliLikelihood {
    inner: BinomialLikelihood,
}

impl BernoulliLikelihood {
    pub fn new(num_quadrature: usize) -> Result<Self> {
        Ok(Self {
            inner: BinomialLikelihood::new(num_quadrature)?.with_n_trials(1),
        })
    }
}

impl ObservationLikelihood for BernoulliLikelihood {
    fn n_trials(&self) -> Result<usize> {
        Ok(1)
    }

    fn forward(&self, f: &Tensor) -> Result<BinomialDist> {
        self.inner.forward(f)
    }

    fn log_prob(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        self.inner.log_prob(f, y)
    }

    fn expected_log_prob(&self, y_n: &Tensor, mean_n: &Tensor, var_n: &Tensor) -> Result<Tensor> {
        self.inner.expected_log_prob(y_n, mean_n, var_n)
    }

    fn marginal(&self, mean_n: &Tensor, var_n: &Tensor) -> Result<BinomialDist> {
        self.inner.marginal(mean_n, var_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SmmcError;
    use crate::ops::normal_cdf_scalar;
    use approx::assert_abs_diff_eq;
    use candle_core::Device;

    fn t(v: &[f64]) -> Result<Tensor> {
        Ok(Tensor::new(v, &Device::Cpu)?)
    }

    #[test]
    fn missing_trials_is_a_configuration_error() -> Result<()> {
        let lik = BinomialLikelihood::new(20)?;
        let f = t(&[0.0, 1.0])?;
        assert!(matches!(lik.forward(&f), Err(SmmcError::Config(_))));
        assert!(matches!(lik.marginal(&f, &f), Err(SmmcError::Config(_))));
        Ok(())
    }

    #[test]
    fn conditional_mean_is_trials_times_link() -> Result<()> {
        let lik = BinomialLikelihood::new(20)?.with_n_trials(50);
        let dist = lik.forward(&t(&[-1.0, 0.0, 0.7])?)?;
        let mean = dist.mean()?.to_vec1::<f64>()?;
        assert_abs_diff_eq!(mean[0], 50.0 * normal_cdf_scalar(-1.0), epsilon = 1e-9);
        assert_abs_diff_eq!(mean[1], 25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mean[2], 50.0 * normal_cdf_scalar(0.7), epsilon = 1e-9);

        let var = dist.variance()?.to_vec1::<f64>()?;
        assert_abs_diff_eq!(var[1], 12.5, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn marginal_deflates_and_recovers_the_link() -> Result<()> {
        let lik = BinomialLikelihood::new(20)?.with_n_trials(10);
        let mean = t(&[1.2, -0.4])?;

        let sharp = lik.marginal(&mean, &t(&[1e-10, 1e-10])?)?.probs.to_vec1::<f64>()?;
        assert_abs_diff_eq!(sharp[0], normal_cdf_scalar(1.2), epsilon = 1e-8);
        assert_abs_diff_eq!(sharp[1], normal_cdf_scalar(-0.4), epsilon = 1e-8);

        let wide = lik.marginal(&mean, &t(&[3.0, 3.0])?)?.probs.to_vec1::<f64>()?;
        assert_abs_diff_eq!(wide[0], normal_cdf_scalar(0.6), epsilon = 1e-9);
        assert!(wide[1] > sharp[1] && wide[1] < 0.5);
        Ok(())
    }

    #[test]
    fn quadrature_agrees_with_monte_carlo() -> Result<()> {
        let lik = BinomialLikelihood::new(20)?.with_n_trials(10);
        let y = t(&[3.0, 1.0, 9.0, 0.0])?;
        let mean = t(&[0.3, -1.0, 2.0, -2.5])?;
        let var = t(&[0.5, 1.0, 0.2, 2.0])?;

        let quad = lik.expected_log_prob(&y, &mean, &var)?.to_vec1::<f64>()?;
        let mut noise = NoiseSource::new(11);
        let mc = lik
            .expected_log_prob_mc(&y, &mean, &var, 200_000, &mut noise)?
            .to_vec1::<f64>()?;

        for (a, b) in quad.iter().zip(mc.iter()) {
            assert!(a.is_finite());
            assert!((a - b).abs() < 0.05, "quadrature {} vs monte carlo {}", a, b);
        }
        Ok(())
    }

    #[test]
    fn expectation_stays_finite_in_the_tail() -> Result<()> {
        let lik = BinomialLikelihood::new(20)?.with_n_trials(100);
        let y = t(&[100.0, 0.0])?;
        let ell = lik
            .expected_log_prob(&y, &t(&[-12.0, 12.0])?, &t(&[0.5, 0.5])?)?
            .to_vec1::<f64>()?;
        assert!(ell.iter().all(|x| x.is_finite() && *x < -1000.0));
        Ok(())
    }

    #[test]
    fn bernoulli_is_single_trial_binomial() -> Result<()> {
        let bern = BernoulliLikelihood::new(20)?;
        let binom = BinomialLikelihood::new(20)?.with_n_trials(1);
        let (y, f) = (t(&[1.0, 0.0, 1.0])?, t(&[0.2, -0.3, 1.5])?);

        let a = bern.log_prob(&f, &y)?.to_vec1::<f64>()?;
        let b = binom.log_prob(&f, &y)?.to_vec1::<f64>()?;
        assert_eq!(a, b);
        assert_abs_diff_eq!(a[0], normal_cdf_scalar(0.2).ln(), epsilon = 1e-9);
        assert_abs_diff_eq!(a[1], normal_cdf_scalar(0.3).ln(), epsilon = 1e-9);

        let lm = bern.log_marginal(&y, &f, &t(&[0.1, 0.1, 0.1])?)?.to_vec1::<f64>()?;
        assert!(lm.iter().all(|x| x.is_finite() && *x < 0.0));
        Ok(())
    }

    #[test]
    fn logit_and_probit_agree_on_counts_term() -> Result<()> {
        // at z = 0 both links give p = 1/2
        let y = t(&[2.0, 5.0])?;
        let zero = t(&[0.0, 0.0])?;
        let a = binomial_logit_log_prob(&zero, &y, 5)?.to_vec1::<f64>()?;
        let b = probit_binomial_log_prob(&zero, &y, 5)?.to_vec1::<f64>()?;
        assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-9);
        assert_abs_diff_eq!(a[1], 5.0 * 0.5f64.ln(), epsilon = 1e-9);
        Ok(())
    }
}
