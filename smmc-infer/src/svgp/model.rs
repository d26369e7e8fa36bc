use crate::error::{config_err, Result};
use crate::likelihood::ObservationLikelihood;
use crate::linalg::{add_jitter, cholesky, log_det_from_cholesky, solve_lower, solve_lower_transpose};
use crate::noise::NoiseSource;
use crate::ops::normal_cdf;
use crate::params::ParamStore;
use crate::svgp::kernel::RbfKernel;
use crate::svgp::variational::{InducingDistribution, VariationalFamily, VariationalStrategy};

use candle_core::Tensor;

/// Predictive variances are floored here
const MIN_VARIANCE: f64 = 1e-6;

/// Gaussian over latent `f` at a batch of inputs, marginal per point
#[derive(Debug, Clone)]
pub struct LatentPosterior {
    /// shape (n,)
    pub mean: Tensor,
    /// shape (n,)
    pub var: Tensor,
}

/// Sparse variational GP over a fixed set of inducing locations `Z`.
///
/// ```text
/// A = L⁻¹ K_uz                   (L Lᵀ = K_uu + jitter I)
/// whitened:    P = A
/// unwhitened:  P = L⁻ᵀ A = K_uu⁻¹ K_uz
/// mean(x) = Pᵀ m
/// var(x)  = k(x, x) - Σ A² + Σ (L_Sᵀ P)²
/// ```
pub struct SparseGp {
    kernel: RbfKernel,
    variational: InducingDistribution,
    inducing_points: Tensor,
    strategy: VariationalStrategy,
    jitter: f64,
}

/// Shared pieces of one prediction
struct Projection {
    /// `L⁻¹ K_uz`, shape (M, n)
    a_mn: Tensor,
    /// `L_Sᵀ P`, shape (M, n)
    s_mn: Tensor,
    /// `Pᵀ m`, shape (n,)
    mean_n: Tensor,
}

impl SparseGp {
    /// # Arguments
    /// * `inducing_md` - inducing locations in the scaled input space, held fixed
    pub fn new(
        store: &mut ParamStore,
        inducing_md: Tensor,
        family: VariationalFamily,
        strategy: VariationalStrategy,
        jitter: f64,
    ) -> Result<Self> {
        let (m, d) = inducing_md.dims2()?;
        if m == 0 || d == 0 {
            return Err(config_err!("need at least one inducing point of positive dimension"));
        }
        let inducing_points = inducing_md
            .to_dtype(store.dtype())?
            .to_device(store.device())?;

        Ok(Self {
            kernel: RbfKernel::new(store, "kernel", d)?,
            variational: InducingDistribution::new(store, "variational", m, family)?,
            inducing_points,
            strategy,
            jitter,
        })
    }

    pub fn num_inducing(&self) -> usize {
        self.variational.num_inducing()
    }

    pub fn input_dim(&self) -> usize {
        self.inducing_points.dims()[1]
    }

    pub fn kernel(&self) -> &RbfKernel {
        &self.kernel
    }

    pub fn variational(&self) -> &InducingDistribution {
        &self.variational
    }

    pub fn inducing_points(&self) -> &Tensor {
        &self.inducing_points
    }

    fn chol_uu(&self) -> Result<Tensor> {
        let k_uu = self.kernel.forward(&self.inducing_points, &self.inducing_points)?;
        cholesky(&add_jitter(&k_uu, self.jitter)?)
    }

    fn check_input(&self, x_nd: &Tensor) -> Result<()> {
        let (_, d) = x_nd.dims2()?;
        if d != self.input_dim() {
            return Err(config_err!(
                "inputs have {} columns, the model was built for {}",
                d,
                self.input_dim()
            ));
        }
        Ok(())
    }

    fn project(&self, x_nd: &Tensor) -> Result<Projection> {
        self.check_input(x_nd)?;
        let l_mm = self.chol_uu()?;
        let k_un = self.kernel.forward(&self.inducing_points, x_nd)?;
        let a_mn = solve_lower(&l_mm, &k_un)?;

        let p_mn = match self.strategy {
            VariationalStrategy::Whitened => a_mn.clone(),
            VariationalStrategy::Unwhitened => solve_lower_transpose(&l_mm, &a_mn)?,
        };

        let ls_mm = self.variational.scale_tril()?;
        let s_mn = ls_mm.t()?.contiguous()?.matmul(&p_mn)?;
        let mean_n = p_mn
            .t()?
            .contiguous()?
            .matmul(self.variational.mean())?
            .squeeze(1)?;

        Ok(Projection { a_mn, s_mn, mean_n })
    }

    /// Marginal Gaussian over `f(x)` at each row of `x_nd`. Deterministic.
    pub fn predict(&self, x_nd: &Tensor) -> Result<LatentPosterior> {
        let proj = self.project(x_nd)?;
        let var = self
            .kernel
            .diag(x_nd)?
            .sub(&proj.a_mn.sqr()?.sum(0)?)?
            .add(&proj.s_mn.sqr()?.sum(0)?)?
            .maximum(MIN_VARIANCE)?;
        Ok(LatentPosterior {
            mean: proj.mean_n,
            var,
        })
    }

    /// Mean and full `(n, n)` covariance of `f(x)`
    pub fn predict_full(&self, x_nd: &Tensor) -> Result<(Tensor, Tensor)> {
        let proj = self.project(x_nd)?;
        let a_nm = proj.a_mn.t()?.contiguous()?;
        let s_nm = proj.s_mn.t()?.contiguous()?;
        let cov = self
            .kernel
            .forward(x_nd, x_nd)?
            .sub(&a_nm.matmul(&proj.a_mn)?)?
            .add(&s_nm.matmul(&proj.s_mn)?)?;
        Ok((proj.mean_n, cov))
    }

    /// `KL(q(u) || p(u))`
    ///
    /// ```text
    /// whitened:   ½ [tr S + mᵀm - M - log|S|]
    /// unwhitened: ½ [‖L⁻¹ L_S‖²_F + ‖L⁻¹ m‖² - M + log|K_uu| - log|S|]
    /// ```
    pub fn kl_divergence(&self) -> Result<Tensor> {
        let m = self.num_inducing() as f64;
        let mu = self.variational.mean();
        let log_det_s = self.variational.log_det_covariance()?;

        let twice_kl = match self.strategy {
            VariationalStrategy::Whitened => self
                .variational
                .trace_covariance()?
                .add(&mu.sqr()?.sum_all()?)?
                .sub(&log_det_s)?,
            VariationalStrategy::Unwhitened => {
                let l_mm = self.chol_uu()?;
                let trace = solve_lower(&l_mm, &self.variational.scale_tril()?)?
                    .sqr()?
                    .sum_all()?;
                let maha = solve_lower(&l_mm, mu)?.sqr()?.sum_all()?;
                trace
                    .add(&maha)?
                    .add(&log_det_from_cholesky(&l_mm)?)?
                    .sub(&log_det_s)?
            }
        };
        Ok(((twice_kl - m)? * 0.5)?)
    }

    /// Draws of `p = Φ(f)` with `f ~ N(mean, var)` independently per point.
    ///
    /// # Returns
    /// shape (n_samples, n)
    pub fn posterior_samples(
        &self,
        x_nd: &Tensor,
        n_samples: usize,
        noise: &mut NoiseSource,
    ) -> Result<Tensor> {
        let post = self.predict(x_nd)?;
        let n = post.mean.dim(0)?;
        let eps_sn = noise.standard_normal((n_samples, n), post.mean.dtype(), post.mean.device())?;
        let f_sn = eps_sn
            .broadcast_mul(&post.var.sqrt()?.unsqueeze(0)?)?
            .broadcast_add(&post.mean.unsqueeze(0)?)?;
        Ok(normal_cdf(&f_sn)?)
    }

    /// Closed-form predictive probability `Φ(mean / sqrt(1 + var))`
    pub fn predictive_probability(
        &self,
        x_nd: &Tensor,
        likelihood: &dyn ObservationLikelihood,
    ) -> Result<Tensor> {
        let post = self.predict(x_nd)?;
        Ok(likelihood.marginal(&post.mean, &post.var)?.probs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device};

    fn inducing() -> candle_core::Result<Tensor> {
        Tensor::new(&[[-1.0f64], [-0.5], [0.0], [0.5], [1.0]], &Device::Cpu)
    }

    fn build(strategy: VariationalStrategy, family: VariationalFamily) -> Result<(ParamStore, SparseGp)> {
        let mut store = ParamStore::new(DType::F64, Device::Cpu);
        let gp = SparseGp::new(&mut store, inducing()?, family, strategy, 1e-4)?;
        Ok((store, gp))
    }

    #[test]
    fn whitened_prior_init_has_zero_kl_and_prior_predictive() -> Result<()> {
        let (_, gp) = build(VariationalStrategy::Whitened, VariationalFamily::Cholesky)?;
        let kl: f64 = gp.kl_divergence()?.to_scalar()?;
        assert_abs_diff_eq!(kl, 0.0, epsilon = 1e-10);

        let x = Tensor::new(&[[-0.75f64], [0.2], [2.0]], &Device::Cpu)?;
        let post = gp.predict(&x)?;
        let s = 2f64.ln();
        for (mu, v) in post
            .mean
            .to_vec1::<f64>()?
            .into_iter()
            .zip(post.var.to_vec1::<f64>()?)
        {
            assert_abs_diff_eq!(mu, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(v, s, epsilon = 1e-8);
        }
        Ok(())
    }

    #[test]
    fn full_covariance_agrees_with_marginals() -> Result<()> {
        for strategy in [VariationalStrategy::Whitened, VariationalStrategy::Unwhitened] {
            let (_, gp) = build(strategy, VariationalFamily::Cholesky)?;
            let x = Tensor::new(&[[-0.3f64], [0.1], [0.9]], &Device::Cpu)?;
            let post = gp.predict(&x)?;
            let (mean, cov) = gp.predict_full(&x)?;
            let var = post.var.to_vec1::<f64>()?;
            let cov = cov.to_vec2::<f64>()?;
            assert_eq!(mean.to_vec1::<f64>()?, post.mean.to_vec1::<f64>()?);
            for i in 0..3 {
                assert_abs_diff_eq!(cov[i][i], var[i], epsilon = 1e-8);
                assert_abs_diff_eq!(cov[i][(i + 1) % 3], cov[(i + 1) % 3][i], epsilon = 1e-10);
            }
        }
        Ok(())
    }

    #[test]
    fn unwhitened_kl_is_positive_away_from_prior() -> Result<()> {
        let (_, gp) = build(VariationalStrategy::Unwhitened, VariationalFamily::MeanField)?;
        let kl: f64 = gp.kl_divergence()?.to_scalar()?;
        assert!(kl.is_finite() && kl > 0.0);
        Ok(())
    }

    #[test]
    fn kl_gradient_reaches_kernel() -> Result<()> {
        let (store, gp) = build(VariationalStrategy::Unwhitened, VariationalFamily::Cholesky)?;
        let grads = gp.kl_divergence()?.backward()?;
        let raw_ls = store.get("kernel.raw_lengthscale")?;
        let g = grads
            .get(&raw_ls)
            .ok_or_else(|| config_err!("no gradient for the length-scale"))?
            .sum_all()?
            .to_scalar::<f64>()?;
        assert!(g.is_finite() && g != 0.0);
        Ok(())
    }

    #[test]
    fn samples_are_seeded_probabilities() -> Result<()> {
        let (_, gp) = build(VariationalStrategy::Whitened, VariationalFamily::Cholesky)?;
        let x = Tensor::new(&[[0.0f64], [0.4]], &Device::Cpu)?;
        let a = gp.posterior_samples(&x, 50, &mut NoiseSource::new(3))?;
        let b = gp.posterior_samples(&x, 50, &mut NoiseSource::new(3))?;
        assert_eq!(a.dims(), &[50, 2]);
        let a = a.to_vec2::<f64>()?;
        assert_eq!(a, b.to_vec2::<f64>()?);
        assert!(a.iter().flatten().all(|p| (0.0..=1.0).contains(p)));
        Ok(())
    }

    #[test]
    fn rejects_wrong_input_dimension() -> Result<()> {
        let (_, gp) = build(VariationalStrategy::Whitened, VariationalFamily::Cholesky)?;
        let x = Tensor::new(&[[0.0f64, 1.0]], &Device::Cpu)?;
        assert!(matches!(gp.predict(&x), Err(crate::error::SmmcError::Config(_))));
        Ok(())
    }
}
