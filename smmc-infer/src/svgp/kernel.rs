use crate::error::Result;
use crate::ops::softplus;
use crate::params::ParamStore;

use candle_core::Tensor;

/// Squared-exponential kernel with one length-scale per input dimension
///
/// ```text
/// k(x, x') = s * exp(-0.5 Σ_j (x_j - x'_j)² / l_j²)
/// ```
///
/// Both `l` and `s` are `softplus` of unconstrained parameters that start
/// at zero.
pub struct RbfKernel {
    raw_lengthscale: Tensor,
    raw_outputscale: Tensor,
}

impl RbfKernel {
    pub fn new(store: &mut ParamStore, prefix: &str, input_dim: usize) -> Result<Self> {
        let (dtype, dev) = (store.dtype(), store.device().clone());
        let raw_lengthscale = store.register(
            &format!("{}.raw_lengthscale", prefix),
            &Tensor::zeros((1, input_dim), dtype, &dev)?,
        )?;
        let raw_outputscale = store.register(
            &format!("{}.raw_outputscale", prefix),
            &Tensor::zeros((), dtype, &dev)?,
        )?;
        Ok(Self {
            raw_lengthscale,
            raw_outputscale,
        })
    }

    /// shape (1, d)
    pub fn lengthscale(&self) -> Result<Tensor> {
        Ok(softplus(&self.raw_lengthscale)?)
    }

    /// scalar
    pub fn outputscale(&self) -> Result<Tensor> {
        Ok(softplus(&self.raw_outputscale)?)
    }

    /// Cross-covariance, shape (n, m)
    pub fn forward(&self, x1_nd: &Tensor, x2_md: &Tensor) -> Result<Tensor> {
        let ell = self.lengthscale()?;
        let a_nd = x1_nd.broadcast_div(&ell)?;
        let b_md = x2_md.broadcast_div(&ell)?;

        let a2_n1 = a_nd.sqr()?.sum_keepdim(1)?;
        let b2_1m = b_md.sqr()?.sum_keepdim(1)?.t()?;
        let ab_nm = a_nd.matmul(&b_md.t()?.contiguous()?)?;

        let sq_dist = a2_n1
            .broadcast_add(&b2_1m)?
            .sub(&(ab_nm * 2.0)?)?
            .maximum(0.0)?;

        Ok((sq_dist * -0.5)?
            .exp()?
            .broadcast_mul(&self.outputscale()?)?)
    }

    /// `k(x, x)` for every row, shape (n,)
    pub fn diag(&self, x_nd: &Tensor) -> Result<Tensor> {
        let n = x_nd.dim(0)?;
        let ones = Tensor::ones(n, x_nd.dtype(), x_nd.device())?;
        Ok(ones.broadcast_mul(&self.outputscale()?)?)
    }
}
