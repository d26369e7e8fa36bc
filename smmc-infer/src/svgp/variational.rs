use crate::error::Result;
use crate::linalg::diag;
use crate::params::ParamStore;

use candle_core::Tensor;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Shape of the covariance of `q(u)`
#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VariationalFamily {
    /// full covariance through a lower-triangular factor
    #[default]
    Cholesky,
    /// diagonal covariance
    MeanField,
}

/// How `q(u)` is tied to the prior at the inducing points
#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VariationalStrategy {
    /// `u = L_uu v` with `q(v) = N(m, S)` and prior `N(0, I)` on `v`
    #[default]
    Whitened,
    /// `q(u) = N(m, S)` directly against `N(0, K_uu)`
    Unwhitened,
}

enum CovarianceFactor {
    Cholesky { raw_tril: Tensor, mask: Tensor },
    MeanField { ln_std: Tensor },
}

/// `q = N(m, L_S L_Sᵀ)` over `M` inducing values
pub struct InducingDistribution {
    mean: Tensor,
    factor: CovarianceFactor,
    num_inducing: usize,
}

impl InducingDistribution {
    /// Starts at `N(0, I)`
    pub fn new(
        store: &mut ParamStore,
        prefix: &str,
        num_inducing: usize,
        family: VariationalFamily,
    ) -> Result<Self> {
        let (dtype, dev) = (store.dtype(), store.device().clone());

        let mean = store.register(
            &format!("{}.mean", prefix),
            &Tensor::zeros((num_inducing, 1), dtype, &dev)?,
        )?;

        let factor = match family {
            VariationalFamily::Cholesky => CovarianceFactor::Cholesky {
                raw_tril: store.register(
                    &format!("{}.chol", prefix),
                    &Tensor::eye(num_inducing, dtype, &dev)?,
                )?,
                mask: Tensor::tril2(num_inducing, dtype, &dev)?,
            },
            VariationalFamily::MeanField => CovarianceFactor::MeanField {
                ln_std: store.register(
                    &format!("{}.ln_std", prefix),
                    &Tensor::zeros(num_inducing, dtype, &dev)?,
                )?,
            },
        };

        Ok(Self {
            mean,
            factor,
            num_inducing,
        })
    }

    pub fn num_inducing(&self) -> usize {
        self.num_inducing
    }

    /// shape (M, 1)
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// Lower-triangular `L_S`, shape (M, M)
    pub fn scale_tril(&self) -> Result<Tensor> {
        match &self.factor {
            CovarianceFactor::Cholesky { raw_tril, mask } => Ok(raw_tril.mul(mask)?),
            CovarianceFactor::MeanField { ln_std } => {
                let m = self.num_inducing;
                let eye = Tensor::eye(m, ln_std.dtype(), ln_std.device())?;
                Ok(eye.broadcast_mul(&ln_std.exp()?.unsqueeze(1)?)?)
            }
        }
    }

    /// `log |S|`
    pub fn log_det_covariance(&self) -> Result<Tensor> {
        match &self.factor {
            CovarianceFactor::Cholesky { .. } => {
                let d = diag(&self.scale_tril()?)?.abs()?.maximum(1e-10)?;
                Ok((d.log()?.sum_all()? * 2.0)?)
            }
            CovarianceFactor::MeanField { ln_std } => Ok((ln_std.sum_all()? * 2.0)?),
        }
    }

    /// `tr S = ‖L_S‖²_F`
    pub fn trace_covariance(&self) -> Result<Tensor> {
        Ok(self.scale_tril()?.sqr()?.sum_all()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device};

    #[test]
    fn both_families_start_at_identity() -> Result<()> {
        for family in [VariationalFamily::Cholesky, VariationalFamily::MeanField] {
            let mut store = ParamStore::new(DType::F64, Device::Cpu);
            let q = InducingDistribution::new(&mut store, "q", 4, family)?;
            let l = q.scale_tril()?.to_vec2::<f64>()?;
            for (i, row) in l.iter().enumerate() {
                for (j, &x) in row.iter().enumerate() {
                    assert_eq!(x, if i == j { 1.0 } else { 0.0 });
                }
            }
            let logdet: f64 = q.log_det_covariance()?.to_scalar()?;
            let tr: f64 = q.trace_covariance()?.to_scalar()?;
            assert_abs_diff_eq!(logdet, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(tr, 4.0, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn upper_triangle_is_masked_out() -> Result<()> {
        let mut store = ParamStore::new(DType::F64, Device::Cpu);
        let q = InducingDistribution::new(&mut store, "q", 3, VariationalFamily::Cholesky)?;
        for v in store.all_vars() {
            if v.dims() == [3, 3] {
                v.set(&Tensor::ones((3, 3), DType::F64, &Device::Cpu)?)?;
            }
        }
        let l = q.scale_tril()?.to_vec2::<f64>()?;
        assert_eq!(l[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(l[2], vec![1.0, 1.0, 1.0]);
        Ok(())
    }
}
