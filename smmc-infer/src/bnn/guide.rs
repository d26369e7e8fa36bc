use crate::bnn::network::{NetworkSpec, WeightBundle};
use crate::error::Result;
use crate::noise::NoiseSource;
use crate::ops::{gaussian_kl_standard, softplus};
use crate::params::ParamStore;

use candle_core::{DType, Device, Tensor};

struct GaussianFactor {
    name: String,
    dims: Vec<usize>,
    loc: Tensor,
    raw_scale: Tensor,
}

impl GaussianFactor {
    fn scale(&self) -> Result<Tensor> {
        Ok(softplus(&self.raw_scale)?)
    }

    /// `(S, dims..)` shape with a leading sample axis
    fn sample_dims(&self, n_samples: usize) -> Vec<usize> {
        std::iter::once(n_samples)
            .chain(self.dims.iter().copied())
            .collect()
    }
}

/// Independent Gaussian over every network tensor,
/// `w ~ N(loc, softplus(scale)²)` elementwise.
///
/// Parameters are registered as `{name}_loc` and `{name}_scale`, in the
/// order [`NetworkSpec::param_shapes`] declares.
pub struct WeightPosterior {
    factors: Vec<GaussianFactor>,
}

impl WeightPosterior {
    /// Locations and unconstrained scales both start from `N(0, 1)` draws
    pub fn new(store: &mut ParamStore, spec: &NetworkSpec, noise: &mut NoiseSource) -> Result<Self> {
        let (dtype, dev) = (store.dtype(), store.device().clone());
        let mut factors = Vec::with_capacity(spec.layers().len() * 2);

        for (name, dims) in spec.param_shapes() {
            let loc_init = noise.standard_normal(dims.as_slice(), dtype, &dev)?;
            let scale_init = noise.standard_normal(dims.as_slice(), dtype, &dev)?;
            let loc = store.register(&format!("{}_loc", name), &loc_init)?;
            let raw_scale = store.register(&format!("{}_scale", name), &scale_init)?;
            factors.push(GaussianFactor {
                name,
                dims,
                loc,
                raw_scale,
            });
        }
        Ok(Self { factors })
    }

    /// Reparameterised draws `loc + scale * ε`
    pub fn sample(&self, n_samples: usize, noise: &mut NoiseSource) -> Result<WeightBundle> {
        let mut ret = WeightBundle::new(n_samples);
        for f in &self.factors {
            let eps = noise.standard_normal(f.sample_dims(n_samples), f.loc.dtype(), f.loc.device())?;
            let w = eps
                .broadcast_mul(&f.scale()?.unsqueeze(0)?)?
                .broadcast_add(&f.loc.unsqueeze(0)?)?;
            ret.insert(&f.name, w)?;
        }
        Ok(ret)
    }

    /// `KL(q || N(0, I))` summed over every weight
    pub fn kl_divergence(&self) -> Result<Tensor> {
        let mut kl = Vec::with_capacity(self.factors.len());
        for f in &self.factors {
            let lnvar = (f.scale()?.log()? * 2.0)?;
            kl.push(gaussian_kl_standard(&f.loc, &lnvar)?);
        }
        Ok(Tensor::stack(&kl, 0)?.sum_all()?)
    }
}

/// Weights drawn from the standard-normal prior
pub fn sample_prior(
    spec: &NetworkSpec,
    n_samples: usize,
    dtype: DType,
    device: &Device,
    noise: &mut NoiseSource,
) -> Result<WeightBundle> {
    let mut ret = WeightBundle::new(n_samples);
    for (name, dims) in spec.param_shapes() {
        let shape = std::iter::once(n_samples).chain(dims).collect::<Vec<_>>();
        ret.insert(&name, noise.standard_normal(shape, dtype, device)?)?;
    }
    Ok(ret)
}
