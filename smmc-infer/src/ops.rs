//! Elementwise link and density helpers shared by the likelihoods,
//! the kernel constraints and the weight-space guide.

use candle_core::{Result, Tensor};
use special::{Error as SpecialError, Gamma as SpecialGamma};
use std::f64::consts::{PI, SQRT_2};

/// Below this point `log Φ` switches to the asymptotic tail series
const LOG_NORMAL_CDF_TAIL: f64 = -4.0;

/// softplus(x) = log(1 + exp(x)), evaluated as max(x, 0) + log1p(exp(-|x|))
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    x.relu()?.add(&tail)
}

/// Inverse of softplus for a positive scalar
pub fn inv_softplus(y: f64) -> f64 {
    if y > 20.0 {
        y
    } else {
        y.exp_m1().ln()
    }
}

/// Standard normal CDF Φ(f) = (1 + erf(f / √2)) / 2
pub fn normal_cdf(f: &Tensor) -> Result<Tensor> {
    (f / SQRT_2)?.erf()?.affine(0.5, 0.5)
}

/// log Φ(f), stable into the lower tail.
///
/// ```text
/// f ≥ -4 : log((1 + erf(f/√2)) / 2)
/// f < -4 : -f²/2 - log(-f) - log(2π)/2 + log(1 - w + 3w² - 15w³ + 105w⁴),  w = 1/f²
/// ```
pub fn log_normal_cdf(f: &Tensor) -> Result<Tensor> {
    let direct = normal_cdf(&f.maximum(LOG_NORMAL_CDF_TAIL)?)?.log()?;

    let z = f.minimum(LOG_NORMAL_CDF_TAIL)?;
    let w = z.sqr()?.recip()?;
    let series = w
        .affine(105.0, -15.0)?
        .mul(&w)?
        .affine(1.0, 3.0)?
        .mul(&w)?
        .affine(1.0, -1.0)?
        .mul(&w)?
        .affine(1.0, 1.0)?
        .log()?;
    let tail = ((z.sqr()? * (-0.5))? - z.neg()?.log()?)?
        .affine(1.0, -0.5 * (2.0 * PI).ln())?
        .add(&series)?;

    f.ge(LOG_NORMAL_CDF_TAIL)?.where_cond(&direct, &tail)
}

/// log σ(z) = -softplus(-z)
pub fn log_sigmoid(z: &Tensor) -> Result<Tensor> {
    softplus(&z.neg()?)?.neg()
}

/// Scalar Φ for host-side summaries
pub fn normal_cdf_scalar(x: f64) -> f64 {
    0.5 * (1.0 + SpecialError::error(x / SQRT_2))
}

/// log C(n, k) via log-gamma
pub fn ln_binomial_coefficient(n: f64, k: f64) -> f64 {
    SpecialGamma::ln_gamma(n + 1.0).0
        - SpecialGamma::ln_gamma(k + 1.0).0
        - SpecialGamma::ln_gamma(n - k + 1.0).0
}

/// KL( N(mean, exp(lnvar)) || N(0, 1) ), summed over all elements
///
/// 0.5 * (σ² - 1 + μ² - log σ²)
pub fn gaussian_kl_standard(mean: &Tensor, lnvar: &Tensor) -> Result<Tensor> {
    let var = lnvar.exp()?;
    (((var - 1.0)? + mean.sqr()?)? - lnvar)?.sum_all()? * 0.5
}
