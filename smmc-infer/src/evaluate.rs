//! Posterior predictive summaries and calibration metrics against
//! held-out counts.

use crate::error::{config_err, Result};
use crate::tensor_util::ToArray;

use candle_core::Tensor;
use log::info;
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smmc_data::ObservationSet;
use std::collections::BTreeMap;
use std::time::Instant;

/// Multiplier of the predictive std for the 95% interval
pub const Z_95: f32 = 1.96;

/// Added to the empirical fraction in the relative-error denominator
pub const RELATIVE_ERROR_EPS: f32 = 1e-6;

/// Per-point statistics of a `(S, n)` sample matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub mean: Vec<f32>,
    /// unbiased sample standard deviation
    pub std: Vec<f32>,
    pub q_lower: Vec<f32>,
    pub q_upper: Vec<f32>,
}

/// Linear interpolation between order statistics of a sorted slice
pub fn quantile(sorted: &[f32], q: f64) -> f32 {
    match sorted.len() {
        0 => f32::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = (pos - lo as f64) as f32;
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        }
    }
}

impl PosteriorSummary {
    pub fn from_samples(samples_sn: &Tensor) -> Result<Self> {
        Self::from_sample_matrix(&samples_sn.to_array2()?)
    }

    pub fn from_sample_matrix(samples_sn: &Array2<f32>) -> Result<Self> {
        let (s, _) = samples_sn.dim();
        if s == 0 {
            return Err(config_err!("need at least one posterior sample"));
        }

        let stats = samples_sn
            .columns()
            .into_iter()
            .map(|c| c.to_vec())
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|mut col| {
                let mean = col.iter().sum::<f32>() / s as f32;
                let std = if s > 1 {
                    let ss = col.iter().map(|x| (x - mean).powi(2)).sum::<f32>();
                    (ss / (s - 1) as f32).sqrt()
                } else {
                    0.0
                };
                col.sort_by(|a, b| a.total_cmp(b));
                (mean, std, quantile(&col, 0.025), quantile(&col, 0.975))
            })
            .collect::<Vec<_>>();

        Ok(Self {
            mean: stats.iter().map(|x| x.0).collect(),
            std: stats.iter().map(|x| x.1).collect(),
            q_lower: stats.iter().map(|x| x.2).collect(),
            q_upper: stats.iter().map(|x| x.3).collect(),
        })
    }

    pub fn num_points(&self) -> usize {
        self.mean.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mse: f32,
    pub mean_relative_error: f32,
    pub percent_uncovered: f32,
    pub avg_uncertainty_area: f32,
    /// seconds
    pub evaluation_time: f64,
}

impl EvaluationMetrics {
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("mse".to_string(), self.mse as f64),
            ("mean_relative_error".to_string(), self.mean_relative_error as f64),
            ("percent_uncovered".to_string(), self.percent_uncovered as f64),
            ("avg_uncertainty_area".to_string(), self.avg_uncertainty_area as f64),
            ("evaluation_time".to_string(), self.evaluation_time),
        ])
    }
}

/// Compare validation predictions with the empirical fractions `T / M`.
///
/// A point is uncovered when `|T/M - mean| > 1.96 std`. The interval
/// width `2 * 1.96 * std` is averaged over `test` (the dense grid),
/// not over the validation points.
pub fn evaluate_predictions(
    val: &ObservationSet,
    val_pred: &PosteriorSummary,
    test_pred: &PosteriorSummary,
) -> Result<EvaluationMetrics> {
    let n = val.num_points();
    if val_pred.num_points() != n {
        return Err(config_err!(
            "{} predictions for {} validation points",
            val_pred.num_points(),
            n
        ));
    }
    if test_pred.num_points() == 0 {
        return Err(config_err!("empty test grid"));
    }

    let satisf = val.empirical_satisfaction();

    let mut sq_err = 0f32;
    let mut rel_err = 0f32;
    let mut n_uncovered = 0usize;

    for (i, &truth) in satisf.iter().enumerate() {
        let dist = (truth - val_pred.mean[i]).abs();
        sq_err += dist * dist;
        rel_err += dist / (truth + RELATIVE_ERROR_EPS);
        if dist > Z_95 * val_pred.std[i] {
            n_uncovered += 1;
        }
    }

    let area = test_pred.std.iter().map(|s| 2.0 * Z_95 * s).sum::<f32>() / test_pred.num_points() as f32;

    Ok(EvaluationMetrics {
        mse: sq_err / n as f32,
        mean_relative_error: rel_err / n as f32,
        percent_uncovered: 100.0 * n_uncovered as f32 / n as f32,
        avg_uncertainty_area: area,
        evaluation_time: 0.0,
    })
}

/// Everything an evaluation run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub validation: PosteriorSummary,
    pub test_points: Vec<Vec<f32>>,
    pub test: PosteriorSummary,
    pub metrics: EvaluationMetrics,
    /// closed-form predictive probability at the validation points,
    /// for surrogates whose likelihood has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marginal: Option<Vec<f32>>,
}

/// Sample the posterior predictive at the validation points and on a
/// test grid, then score.
///
/// # Arguments
/// * `sample_fn` - unscaled query points `(n, d)` to probability samples `(S, n)`
pub fn evaluate_with<F>(
    val: &ObservationSet,
    test_points: &Array2<f32>,
    mut sample_fn: F,
) -> Result<EvaluationReport>
where
    F: FnMut(&Array2<f32>) -> Result<Tensor>,
{
    let start = Instant::now();

    let validation = PosteriorSummary::from_samples(&sample_fn(&val.parameters)?)?;
    let test = PosteriorSummary::from_samples(&sample_fn(test_points)?)?;
    let mut metrics = evaluate_predictions(val, &validation, &test)?;
    metrics.evaluation_time = start.elapsed().as_secs_f64();

    info!(
        "mse {:.3e}, relative error {:.3}, uncovered {:.1}%, uncertainty area {:.4}",
        metrics.mse, metrics.mean_relative_error, metrics.percent_uncovered, metrics.avg_uncertainty_area
    );

    Ok(EvaluationReport {
        validation,
        test_points: test_points.outer_iter().map(|r| r.to_vec()).collect(),
        test,
        metrics,
        marginal: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn summary(mean: Vec<f32>, std: Vec<f32>) -> PosteriorSummary {
        PosteriorSummary {
            q_lower: mean.clone(),
            q_upper: mean.clone(),
            mean,
            std,
        }
    }

    #[test]
    fn quantiles_interpolate() {
        let v = [0.0f32, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.5), 2.0);
        assert_abs_diff_eq!(quantile(&v, 0.025), 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(quantile(&v, 0.975), 3.9, epsilon = 1e-6);
    }

    #[test]
    fn summary_of_known_samples() -> Result<()> {
        let samples = array![[0.1_f32, 0.5], [0.3, 0.5], [0.2, 0.5]];
        let s = PosteriorSummary::from_sample_matrix(&samples)?;
        assert_abs_diff_eq!(s.mean[0], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(s.std[0], 0.1, epsilon = 1e-6);
        assert_eq!(s.std[1], 0.0);
        assert!(s.q_lower[0] < s.mean[0] && s.mean[0] < s.q_upper[0]);
        Ok(())
    }

    #[test]
    fn metrics_on_a_hand_example() -> anyhow::Result<()> {
        let val = ObservationSet::new(array![[0.0_f32], [1.0]], array![2.0_f32, 8.0], 10)?;
        let pred = summary(vec![0.25, 0.5], vec![0.05, 0.1]);
        let test = summary(vec![0.0; 4], vec![0.1, 0.1, 0.2, 0.2]);

        let m = evaluate_predictions(&val, &pred, &test)?;
        // dist = 0.05, 0.3
        assert_abs_diff_eq!(m.mse, (0.0025 + 0.09) / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.mean_relative_error, (0.25 + 0.375) / 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(m.percent_uncovered, 50.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.avg_uncertainty_area, 2.0 * 1.96 * 0.15, epsilon = 1e-6);

        let keys = m.to_map().into_keys().collect::<Vec<_>>();
        for k in ["mse", "mean_relative_error", "percent_uncovered", "avg_uncertainty_area"] {
            assert!(keys.contains(&k.to_string()));
        }
        Ok(())
    }

    #[test]
    fn relative_error_survives_zero_satisfaction() -> anyhow::Result<()> {
        let val = ObservationSet::new(array![[0.0_f32], [0.5], [1.0]], array![0.0_f32, 0.0, 0.0], 20)?;
        let pred = summary(vec![0.01, 0.0, 0.02], vec![0.01; 3]);
        let m = evaluate_predictions(&val, &pred, &pred)?;
        assert!(m.mean_relative_error.is_finite());
        assert_abs_diff_eq!(m.mean_relative_error, 0.01 / 1e-6, epsilon = 1.0);
        Ok(())
    }

    #[test]
    fn size_mismatch_is_rejected() -> anyhow::Result<()> {
        let val = ObservationSet::new(array![[0.0_f32]], array![1.0_f32], 2)?;
        let pred = summary(vec![0.5, 0.5], vec![0.1, 0.1]);
        assert!(evaluate_predictions(&val, &pred, &pred).is_err());
        Ok(())
    }
}
