use crate::dataset::BernoulliDataset;
use crate::error::DataError;

use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution};
use rayon::prelude::*;

/// Draw `n_trials` Bernoulli outcomes at each row of `params_nd` with
/// success probability `prob_fn(row)`.
///
/// Row `i` uses its own generator seeded with `rseed + i`, so the result
/// does not depend on the rayon schedule.
pub fn simulate_dataset<F>(
    params_nd: &Array2<f32>,
    n_trials: usize,
    prob_fn: F,
    rseed: u64,
) -> Result<BernoulliDataset, DataError>
where
    F: Fn(ArrayView1<f32>) -> f64 + Sync,
{
    let n = params_nd.nrows();

    let rows = (0..n)
        .into_par_iter()
        .map(|i| {
            let p = prob_fn(params_nd.row(i)).clamp(0.0, 1.0);
            let mut rng = StdRng::seed_from_u64(rseed + i as u64);
            let coin = Bernoulli::new(p).map_err(|_| DataError::InvalidProbability { row: i })?;
            Ok((0..n_trials)
                .map(|_| if coin.sample(&mut rng) { 1_f32 } else { 0_f32 })
                .collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>, DataError>>()?;

    let labels = Array2::from_shape_vec((n, n_trials), rows.into_iter().flatten().collect())
        .map_err(|_| DataError::Ragged("labels"))?;

    BernoulliDataset::new(params_nd.clone(), labels)
}
