use crate::common_io::{read_to_string, write_string};
use crate::error::DataError;

use log::info;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// On-disk layout: `{"params": [[..], ..], "labels": [[0, 1, ..], ..]}`
#[derive(Serialize, Deserialize)]
struct RawDataset {
    params: Vec<Vec<f32>>,
    labels: Vec<Vec<f32>>,
}

/// Parameter points with `M` Bernoulli outcomes each.
///
/// * `parameters` - `n x d` parameter points
/// * `labels` - `n x M` 0/1 outcomes of the property at each point
#[derive(Debug, Clone)]
pub struct BernoulliDataset {
    pub parameters: Array2<f32>,
    pub labels: Array2<f32>,
}

impl BernoulliDataset {
    pub fn new(parameters: Array2<f32>, labels: Array2<f32>) -> Result<Self, DataError> {
        if parameters.nrows() == 0 || parameters.ncols() == 0 {
            return Err(DataError::Empty("parameters"));
        }
        if labels.ncols() == 0 {
            return Err(DataError::Empty("labels"));
        }
        if parameters.nrows() != labels.nrows() {
            return Err(DataError::RowMismatch {
                params: parameters.nrows(),
                labels: labels.nrows(),
            });
        }
        if let Some(((i, j), &x)) = labels.indexed_iter().find(|(_, &x)| x != 0.0 && x != 1.0) {
            return Err(DataError::NonBinaryLabel { row: i, col: j, value: x });
        }
        Ok(Self { parameters, labels })
    }

    pub fn num_points(&self) -> usize {
        self.parameters.nrows()
    }

    pub fn num_params(&self) -> usize {
        self.parameters.ncols()
    }

    pub fn num_trials(&self) -> usize {
        self.labels.ncols()
    }

    /// Read a JSON (or `.json.gz`) dataset
    pub fn from_json(file: &str) -> anyhow::Result<Self> {
        let raw: RawDataset = serde_json::from_str(&read_to_string(file)?)?;
        let parameters = rows_to_array(&raw.params, "params")?;
        let labels = rows_to_array(&raw.labels, "labels")?;
        let ret = Self::new(parameters, labels)?;
        info!(
            "read {}: {} points, {} params, {} trials",
            file,
            ret.num_points(),
            ret.num_params(),
            ret.num_trials()
        );
        Ok(ret)
    }

    pub fn to_json(&self, file: &str) -> anyhow::Result<()> {
        let raw = RawDataset {
            params: self.parameters.outer_iter().map(|r| r.to_vec()).collect(),
            labels: self.labels.outer_iter().map(|r| r.to_vec()).collect(),
        };
        write_string(&serde_json::to_string(&raw)?, file)
    }
}

fn rows_to_array(rows: &[Vec<f32>], what: &'static str) -> Result<Array2<f32>, DataError> {
    let nrows = rows.len();
    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(DataError::Ragged(what));
    }
    let data = rows.iter().flatten().copied().collect::<Vec<_>>();
    Array2::from_shape_vec((nrows, ncols), data).map_err(|_| DataError::Ragged(what))
}

/// Aggregated Binomial observations: `T[i]` successes out of `M` trials
/// at parameter point `i`.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    pub parameters: Array2<f32>,
    pub counts: Array1<f32>,
    pub n_trials: usize,
}

impl ObservationSet {
    pub fn new(
        parameters: Array2<f32>,
        counts: Array1<f32>,
        n_trials: usize,
    ) -> Result<Self, DataError> {
        if parameters.nrows() == 0 {
            return Err(DataError::Empty("parameters"));
        }
        if n_trials == 0 {
            return Err(DataError::Empty("trials"));
        }
        if parameters.nrows() != counts.len() {
            return Err(DataError::RowMismatch {
                params: parameters.nrows(),
                labels: counts.len(),
            });
        }
        let m = n_trials as f32;
        if let Some((i, &t)) = counts
            .indexed_iter()
            .find(|(_, &t)| !(0.0..=m).contains(&t) || t.fract() != 0.0)
        {
            return Err(DataError::CountOutOfRange { row: i, count: t, n_trials });
        }
        Ok(Self {
            parameters,
            counts,
            n_trials,
        })
    }

    /// Success count per point is the row-sum of the Bernoulli labels
    pub fn from_bernoulli(data: &BernoulliDataset) -> Result<Self, DataError> {
        let counts = data.labels.sum_axis(Axis(1));
        Self::new(data.parameters.clone(), counts, data.num_trials())
    }

    pub fn num_points(&self) -> usize {
        self.parameters.nrows()
    }

    pub fn num_params(&self) -> usize {
        self.parameters.ncols()
    }

    /// Empirical satisfaction fraction `T / M`
    pub fn empirical_satisfaction(&self) -> Array1<f32> {
        self.counts.mapv(|t| t / self.n_trials as f32)
    }

    /// Flatten into `n * M` single-trial observations, each parameter row
    /// repeated `M` times with `T` ones followed by `M - T` zeros.
    pub fn to_bernoulli_points(&self) -> ObservationSet {
        let (n, d) = self.parameters.dim();
        let m = self.n_trials;

        let mut params = Array2::<f32>::zeros((n * m, d));
        let mut outcomes = Array1::<f32>::zeros(n * m);

        for i in 0..n {
            let t = self.counts[i] as usize;
            for j in 0..m {
                params.row_mut(i * m + j).assign(&self.parameters.row(i));
                if j < t {
                    outcomes[i * m + j] = 1.0;
                }
            }
        }

        ObservationSet {
            parameters: params,
            counts: outcomes,
            n_trials: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> BernoulliDataset {
        let params = array![[0.1_f32], [0.2], [0.3]];
        let labels = array![[1_f32, 0., 0., 1.], [0., 0., 0., 0.], [1., 1., 1., 1.]];
        BernoulliDataset::new(params, labels).expect("toy")
    }

    #[test]
    fn counts_are_row_sums() -> anyhow::Result<()> {
        let obs = ObservationSet::from_bernoulli(&toy())?;
        assert_eq!(obs.n_trials, 4);
        assert_eq!(obs.counts.to_vec(), vec![2., 0., 4.]);
        assert!(obs.counts.iter().all(|&t| (0.0..=4.0).contains(&t)));
        assert_eq!(obs.empirical_satisfaction().to_vec(), vec![0.5, 0., 1.]);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_counts() {
        let params = array![[0.0_f32], [1.0]];
        let counts = array![3_f32, 11.];
        let err = ObservationSet::new(params, counts, 10).unwrap_err();
        assert!(matches!(err, DataError::CountOutOfRange { row: 1, .. }));
    }

    #[test]
    fn rejects_non_binary_labels() {
        let params = array![[0.0_f32]];
        let labels = array![[1_f32, 2.]];
        assert!(BernoulliDataset::new(params, labels).is_err());
    }

    #[test]
    fn bernoulli_expansion_preserves_counts() -> anyhow::Result<()> {
        let obs = ObservationSet::from_bernoulli(&toy())?;
        let flat = obs.to_bernoulli_points();
        assert_eq!(flat.num_points(), 12);
        assert_eq!(flat.n_trials, 1);
        assert_eq!(flat.counts.sum(), obs.counts.sum());
        assert_eq!(flat.parameters[[5, 0]], 0.2);
        Ok(())
    }

    #[test]
    fn json_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("toy.json.gz");
        let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

        let data = toy();
        data.to_json(file)?;
        let back = BernoulliDataset::from_json(file)?;
        assert_eq!(back.parameters, data.parameters);
        assert_eq!(back.labels, data.labels);
        Ok(())
    }
}
