use crate::error::DataError;

use log::warn;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Column-wise affine map of the training range onto `[-1, 1]`.
///
/// The statistics are fixed once from the training parameters; validation
/// and test points go through the same map and may land outside `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl MinMaxScaler {
    pub fn fit(x_nd: &Array2<f32>) -> Result<Self, DataError> {
        if x_nd.nrows() == 0 {
            return Err(DataError::Empty("parameters"));
        }
        let min = x_nd
            .columns()
            .into_iter()
            .map(|c| c.fold(f32::INFINITY, |a, &b| a.min(b)))
            .collect::<Vec<_>>();
        let max = x_nd
            .columns()
            .into_iter()
            .map(|c| c.fold(f32::NEG_INFINITY, |a, &b| a.max(b)))
            .collect::<Vec<_>>();

        for (j, (lb, ub)) in min.iter().zip(max.iter()).enumerate() {
            if lb == ub {
                warn!("parameter column {} is constant ({}); it will be scaled to 0", j, lb);
            }
        }
        Ok(Self { min, max })
    }

    pub fn dim(&self) -> usize {
        self.min.len()
    }

    fn check_dim(&self, x_nd: &Array2<f32>) -> Result<(), DataError> {
        if x_nd.ncols() != self.dim() {
            return Err(DataError::DimensionMismatch {
                expected: self.dim(),
                found: x_nd.ncols(),
            });
        }
        Ok(())
    }

    /// `-1 + 2 (x - min) / (max - min)`, column by column
    pub fn transform(&self, x_nd: &Array2<f32>) -> Result<Array2<f32>, DataError> {
        self.check_dim(x_nd)?;
        let mut ret = x_nd.clone();
        for (j, mut col) in ret.columns_mut().into_iter().enumerate() {
            let (lb, ub) = (self.min[j], self.max[j]);
            if ub > lb {
                col.mapv_inplace(|x| -1.0 + 2.0 * (x - lb) / (ub - lb));
            } else {
                col.fill(0.0);
            }
        }
        Ok(ret)
    }

    pub fn inverse_transform(&self, z_nd: &Array2<f32>) -> Result<Array2<f32>, DataError> {
        self.check_dim(z_nd)?;
        let mut ret = z_nd.clone();
        for (j, mut col) in ret.columns_mut().into_iter().enumerate() {
            let (lb, ub) = (self.min[j], self.max[j]);
            col.mapv_inplace(|z| lb + (z + 1.0) * 0.5 * (ub - lb));
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_range_maps_onto_unit_box() -> anyhow::Result<()> {
        let x = array![[0.005_f32, 2.0], [0.3, 4.0], [0.1, 3.0], [0.2, 2.5]];
        let scaler = MinMaxScaler::fit(&x)?;
        let z = scaler.transform(&x)?;

        assert!(z.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        assert_eq!(z[[0, 0]], -1.0);
        assert_eq!(z[[1, 0]], 1.0);
        assert_eq!(z[[0, 1]], -1.0);
        assert_eq!(z[[1, 1]], 1.0);
        Ok(())
    }

    #[test]
    fn held_out_points_reuse_training_statistics() -> anyhow::Result<()> {
        let train = array![[0.0_f32], [10.0]];
        let scaler = MinMaxScaler::fit(&train)?;
        let z = scaler.transform(&array![[5.0_f32], [20.0]])?;
        assert_eq!(z[[0, 0]], 0.0);
        assert_eq!(z[[1, 0]], 3.0);

        let back = scaler.inverse_transform(&z)?;
        approx::assert_abs_diff_eq!(back[[1, 0]], 20.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn constant_column_and_dimension_check() -> anyhow::Result<()> {
        let x = array![[1.0_f32, 0.0], [1.0, 1.0]];
        let scaler = MinMaxScaler::fit(&x)?;
        let z = scaler.transform(&x)?;
        assert_eq!(z.column(0).to_vec(), vec![0.0, 0.0]);
        assert!(scaler.transform(&array![[1.0_f32]]).is_err());
        Ok(())
    }
}
