use crate::error::DataError;
use ndarray::prelude::*;

/// `n` evenly spaced points from `lb` to `ub`, both ends included
pub fn linspace(lb: f32, ub: f32, n: usize) -> Vec<f32> {
    match n {
        0 => vec![],
        1 => vec![lb],
        _ => {
            let step = (ub - lb) / (n - 1) as f32;
            (0..n)
                .map(|i| if i == n - 1 { ub } else { lb + step * i as f32 })
                .collect()
        }
    }
}

/// Cartesian product of the per-dimension axes; the first axis varies
/// slowest, so for two axes row `i * n_1 + j` is `(a_0[i], a_1[j])`.
pub fn cartesian_product(axes: &[Vec<f32>]) -> Array2<f32> {
    let d = axes.len();
    let n = axes.iter().map(|a| a.len()).product::<usize>();
    if d == 0 {
        return Array2::zeros((0, 0));
    }

    let mut ret = Array2::<f32>::zeros((n, d));
    for (row, mut out) in ret.outer_iter_mut().enumerate() {
        let mut rem = row;
        for k in (0..d).rev() {
            let len = axes[k].len();
            out[k] = axes[k][rem % len];
            rem /= len;
        }
    }
    ret
}

/// Dense evaluation grid spanning the column ranges of `x_nd`:
/// `n_points` per dimension, cartesian product when `d > 1`.
pub fn test_grid(x_nd: &Array2<f32>, n_points: usize) -> Result<Array2<f32>, DataError> {
    if x_nd.nrows() == 0 || x_nd.ncols() == 0 {
        return Err(DataError::Empty("parameters"));
    }
    let axes = x_nd
        .columns()
        .into_iter()
        .map(|c| {
            let lb = c.fold(f32::INFINITY, |a, &b| a.min(b));
            let ub = c.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            linspace(lb, ub, n_points)
        })
        .collect::<Vec<_>>();
    Ok(cartesian_product(&axes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_hits_both_ends() {
        let v = linspace(0.1, 0.9, 5);
        assert_eq!(v.len(), 5);
        assert_eq!(v[0], 0.1);
        assert_eq!(v[4], 0.9);
        approx::assert_abs_diff_eq!(v[2], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn grid_is_cartesian_in_higher_dimensions() -> anyhow::Result<()> {
        let x = array![[0.0_f32, 10.0], [1.0, 20.0]];
        let grid = test_grid(&x, 3)?;
        assert_eq!(grid.dim(), (9, 2));
        assert_eq!(grid.row(0).to_vec(), vec![0.0, 10.0]);
        assert_eq!(grid.row(1).to_vec(), vec![0.0, 15.0]);
        assert_eq!(grid.row(8).to_vec(), vec![1.0, 20.0]);
        Ok(())
    }

    #[test]
    fn one_dimensional_grid_is_a_column() -> anyhow::Result<()> {
        let grid = test_grid(&array![[2.0_f32], [4.0]], 4)?;
        assert_eq!(grid.dim(), (4, 1));
        Ok(())
    }
}
