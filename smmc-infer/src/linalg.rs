//! Dense factorisations written with ordinary tensor ops, so gradients
//! flow back through them into the kernel hyperparameters and the
//! variational factors. Sizes here are the number of inducing points,
//! small enough for column-by-column loops.

use crate::error::{config_err, numeric_err, Result};
use candle_core::{DType, Tensor};

/// Diagonal of a square matrix as a vector
pub fn diag(a_nn: &Tensor) -> Result<Tensor> {
    let (n, _) = a_nn.dims2()?;
    let eye = Tensor::eye(n, a_nn.dtype(), a_nn.device())?;
    Ok(a_nn.mul(&eye)?.sum(1)?)
}

/// `a + jitter * I`
pub fn add_jitter(a_nn: &Tensor, jitter: f64) -> Result<Tensor> {
    let (n, _) = a_nn.dims2()?;
    let eye = Tensor::eye(n, a_nn.dtype(), a_nn.device())?;
    Ok(a_nn.add(&(eye * jitter)?)?)
}

fn check_square(a_nn: &Tensor, what: &str) -> Result<usize> {
    let (n, m) = a_nn.dims2()?;
    if n != m || n == 0 {
        return Err(config_err!("{} must be a non-empty square matrix, got {} x {}", what, n, m));
    }
    Ok(n)
}

/// Lower-triangular `L` with `L Lᵀ = A` (left-looking, one column at a
/// time). Fails when a pivot is not strictly positive.
pub fn cholesky(a_nn: &Tensor) -> Result<Tensor> {
    let n = check_square(a_nn, "cholesky input")?;
    let (dtype, dev) = (a_nn.dtype(), a_nn.device());

    let mut cols: Vec<Tensor> = Vec::with_capacity(n);

    for j in 0..n {
        let a_col = a_nn.narrow(0, j, n - j)?.narrow(1, j, 1)?;

        // v = A[j:, j] - L[j:, :j] L[j, :j]ᵀ
        let v = if j == 0 {
            a_col
        } else {
            let l_done = Tensor::cat(&cols, 1)?;
            let l_below = l_done.narrow(0, j, n - j)?.contiguous()?;
            let l_row = l_done.narrow(0, j, 1)?.t()?.contiguous()?;
            a_col.sub(&l_below.matmul(&l_row)?)?
        };

        // v / sqrt(v[0]) puts sqrt(v[0]) on the diagonal
        let pivot = v.narrow(0, 0, 1)?.sqrt()?;
        let col = v.broadcast_div(&pivot)?;

        cols.push(if j == 0 {
            col
        } else {
            Tensor::cat(&[Tensor::zeros((j, 1), dtype, dev)?, col], 0)?
        });
    }

    let l_nn = Tensor::cat(&cols, 1)?;

    let d = diag(&l_nn)?.to_dtype(DType::F64)?.to_vec1::<f64>()?;
    if let Some((j, x)) = d.iter().enumerate().find(|(_, x)| !(x.is_finite() && **x > 0.)) {
        return Err(numeric_err!(
            "matrix is not positive definite (pivot {} = {})",
            j,
            x
        ));
    }
    Ok(l_nn)
}

/// Solve `L X = B` for lower-triangular `L` by forward substitution
pub fn solve_lower(l_nn: &Tensor, b_nm: &Tensor) -> Result<Tensor> {
    let n = check_square(l_nn, "triangular factor")?;
    if b_nm.dim(0)? != n {
        return Err(config_err!("rhs has {} rows, expected {}", b_nm.dim(0)?, n));
    }

    let mut rows: Vec<Tensor> = Vec::with_capacity(n);
    for i in 0..n {
        let b_i = b_nm.narrow(0, i, 1)?;
        let r_i = if i == 0 {
            b_i
        } else {
            let x_done = Tensor::cat(&rows, 0)?;
            let l_row = l_nn.narrow(0, i, 1)?.narrow(1, 0, i)?.contiguous()?;
            b_i.sub(&l_row.matmul(&x_done)?)?
        };
        let l_ii = l_nn.narrow(0, i, 1)?.narrow(1, i, 1)?;
        rows.push(r_i.broadcast_div(&l_ii)?);
    }
    Ok(Tensor::cat(&rows, 0)?)
}

/// Solve `U X = B` for upper-triangular `U` by back substitution
pub fn solve_upper(u_nn: &Tensor, b_nm: &Tensor) -> Result<Tensor> {
    let n = check_square(u_nn, "triangular factor")?;
    if b_nm.dim(0)? != n {
        return Err(config_err!("rhs has {} rows, expected {}", b_nm.dim(0)?, n));
    }

    // filled from the last row up
    let mut rows_rev: Vec<Tensor> = Vec::with_capacity(n);
    for i in (0..n).rev() {
        let b_i = b_nm.narrow(0, i, 1)?;
        let r_i = if i == n - 1 {
            b_i
        } else {
            let x_done = Tensor::cat(&rows_rev.iter().rev().cloned().collect::<Vec<_>>(), 0)?;
            let u_row = u_nn.narrow(0, i, 1)?.narrow(1, i + 1, n - i - 1)?.contiguous()?;
            b_i.sub(&u_row.matmul(&x_done)?)?
        };
        let u_ii = u_nn.narrow(0, i, 1)?.narrow(1, i, 1)?;
        rows_rev.push(r_i.broadcast_div(&u_ii)?);
    }
    rows_rev.reverse();
    Ok(Tensor::cat(&rows_rev, 0)?)
}

/// Solve `Lᵀ X = B` given the lower factor `L`
pub fn solve_lower_transpose(l_nn: &Tensor, b_nm: &Tensor) -> Result<Tensor> {
    solve_upper(&l_nn.t()?.contiguous()?, b_nm)
}

/// `log |L Lᵀ| = 2 Σ log |L_ii|`
pub fn log_det_from_cholesky(l_nn: &Tensor) -> Result<Tensor> {
    Ok((diag(l_nn)?.abs()?.log()?.sum_all()? * 2.0)?)
}
