//! Gauss–Hermite rule against the standard normal weight.

use crate::error::{config_err, Result};
use candle_core::{DType, Device, Tensor};
use nalgebra::{DMatrix, SymmetricEigen};

pub const DEFAULT_NUM_NODES: usize = 20;

/// Nodes `z_k` and weights `w_k` with `E[g(Z)] ≈ Σ_k w_k g(z_k)` for
/// `Z ~ N(0, 1)`; exact for polynomials of degree `< 2 * len`.
#[derive(Debug, Clone)]
pub struct GaussHermite {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussHermite {
    /// Golub–Welsch: eigen-decompose the Jacobi matrix of the monic
    /// probabilists' Hermite recurrence `He_{k+1} = x He_k - k He_{k-1}`.
    /// Nodes are the eigenvalues and each weight is the squared first
    /// component of the unit eigenvector.
    pub fn new(num_nodes: usize) -> Result<Self> {
        if num_nodes == 0 {
            return Err(config_err!("need at least one quadrature node"));
        }

        let jacobi = DMatrix::<f64>::from_fn(num_nodes, num_nodes, |i, j| {
            if i + 1 == j || j + 1 == i {
                (i.max(j) as f64).sqrt()
            } else {
                0.0
            }
        });
        let eig = SymmetricEigen::new(jacobi);

        let mut pairs = (0..num_nodes)
            .map(|k| (eig.eigenvalues[k], eig.eigenvectors[(0, k)].powi(2)))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total: f64 = pairs.iter().map(|(_, w)| w).sum();
        Ok(Self {
            nodes: pairs.iter().map(|(z, _)| *z).collect(),
            weights: pairs.iter().map(|(_, w)| w / total).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `(Q, 1)` column of nodes
    pub fn nodes_tensor(&self, dtype: DType, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.nodes, (self.len(), 1), device)?.to_dtype(dtype)?)
    }

    /// `(Q, 1)` column of weights
    pub fn weights_tensor(&self, dtype: DType, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.weights, (self.len(), 1), device)?.to_dtype(dtype)?)
    }

    /// `E[g(F)]` for `F ~ N(mean, var)`, elementwise over the trailing `n`.
    ///
    /// # Arguments
    /// * `mean_n`, `var_n` - shape (n,)
    /// * `g` - maps latent values of shape (Q, n) to (Q, n)
    ///
    /// # Returns
    /// shape (n,)
    pub fn expectation<F>(&self, mean_n: &Tensor, var_n: &Tensor, g: F) -> Result<Tensor>
    where
        F: Fn(&Tensor) -> Result<Tensor>,
    {
        let (dtype, dev) = (mean_n.dtype(), mean_n.device());
        let z_q1 = self.nodes_tensor(dtype, dev)?;
        let w_q1 = self.weights_tensor(dtype, dev)?;

        let std_1n = var_n.maximum(1e-12)?.sqrt()?.unsqueeze(0)?;
        let f_qn = z_q1.broadcast_mul(&std_1n)?.broadcast_add(&mean_n.unsqueeze(0)?)?;

        Ok(g(&f_qn)?.broadcast_mul(&w_q1)?.sum(0)?)
    }
}
