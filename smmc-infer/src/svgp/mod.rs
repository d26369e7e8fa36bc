//! Sparse variational Gaussian process over inducing points.

pub mod kernel;
pub mod model;
pub mod smmc;
pub mod train;
pub mod variational;

pub use kernel::RbfKernel;
pub use model::{LatentPosterior, SparseGp};
pub use smmc::{GpConfig, SviGp};
pub use train::{negative_elbo, train_sparse_gp};
pub use variational::{InducingDistribution, VariationalFamily, VariationalStrategy};
