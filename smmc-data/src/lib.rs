//! Observation data for statistical model checking surrogates.
//!
//! A property of a stochastic model is checked `M` times at each of `n`
//! parameter points; the resulting 0/1 outcomes are aggregated into
//! Binomial counts `T ≤ M` and regressed over parameter space downstream.

pub mod common_io;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod scaling;
pub mod simulate;

pub use dataset::{BernoulliDataset, ObservationSet};
pub use error::DataError;
pub use grid::{cartesian_product, linspace, test_grid};
pub use scaling::MinMaxScaler;
pub use simulate::simulate_dataset;
