//! Bayesian neural network with a mean-field Gaussian posterior over
//! every weight.

pub mod guide;
pub mod model;
pub mod network;
pub mod smmc;

pub use guide::{sample_prior, WeightPosterior};
pub use model::{BayesianNetwork, PredictiveSamples};
pub use network::{Architecture, LayerSpec, NetworkSpec, WeightBundle};
pub use smmc::{BnnConfig, SviBnn};
