//! Surrogate models for statistical model checking.
//!
//! Satisfaction counts `T` out of `M` trials at parameter points are
//! regressed with a probit Binomial likelihood on a latent function,
//! either a sparse variational GP or a weight-space variational BNN,
//! both fitted by maximising an ELBO with Adam.

pub mod artifact;
pub mod bnn;
pub mod cli;
pub mod error;
pub mod evaluate;
pub mod likelihood;
pub mod linalg;
pub mod noise;
pub mod ops;
pub mod params;
pub mod pipeline;
pub mod svgp;
pub mod tensor_util;
pub mod train;

pub use error::{Result, SmmcError};
pub use evaluate::{EvaluationMetrics, EvaluationReport, PosteriorSummary};
pub use likelihood::{LikelihoodKind, ObservationLikelihood};
pub use pipeline::{FitConfig, Fitted, Method, SmmcModel};
pub use train::TrainConfig;

pub use candle_core;
pub use candle_nn;
