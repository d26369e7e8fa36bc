use thiserror::Error;

/// Failures surfaced by the inference core. None of them are recovered
/// from internally; a numeric failure ends the current training run.
#[derive(Debug, Error)]
pub enum SmmcError {
    /// Caught before any numeric work: missing trial counts, bad shapes,
    /// empty inputs.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    /// Non-positive-definite matrices, NaN/Inf losses
    #[error("numeric error: {0}")]
    Numeric(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Data(#[from] smmc_data::DataError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SmmcError>;

macro_rules! config_err {
    ($($arg:tt)*) => {
        $crate::error::SmmcError::Config(format!($($arg)*))
    };
}

macro_rules! numeric_err {
    ($($arg:tt)*) => {
        $crate::error::SmmcError::Numeric(format!($($arg)*))
    };
}

pub(crate) use config_err;
pub(crate) use numeric_err;
