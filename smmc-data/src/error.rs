use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("empty {0}")]
    Empty(&'static str),
    #[error("ragged rows in {0}")]
    Ragged(&'static str),
    #[error("{params} parameter rows vs. {labels} label rows")]
    RowMismatch { params: usize, labels: usize },
    #[error("label at ({row}, {col}) is {value}, expected 0 or 1")]
    NonBinaryLabel { row: usize, col: usize, value: f32 },
    #[error("count {count} at row {row} is outside [0, {n_trials}]")]
    CountOutOfRange { row: usize, count: f32, n_trials: usize },
    #[error("success probability at row {row} is not a number")]
    InvalidProbability { row: usize },
    #[error("expected {expected} parameter columns, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}
