use thiserror::Error;

/// Errors raised while building an LP or starting a solve.
///
/// Numerical trouble during iterations (non-monotone dual energy, unbounded
/// directions) is logged and reported through the solution status instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Inequality dual {index} is negative ({value}); inequality duals must be >= 0")]
    NegativeInequalityDual { index: usize, value: f64 },
    #[error("Dimension mismatch for {what}: expected {expected}, got {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid bounds for variable {index}: lower {lower}, upper {upper}")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },
    #[error("Column {column} is out of range for a problem with {num_variables} variables")]
    ColumnOutOfRange { column: usize, num_variables: usize },
    #[error("Invalid constraint bounds for row {row}: lower {lower}, upper {upper}")]
    InvalidConstraintBounds { row: usize, lower: f64, upper: f64 },
    #[error("Unknown tie method: {0} (expected 'round' or 'center')")]
    UnknownTieMethod(String),
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

pub type SolverResult<T> = Result<T, SolverError>;
