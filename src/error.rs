//! Error types for the ruvnorm library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum NormError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid expression value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}' in table")]
    MissingColumn(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Gene '{0}' is not available in the fitted model or the supplied data")]
    MissingGene(String),

    #[error("Model has not been fit; call fit before transform")]
    NotFitted,

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    OverwriteRefused(PathBuf),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, NormError>;
