//! Error types for attnmerge

use thiserror::Error;

use crate::dtype::DType;

/// Result type alias using attnmerge's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for attnmerge operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch ({context}): expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Dtype mismatch ({context}): expected {expected}, got {got}")]
    DtypeMismatch {
        context: String,
        expected: DType,
        got: DType,
    },

    #[error("Device mismatch: {0}")]
    DeviceMismatch(String),

    #[error("Tensor is not contiguous: {0}")]
    NotContiguous(String),

    #[error("Unsupported dtype: {0}")]
    UnsupportedDtype(String),

    #[error("head_dim {head_dim} is not a multiple of the {dtype} pack width {pack_width}")]
    Alignment {
        head_dim: usize,
        pack_width: usize,
        dtype: DType,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
