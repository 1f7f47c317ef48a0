pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient correspondences: need at least {required}, found {found}")]
    InsufficientCorrespondences { required: usize, found: usize },

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}
