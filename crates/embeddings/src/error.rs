use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Assist capability unavailable: {0}")]
    Unavailable(String),

    #[error("Assist call timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Assist returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Assist backend error: {0}")]
    Backend(String),
}
