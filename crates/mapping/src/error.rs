use thiserror::Error;

/// Result type for mapping operations
pub type Result<T> = std::result::Result<T, MappingError>;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Embedding dimension mismatch for {subject}: expected {expected}, got {actual}")]
    DimensionMismatch {
        subject: String,
        expected: usize,
        actual: usize,
    },

    #[error("Missing embedding for {0}")]
    MissingEmbedding(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("'{0}' is not a target section")]
    NotATargetSection(String),
}
