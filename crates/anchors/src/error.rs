use thiserror::Error;

/// Result type for anchor operations
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Errors that can occur while decomposing a document
#[derive(Error, Debug)]
pub enum AnchorError {
    /// The parser handed over nothing addressable
    #[error("Document {0} produced no anchors")]
    EmptyDocument(String),

    /// Document metadata cannot be used to build identities
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnchorError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
