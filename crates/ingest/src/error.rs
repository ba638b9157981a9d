use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Anchor error: {0}")]
    Anchors(#[from] trialmap_anchors::AnchorError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] trialmap_mapping::MappingError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Unknown document version: {0}")]
    UnknownVersion(String),

    #[error("{0}")]
    Other(String),
}
