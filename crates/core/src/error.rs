//! Error type for the laudo core.
//!
//! The first five variants are the failures a user sees as a notice. The rest are plumbing.

#[derive(Debug, thiserror::Error)]
pub enum LaudoError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("failed to decode draft: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("asset rejected: {0}")]
    Asset(#[from] laudo_files::AssetError),
    #[error("render failed: {0}")]
    Render(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(std::io::Error),
    #[error("failed to serialize: {0}")]
    Serialization(serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("session is closed")]
    SessionClosed,
}

impl From<laudo_types::TypesError> for LaudoError {
    fn from(err: laudo_types::TypesError) -> Self {
        LaudoError::InvalidInput(err.to_string())
    }
}

pub type LaudoResult<T> = std::result::Result<T, LaudoError>;
