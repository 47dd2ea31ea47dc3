//! Error types for choir

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChoirError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Timeline must be a JSON array of segments")]
    TimelineNotArray,
    #[error("Config must be a JSON object")]
    ConfigNotObject,
}

pub type Result<T> = std::result::Result<T, ChoirError>;
