//! Error types for the correlation engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("malformed message: {0}")]
    MalformedMessage(#[source] serde_json::Error),

    #[error("export serialization failed: {0}")]
    Export(#[source] serde_json::Error),
}
