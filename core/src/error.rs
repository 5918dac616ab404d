/// Error types for the chat backend
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    /// True for errors caused by the caller's input rather than by the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChatError::MalformedPayload(_) | ChatError::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
