use store_api::StoreError;
use thiserror::Error;

/// Errors surfaced to the user by client operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Bad user input, detected before any remote call.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] StoreError),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short heading for user-facing notifications.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid input",
            Self::NotFound(_) => "Not found",
            Self::Duplicate(_) => "Already exists",
            Self::Backend(_) => "Request failed",
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
