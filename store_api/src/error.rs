use thiserror::Error;

use crate::subscription::SubscriptionId;

/// Failure reported by the backend for a read, write, subscription or auth call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to decode document {id}: {message}")]
    Decode { id: String, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
}

pub type StoreResult<T> = Result<T, StoreError>;
