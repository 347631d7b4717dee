use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Vector index not ready: {0}")]
    NotReady(String),
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether the failure is allowed to surface to the caller of `ask` as a
    /// request-level error. Every other variant has a degraded-but-successful
    /// handling path further up the stack.
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, AppError::RetrievalUnavailable(_))
    }
}
