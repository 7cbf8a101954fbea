//! Error types shared across the workspace.

use thiserror::Error;

/// Main error type for lorebase operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Provider credentials are missing or expired beyond refresh.
    #[error("provider '{provider}' requires reconnection")]
    ProviderAuthRequired { provider: String },

    /// Transient provider failure; the sync run retries with backoff.
    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    /// Permanent provider failure; the sync run ends in error.
    #[error("provider error: {0}")]
    ProviderFatal(String),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cooperative cancellation; never reported to callers as a failure.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a retry with backoff is the right response.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProviderTransient(_) | Error::Store(StoreError::Unavailable(_))
        )
    }

    /// HTTP status the external router maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::InvalidPath(_) | Error::Conflict(_) => 400,
            Error::PermissionDenied(_) => 403,
            Error::Store(StoreError::Unavailable(_)) => 503,
            _ => 500,
        }
    }
}

/// Content extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("input too long: {tokens} tokens, max {max}")]
    InputTooLong { tokens: usize, max: usize },
}

/// State-store and vector-store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connectivity failure; retryable, does not advance index state.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("write failed: {0}")]
    Write(String),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
