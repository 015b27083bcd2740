//! Error taxonomy for catalog operations.
//!
//! Library modules return [`CatalogError`]; the command drivers and the
//! `catalog` binary wrap it in `anyhow` with context. The variants map to
//! how a failure is handled:
//!
//! | Variant | Scope |
//! |---------|-------|
//! | [`Schema`](CatalogError::Schema) | fatal to one record |
//! | [`Format`](CatalogError::Format) | line skipped and counted |
//! | [`Connectivity`](CatalogError::Connectivity) | fatal to the run |
//! | [`RemoteRejection`](CatalogError::RemoteRejection) | counted, run continues |
//! | [`RateLimitOrQuota`](CatalogError::RateLimitOrQuota) | retries abandoned |
//! | [`ContentPolicy`](CatalogError::ContentPolicy) | retries abandoned, operator revises prompt |
//! | [`Transient`](CatalogError::Transient) | retried under [`RetryPolicy`](crate::retry::RetryPolicy) |

use thiserror::Error;

/// Result type alias using the catalog error type.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// A record is missing a required field or has the wrong shape.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A JSON-lines entry could not be parsed.
    #[error("Invalid JSON on line {line}: {message}")]
    Format { line: usize, message: String },

    /// The store or external API could not be reached.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The remote service refused a specific request or document.
    #[error("Remote rejected request: {0}")]
    RemoteRejection(String),

    /// The external API reported a rate-limit, quota, or billing problem.
    #[error("Rate limit or quota exceeded: {0}")]
    RateLimitOrQuota(String),

    /// The generation API refused the prompt.
    #[error("Content policy violation: {0}")]
    ContentPolicy(String),

    /// A failure worth retrying (timeouts, 5xx responses, dropped connections).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Nothing to process.
    #[error("No input files: {0}")]
    NoInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    /// Whether a retry loop may spend budget on this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Transient(_))
    }

    /// Map a `reqwest` transport failure. A refused or unresolvable
    /// connection means the service is unreachable; timeouts and dropped
    /// requests are transient.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            CatalogError::Connectivity(err.to_string())
        } else if err.is_timeout() || err.is_request() || err.is_body() {
            CatalogError::Transient(err.to_string())
        } else {
            CatalogError::Connectivity(err.to_string())
        }
    }
}
