//! Error types for the aggregation core.

use thiserror::Error;

/// Result type alias using HubError.
pub type HubResult<T> = Result<T, HubError>;

/// Primary error type for aggregation operations.
#[derive(Debug, Error)]
pub enum HubError {
    // === Caller errors ===
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // === Station resolution (fatal to client init) ===
    #[error("Station lookup failed: {0}")]
    StationLookupFailed(String),

    // === Per-facet refresh errors (contained, retried next tick) ===
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Empty response from: {url}")]
    EmptyResponse { url: String },

    #[error("Malformed payload after marker '{marker}': {source}")]
    MalformedPayload {
        marker: String,
        #[source]
        source: serde_json::Error,
    },

    // === Decode-time errors (contained per converter) ===
    #[error("Numeric parse failure for attribute '{attr}': {raw:?}")]
    NumericParse { attr: String, raw: String },
}

impl HubError {
    /// Whether this error aborts client initialization (vs. one facet tick).
    pub fn is_fatal_to_init(&self) -> bool {
        matches!(
            self,
            HubError::InvalidArguments(_) | HubError::StationLookupFailed(_) | HubError::Config(_)
        )
    }
}
