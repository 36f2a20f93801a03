//! Error types for storage network operations.

/// Result type for storage network operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Invalid wallet key: {reason}")]
    InvalidWallet { reason: String },

    #[error("Failed to sign transaction: {reason}")]
    Signing { reason: String },

    #[error("Invalid base64url value in {field}")]
    InvalidEncoding { field: &'static str },

    #[error("Invalid gateway url: {source}")]
    InvalidUrl {
        #[from]
        source: url::ParseError,
    },

    #[error("Request to storage gateway failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {endpoint}: status {status}, body: {body}")]
    UnexpectedResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
}

impl StoreError {
    pub fn invalid_wallet(reason: impl Into<String>) -> Self {
        StoreError::InvalidWallet {
            reason: reason.into(),
        }
    }
}
