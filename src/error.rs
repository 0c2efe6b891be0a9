//! Error type for the Safe transaction service client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxServiceError {
    #[error("No transaction service is configured for this network")]
    NotConfigured,
    #[error("Invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, TxServiceError>;
