//! Error types for the ingest pipeline
//!
//! None of these reach the caller of
//! [`IngestionPipeline::get_dataset`](crate::pipeline::IngestionPipeline::get_dataset):
//! every stage degrades instead. They exist so the stages themselves can use
//! `?` and log a precise cause.

use thiserror::Error;

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn unexpected_shape(msg: impl Into<String>) -> Self {
        Self::UnexpectedShape(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

