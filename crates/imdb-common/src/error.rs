//! Error types for the IMDb ingestion pipeline

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Download of {url} failed with status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Corrupt archive {path}: {reason}")]
    CorruptArchive { path: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(#[from] csv::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Transient failures leave their stage output absent so the next run retries it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IngestError::Network(_)
                | IngestError::DownloadStatus { .. }
                | IngestError::CorruptArchive { .. }
        )
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
