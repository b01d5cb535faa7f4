//! Error types for the Ordnung client

use crate::models::{DownloadId, SongId};

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the backend or updating local state
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error (reading an import file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered with an explicit error field
    #[error("{0}")]
    Backend(String),

    /// Operation needs an active playlist
    #[error("No playlist selected")]
    NoActivePlaylist,

    /// Song is not part of the cached track collection
    #[error("Track not found: {0}")]
    TrackNotFound(SongId),

    /// Download is not part of the cached download collection
    #[error("Download not found: {0}")]
    DownloadNotFound(DownloadId),

    /// Configuration error (from ordconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a backend-reported error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Validation or business error reported in a response payload
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Transport-level failure: the request did not produce a usable reply
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Json(_) | Self::InvalidUrl(_))
    }
}
