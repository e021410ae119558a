//! CLI error types and conversions

use crate::cache::CacheError;
use crate::link::LinkError;
use crate::transport::TransportError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Artifact cache could not be opened
    #[error("cache error: {0}")]
    CacheError(#[from] CacheError),

    /// Link could not be parsed
    #[error("link error: {0}")]
    LinkError(#[from] LinkError),

    /// Chat backend error
    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),

    /// IO error (bind, filesystem)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Job ended without delivery
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
