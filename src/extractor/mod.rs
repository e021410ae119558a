//! Media extraction contract
//!
//! An [`Extractor`] turns a URL into a local file inside a directory owned by
//! the caller. Failures are classified: [`ExtractorError::Transient`] errors
//! (network, timeouts, upstream 5xx) may be retried by the scheduler,
//! [`ExtractorError::Permanent`] ones (unsupported, not found, blocked) never
//! are. Platform handlers are resolved once when the [`ExtractorRegistry`] is
//! built.

use crate::downloader::progress::ProgressSink;
use crate::platform::Platform;
use crate::{MediaKind, VideoQuality};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod classify;
pub mod tiktok;
pub mod ytdlp;

pub use classify::{ErrorClass, FailureKind};
pub use tiktok::TikTokExtractor;
pub use ytdlp::YtDlpExtractor;

/// Extractor errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractorError {
    /// Network or timeout class failure; eligible for retry
    #[error("{0}")]
    Transient(String),

    /// Content cannot be fetched; never retried
    #[error("{0}")]
    Permanent(String),
}

impl ExtractorError {
    /// Build an error of the given class
    pub fn from_class(class: ErrorClass, message: impl Into<String>) -> Self {
        match class {
            ErrorClass::Transient => ExtractorError::Transient(message.into()),
            ErrorClass::Permanent => ExtractorError::Permanent(message.into()),
        }
    }

    /// Retry class
    pub fn class(&self) -> ErrorClass {
        match self {
            ExtractorError::Transient(_) => ErrorClass::Transient,
            ExtractorError::Permanent(_) => ErrorClass::Permanent,
        }
    }

    /// Whether a retry may help
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractorError::Transient(_))
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        match self {
            ExtractorError::Transient(m) | ExtractorError::Permanent(m) => m,
        }
    }
}

/// Result type for extractor operations
pub type ExtractorResult<T> = Result<T, ExtractorError>;

/// Metadata reported alongside a fetched file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    /// Media title
    pub title: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<u64>,
    /// File size in megabytes
    pub size_mb: Option<f64>,
    /// Thumbnail image bytes
    pub thumbnail: Option<Bytes>,
}

/// A file produced by an extractor
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    /// Local file inside the job's temporary storage
    pub path: PathBuf,
    /// Kind actually produced (an Instagram post may yield an image)
    pub kind: MediaKind,
    /// Reported metadata
    pub metadata: MediaMetadata,
}

/// Parameters of a single extractor call
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    /// Source URL
    pub url: &'a str,
    /// Source platform
    pub platform: Platform,
    /// Requested kind
    pub kind: MediaKind,
    /// Prefer a watermark-free variant
    pub no_watermark: bool,
    /// Video height cap; `None` fetches the best available
    pub quality: Option<VideoQuality>,
    /// Directory owned by the job; the extractor writes only here
    pub output_dir: &'a Path,
    /// Throttled progress reporting
    pub progress: ProgressSink,
}

/// Media extraction backend
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Fetch `request.url` into `request.output_dir`
    ///
    /// # Errors
    /// A classified [`ExtractorError`]; implementations must not leave files
    /// outside `output_dir`.
    async fn fetch(&self, request: &FetchRequest<'_>) -> ExtractorResult<FetchedMedia>;
}

/// Platform to extractor mapping, built once at startup
#[derive(Clone)]
pub struct ExtractorRegistry {
    handlers: HashMap<Platform, Arc<dyn Extractor>>,
    fallback: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    /// Registry that routes every platform to `fallback`
    pub fn new(fallback: Arc<dyn Extractor>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Default wiring: yt-dlp for everything, TikTok through the no-watermark path
    pub fn with_ytdlp(binary: impl Into<PathBuf>) -> Self {
        let ytdlp = Arc::new(YtDlpExtractor::new(binary));
        let tiktok = Arc::new(TikTokExtractor::new(ytdlp.clone()));
        Self::new(ytdlp).register(Platform::Tiktok, tiktok)
    }

    /// Route `platform` to `handler`
    pub fn register(mut self, platform: Platform, handler: Arc<dyn Extractor>) -> Self {
        self.handlers.insert(platform, handler);
        self
    }

    /// Handler for `platform`
    pub fn resolve(&self, platform: Platform) -> Arc<dyn Extractor> {
        self.handlers
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<_> = self
            .handlers
            .iter()
            .map(|(p, h)| format!("{p}={}", h.name()))
            .collect();
        routes.sort();
        f.debug_struct("ExtractorRegistry")
            .field("routes", &routes)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

/// Megabytes of the file at `path`
pub(crate) async fn file_size_mb(path: &Path) -> Option<f64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
}
