//! Delivery side of the pipeline
//!
//! The scheduler talks to the chat backend only through [`Transport`]: status
//! updates for the user's "loading" message, first-time media sends, and
//! replays of cached artifact handles. [`send_with_retry`] wraps sends with
//! the backend's flood-control contract.

use crate::cache::ArtifactCacheEntry;
use crate::downloader::job::JobTicket;
use crate::MediaKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub mod console;
pub mod i18n;
pub mod presenter;
pub mod telegram;

pub use console::ConsoleTransport;
pub use telegram::{TelegramApi, TelegramTransport};

/// Default attempt budget for a single send
pub const DEFAULT_SEND_ATTEMPTS: u32 = crate::downloader::config::MAX_SEND_ATTEMPTS;

/// Wait after a network failure before resending
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Transport errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Backend asked us to slow down for the given duration
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Required wait before the next call
        retry_after: Duration,
    },

    /// File exceeds the backend's upload limit
    #[error("file is larger than the upload limit")]
    EntityTooLarge,

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Any other rejection
    #[error("send failed: {0}")]
    Failed(String),
}

/// User-visible status of a job
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// Job accepted, checking cache
    Preparing,
    /// Cache hit, replaying the stored artifact
    CacheHit,
    /// All worker slots taken; waiting in line
    Busy,
    /// Fetch started
    Downloading,
    /// Throttled fetch progress line
    Progress(String),
    /// Uploading the fetched file
    Uploading,
    /// Job finished successfully; the status message can go
    Done,
    /// Job failed with a bounded, human-readable message
    Failed(String),
    /// Upload refused because the file exceeds the backend limit
    TooLarge,
}

impl StatusUpdate {
    /// Last update a job sends
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusUpdate::Done | StatusUpdate::Failed(_) | StatusUpdate::TooLarge
        )
    }
}

/// How a file is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendVariant {
    /// Inline playable video
    Video,
    /// Audio track
    Audio,
    /// Inline photo
    Photo,
    /// Generic file attachment
    Document,
}

impl SendVariant {
    /// Variant for `kind` at `size_mb`, falling back to document when oversized
    pub fn select(kind: MediaKind, size_mb: Option<f64>, limits: &SendLimits) -> Self {
        let size = size_mb.unwrap_or(0.0);
        match kind {
            MediaKind::Image if size > limits.photo_max_mb => Self::Document,
            MediaKind::Image => Self::Photo,
            MediaKind::Video if size > limits.media_max_mb => Self::Document,
            MediaKind::Video => Self::Video,
            MediaKind::Audio if size > limits.media_max_mb => Self::Document,
            MediaKind::Audio => Self::Audio,
        }
    }

    /// Whether the handle from this send can be replayed later
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::Document)
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Photo => "photo",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for SendVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size limits for inline sends, in megabytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendLimits {
    /// Largest inline photo
    pub photo_max_mb: f64,
    /// Largest inline video or audio
    pub media_max_mb: f64,
}

impl Default for SendLimits {
    fn default() -> Self {
        Self {
            photo_max_mb: 10.0,
            media_max_mb: 50.0,
        }
    }
}

/// Everything needed to upload a fetched file
#[derive(Debug, Clone)]
pub struct MediaPayload {
    /// Chosen send variant
    pub variant: SendVariant,
    /// Kind the extractor produced
    pub kind: MediaKind,
    /// Local file inside the job's temporary storage
    pub path: PathBuf,
    /// Ready-to-send caption
    pub caption: String,
    /// Untruncated title (audio sends carry it as track title)
    pub title: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<u64>,
    /// Size in megabytes
    pub size_mb: Option<f64>,
    /// Thumbnail bytes
    pub thumbnail: Option<Bytes>,
}

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentArtifact {
    /// Backend-issued handle for replays, when the backend returned one
    pub handle: Option<String>,
}

/// Chat backend used by the scheduler
#[async_trait]
pub trait Transport: Send + Sync {
    /// Show `update` to the user who owns `ticket`
    async fn present(&self, ticket: &JobTicket, update: StatusUpdate) -> Result<(), TransportError>;

    /// Upload a fetched file
    async fn send_media(
        &self,
        ticket: &JobTicket,
        payload: &MediaPayload,
    ) -> Result<SentArtifact, TransportError>;

    /// Resend a previously delivered artifact by handle
    async fn send_cached(
        &self,
        ticket: &JobTicket,
        entry: &ArtifactCacheEntry,
    ) -> Result<(), TransportError>;
}

/// Run `op` until it succeeds or the attempt budget is spent.
///
/// `RateLimited` waits exactly the requested duration, `Network` waits
/// [`NETWORK_RETRY_DELAY`]; `EntityTooLarge` and `Failed` return at once.
pub async fn send_with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = match &err {
            TransportError::RateLimited { retry_after } => *retry_after,
            TransportError::Network(_) => NETWORK_RETRY_DELAY,
            TransportError::EntityTooLarge | TransportError::Failed(_) => return Err(err),
        };

        if attempt >= max_attempts {
            return Err(err);
        }

        warn!(
            attempt = attempt,
            max_attempts = max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Send failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
