//! # Media Relay Bot Library
//!
//! Download orchestration for a chat bot that relays media from popular
//! platforms. A user sends a link, the bot detects the platform, fetches the
//! media through an external extractor, delivers it back over the chat
//! transport and remembers the transport-issued handle so the next request
//! for the same link is answered instantly.
//!
//! ## Features
//!
//! - **17 Platforms**: YouTube, Instagram, TikTok, Twitter/X, Facebook and more
//! - **Artifact Cache**: previously delivered links replay by handle, no re-fetch
//! - **Bounded Concurrency**: a FIFO worker-slot pool caps concurrent extractions
//! - **Retry Policy**: transient extractor failures get exactly one more attempt
//! - **Rate Limiting**: per-user cooldown with an atomic check-and-set
//! - **Guaranteed Cleanup**: temporary storage is scoped and released exactly once
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_relay_bot::cache::{ArtifactCache, MemoryArtifactStore};
//! use media_relay_bot::downloader::{DownloadJob, DownloadScheduler, SchedulerConfig};
//! use media_relay_bot::extractor::ExtractorRegistry;
//! use media_relay_bot::link::MediaLink;
//! use media_relay_bot::transport::console::ConsoleTransport;
//! use media_relay_bot::MediaKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let link = MediaLink::parse("look at this https://youtu.be/abc123")?;
//! let scheduler = DownloadScheduler::new(
//!     SchedulerConfig::default(),
//!     ArtifactCache::new(Arc::new(MemoryArtifactStore::new())),
//!     Arc::new(ExtractorRegistry::with_ytdlp("yt-dlp")),
//!     Arc::new(ConsoleTransport::new("./downloads")),
//! );
//!
//! let job = DownloadJob::new(1, 42, 42, link, MediaKind::Video);
//! let outcome = scheduler.submit(job).await;
//! println!("{:?}", outcome.final_state());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`platform`] - Supported platforms and their capabilities
//! - [`link`] - URL extraction and validation from free text
//! - [`downloader`] - Rate limiting, worker slots, job state machine and scheduler
//! - [`cache`] - URL to delivered-artifact-handle cache over a pluggable store
//! - [`extractor`] - Extractor contract and the yt-dlp backed implementation
//! - [`transport`] - Delivery contract, presentation and the Telegram client
//! - [`users`] - User repository used by the bot shell
//! - [`channels`] - Required-channel repository behind the subscription gate
//! - [`bot`] - Update dispatcher for the chat front-end
//! - [`health`] - Liveness HTTP endpoint

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Update dispatcher for the chat front-end
pub mod bot;

/// Artifact handle cache
pub mod cache;

/// Channels users must join
pub mod channels;

/// CLI command implementations
pub mod cli;

/// Download orchestration
pub mod downloader;

/// Media extraction contract and backends
pub mod extractor;

/// Liveness endpoint
pub mod health;

/// Link extraction from message text
pub mod link;

/// Observability metrics
pub mod metrics;

/// Supported platform table
pub mod platform;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Delivery transport contract and implementations
pub mod transport;

/// User repository
pub mod users;

pub use link::MediaLink;
pub use platform::Platform;

/// Chat-platform user identifier
pub type UserId = i64;

/// Chat identifier messages are delivered to
pub type ChatId = i64;

/// Kind of media a user asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video with audio track
    Video,
    /// Audio only
    Audio,
    /// Still image
    Image,
}

impl MediaKind {
    /// All kinds in display order
    pub const ALL: [MediaKind; 3] = [MediaKind::Video, MediaKind::Audio, MediaKind::Image];

    /// Lowercase label used in callbacks, logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "image" | "photo" => Ok(MediaKind::Image),
            _ => Err(format!(
                "Invalid media kind: {s}. Valid options: video, audio, image"
            )),
        }
    }
}

/// Height cap a user picks for video downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    /// 360p
    #[serde(rename = "360p")]
    P360,
    /// 480p
    #[serde(rename = "480p")]
    P480,
    /// 720p
    #[default]
    #[serde(rename = "720p")]
    P720,
    /// 1080p
    #[serde(rename = "1080p")]
    P1080,
}

impl VideoQuality {
    /// All choices, lowest first
    pub const ALL: [VideoQuality; 4] = [
        VideoQuality::P360,
        VideoQuality::P480,
        VideoQuality::P720,
        VideoQuality::P1080,
    ];

    /// Maximum frame height in pixels
    pub fn height(&self) -> u32 {
        match self {
            VideoQuality::P360 => 360,
            VideoQuality::P480 => 480,
            VideoQuality::P720 => 720,
            VideoQuality::P1080 => 1080,
        }
    }

    /// Label such as `720p`
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::P360 => "360p",
            VideoQuality::P480 => "480p",
            VideoQuality::P720 => "720p",
            VideoQuality::P1080 => "1080p",
        }
    }
}

impl std::fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        VideoQuality::ALL
            .into_iter()
            .find(|q| q.as_str() == s || q.height().to_string() == s)
            .ok_or_else(|| {
                format!("Invalid quality: {s}. Valid options: 360p, 480p, 720p, 1080p")
            })
    }
}
