//! Failure classification for extractor backends.
//!
//! yt-dlp reports failures as free text on stderr and HTTP backends as status
//! codes. Both are mapped onto a [`FailureKind`], whose [`ErrorClass`] decides
//! whether the scheduler may retry.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Retry class of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network or timeout; retryable
    Transient,
    /// Unsupported, not found, blocked; not retryable
    Permanent,
}

/// Classification of extractor failures for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Call exceeded its deadline
    Timeout,
    /// Connection refused, reset, DNS failure
    NetworkOffline,
    /// Upstream throttled us (HTTP 429)
    RateLimited,
    /// Upstream 5xx
    ServerError(u16),
    /// URL not handled by any extractor
    Unsupported,
    /// Content removed or never existed
    NotFound,
    /// Private, geo-blocked, age-gated or login-only content
    Blocked,
    /// The extractor finished but produced no media file
    NoMedia,
    /// Extractor binary missing or not executable
    ToolMissing,
    /// Anything unrecognised
    Unknown,
}

impl FailureKind {
    /// User-friendly description used in logs and error messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "download timed out",
            Self::NetworkOffline => "connection failed",
            Self::RateLimited => "platform rate limit exceeded",
            Self::ServerError(code) => match code {
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "platform server error",
            },
            Self::Unsupported => "unsupported link",
            Self::NotFound => "media not found",
            Self::Blocked => "media is private or restricted",
            Self::NoMedia => "no downloadable media found",
            Self::ToolMissing => "extractor is not installed",
            Self::Unknown => "download failed",
        }
    }

    /// Retry class of this kind.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout
            | Self::NetworkOffline
            | Self::RateLimited
            | Self::ServerError(_)
            | Self::Unknown => ErrorClass::Transient,
            Self::Unsupported
            | Self::NotFound
            | Self::Blocked
            | Self::NoMedia
            | Self::ToolMissing => ErrorClass::Permanent,
        }
    }
}

const PERMANENT_MARKERS: &[(&str, FailureKind)] = &[
    ("unsupported url", FailureKind::Unsupported),
    ("no video formats found", FailureKind::NoMedia),
    ("there is no video in this", FailureKind::NoMedia),
    ("video unavailable", FailureKind::NotFound),
    ("this video has been removed", FailureKind::NotFound),
    ("http error 404", FailureKind::NotFound),
    ("not found", FailureKind::NotFound),
    ("does not exist", FailureKind::NotFound),
    ("private video", FailureKind::Blocked),
    ("is private", FailureKind::Blocked),
    ("sign in to confirm your age", FailureKind::Blocked),
    ("login required", FailureKind::Blocked),
    ("requested content is not available", FailureKind::Blocked),
    ("not available in your country", FailureKind::Blocked),
    ("geo restricted", FailureKind::Blocked),
    ("copyright", FailureKind::Blocked),
    ("http error 403", FailureKind::Blocked),
];

const TRANSIENT_MARKERS: &[(&str, FailureKind)] = &[
    ("timed out", FailureKind::Timeout),
    ("timeout", FailureKind::Timeout),
    ("http error 429", FailureKind::RateLimited),
    ("too many requests", FailureKind::RateLimited),
    ("connection reset", FailureKind::NetworkOffline),
    ("connection refused", FailureKind::NetworkOffline),
    ("temporary failure in name resolution", FailureKind::NetworkOffline),
    ("network is unreachable", FailureKind::NetworkOffline),
    ("unable to download webpage", FailureKind::NetworkOffline),
    ("http error 500", FailureKind::ServerError(500)),
    ("http error 502", FailureKind::ServerError(502)),
    ("http error 503", FailureKind::ServerError(503)),
    ("http error 504", FailureKind::ServerError(504)),
];

/// Classify yt-dlp stderr output.
///
/// Transient markers are checked first so that "timed out while fetching a
/// page that was not found" style messages stay retryable.
pub fn classify_stderr(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .chain(PERMANENT_MARKERS.iter())
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, kind)| *kind)
        .unwrap_or(FailureKind::Unknown)
}

/// Extract the most relevant line of yt-dlp stderr for display.
pub fn error_summary(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("");
    line.trim()
        .trim_start_matches("ERROR:")
        .trim()
        .to_string()
}

/// Classify an HTTP status or reqwest error.
pub fn classify_http(status: Option<StatusCode>, err: Option<&ReqwestError>) -> FailureKind {
    if let Some(status) = status {
        match status.as_u16() {
            404 | 410 => return FailureKind::NotFound,
            401 | 403 | 451 => return FailureKind::Blocked,
            429 => return FailureKind::RateLimited,
            _ => {}
        }

        if status.is_server_error() {
            return FailureKind::ServerError(status.as_u16());
        }

        if status.is_client_error() {
            return FailureKind::Unsupported;
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return FailureKind::Timeout;
        }

        if err.is_connect() {
            return FailureKind::NetworkOffline;
        }
    }

    FailureKind::Unknown
}

/// Context for formatting retry log messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Backoff until the next attempt
    pub backoff: Duration,
    /// Source URL
    pub url: String,
    /// Failure message
    pub error_message: String,
}

impl RetryContext {
    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt + 1,
            self.max_attempts,
            self.error_message,
            self.backoff.as_secs_f64(),
            self.url
        )
    }

    /// Format final failure summary.
    pub fn format_failure(&self) -> String {
        format!(
            "[FAILED] Download failed after {} attempt(s): {} ({})",
            self.attempt, self.error_message, self.url
        )
    }
}
