//! Download job structures and lifecycle state machine
//!
//! ```text
//! Requested -> CacheCheck
//! CacheCheck -> Delivered | Queued
//! Queued -> Fetching
//! Fetching -> Fetching | Failed | Uploading
//! Uploading -> Delivered | Failed
//! Delivered | Failed -> Cleaned
//! ```
//!
//! Temporary storage is allocated only while the job is `Fetching` and is
//! released by [`DownloadJob::cleanup`], which is also the only way into
//! `Cleaned`. Dropping a job that never reached `Cleaned` still releases the
//! storage through [`TempStorage`]'s own drop.

use crate::downloader::storage::TempStorage;
use crate::extractor::MediaMetadata;
use crate::link::MediaLink;
use crate::platform::Platform;
use crate::{ChatId, MediaKind, UserId, VideoQuality};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-unique job identifier
pub type JobId = u64;

/// Lifecycle state of a [`DownloadJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Created from an inbound message
    Requested,
    /// Looking up the artifact cache
    CacheCheck,
    /// Waiting for a worker slot
    Queued,
    /// Extractor running inside a worker slot
    Fetching,
    /// Handing the fetched file to the transport
    Uploading,
    /// Artifact reached the user
    Delivered,
    /// Job ended with an error
    Failed,
    /// Temporary storage released; terminal
    Cleaned,
}

impl JobState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Requested, CacheCheck)
                | (CacheCheck, Delivered)
                | (CacheCheck, Queued)
                | (Queued, Fetching)
                | (Fetching, Fetching)
                | (Fetching, Failed)
                | (Fetching, Uploading)
                | (Uploading, Delivered)
                | (Uploading, Failed)
                | (Delivered, Cleaned)
                | (Failed, Cleaned)
        )
    }

    /// `Delivered` or `Failed`: the last states before cleanup
    pub fn is_outcome(self) -> bool {
        matches!(self, JobState::Delivered | JobState::Failed)
    }

    /// Lowercase label for logs
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Requested => "requested",
            JobState::CacheCheck => "cache_check",
            JobState::Queued => "queued",
            JobState::Fetching => "fetching",
            JobState::Uploading => "uploading",
            JobState::Delivered => "delivered",
            JobState::Failed => "failed",
            JobState::Cleaned => "cleaned",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing information for the transport, detached from the job itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    /// Job identifier
    pub job_id: JobId,
    /// Requesting user
    pub user_id: UserId,
    /// Chat to deliver into
    pub chat_id: ChatId,
    /// Source platform
    pub platform: Platform,
    /// Requested kind
    pub kind: MediaKind,
}

/// One user request
#[derive(Debug)]
pub struct DownloadJob {
    id: JobId,
    user_id: UserId,
    chat_id: ChatId,
    link: MediaLink,
    kind: MediaKind,
    no_watermark: bool,
    quality: Option<VideoQuality>,
    state: JobState,
    history: Vec<JobState>,
    storage: Option<TempStorage>,
    storage_releases: u32,
    metadata: Option<MediaMetadata>,
    last_error: Option<String>,
    attempts: u32,
    created_at: DateTime<Utc>,
}

impl DownloadJob {
    /// Create a job in the `Requested` state
    pub fn new(
        id: JobId,
        user_id: UserId,
        chat_id: ChatId,
        link: MediaLink,
        kind: MediaKind,
    ) -> Self {
        Self {
            id,
            user_id,
            chat_id,
            link,
            kind,
            no_watermark: false,
            quality: None,
            state: JobState::Requested,
            history: vec![JobState::Requested],
            storage: None,
            storage_releases: 0,
            metadata: None,
            last_error: None,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Ask for a watermark-free variant where the platform offers one
    pub fn with_no_watermark(mut self, no_watermark: bool) -> Self {
        self.no_watermark = no_watermark;
        self
    }

    /// Cap video height; without a cap the best available format is fetched
    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Job identifier
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Requesting user
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Source URL
    pub fn url(&self) -> &str {
        self.link.url()
    }

    /// Source platform
    pub fn platform(&self) -> Platform {
        self.link.platform()
    }

    /// Requested kind
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Watermark-free variant requested
    pub fn no_watermark(&self) -> bool {
        self.no_watermark
    }

    /// Video height cap, if any
    pub fn quality(&self) -> Option<VideoQuality> {
        self.quality
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state visited so far, in order
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// Metadata reported by the extractor
    pub fn metadata(&self) -> Option<&MediaMetadata> {
        self.metadata.as_ref()
    }

    /// Error message; set only once the job failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Extractor attempts started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Transport routing information
    pub fn ticket(&self) -> JobTicket {
        JobTicket {
            job_id: self.id,
            user_id: self.user_id,
            chat_id: self.chat_id,
            platform: self.link.platform(),
            kind: self.kind,
        }
    }

    /// Move to `next`, rejecting transitions outside the lifecycle table
    pub fn transition(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(job_id = self.id, from = %self.state, to = %next, "Job state transition");
        if next == JobState::Fetching {
            self.attempts += 1;
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a terminal error and move to `Failed`
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobState::Failed)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Force the job into `Failed` from any non-terminal state
    ///
    /// Used at the job boundary when an unexpected error escapes a step; the
    /// lifecycle table is not consulted.
    pub fn abort(&mut self, message: impl Into<String>) {
        if self.state.is_outcome() || self.state == JobState::Cleaned {
            return;
        }
        tracing::debug!(job_id = self.id, from = %self.state, "Job aborted");
        self.state = JobState::Failed;
        self.history.push(JobState::Failed);
        self.last_error = Some(message.into());
    }

    /// Temporary storage for the current fetch, allocated on first use
    ///
    /// Only legal while `Fetching`; later attempts reuse the same directory.
    pub fn storage_for_fetch(&mut self, root: Option<&Path>) -> Result<&TempStorage, JobError> {
        if self.state != JobState::Fetching {
            return Err(JobError::StorageOutsideFetch(self.state));
        }
        if self.storage.is_none() {
            let storage =
                TempStorage::allocate(root).map_err(|e| JobError::Storage(e.to_string()))?;
            self.storage = Some(storage);
        }
        self.storage
            .as_ref()
            .ok_or_else(|| JobError::Storage("storage vanished after allocation".to_string()))
    }

    /// Currently held storage, if any
    pub fn storage(&self) -> Option<&TempStorage> {
        self.storage.as_ref()
    }

    /// Store extractor metadata
    pub fn set_metadata(&mut self, metadata: MediaMetadata) {
        self.metadata = Some(metadata);
    }

    /// Release storage and move to `Cleaned`
    ///
    /// Safe to call more than once; storage is released at most once and
    /// the `Cleaned` transition happens only from `Delivered`/`Failed`.
    pub fn cleanup(&mut self) -> Result<(), JobError> {
        if self.state == JobState::Cleaned {
            return Ok(());
        }
        if !self.state.is_outcome() {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to: JobState::Cleaned,
            });
        }
        if let Some(storage) = self.storage.as_mut() {
            if storage.release() {
                self.storage_releases += 1;
            }
        }
        self.transition(JobState::Cleaned)
    }

    /// Summarise the finished job
    pub fn into_outcome(self, delivery: Option<Delivery>) -> JobOutcome {
        JobOutcome {
            job_id: self.id,
            url: self.link.url().to_string(),
            platform: self.link.platform(),
            kind: self.kind,
            history: self.history.clone(),
            attempts: self.attempts,
            delivery,
            error: self.last_error.clone(),
            storage_allocated: self.storage.is_some(),
            storage_released: self
                .storage
                .as_ref()
                .map(|s| s.is_released())
                .unwrap_or(false),
            storage_releases: self.storage_releases,
        }
    }
}

/// How a job reached the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-issued handle (absent for variants that are not cached)
    pub handle: Option<String>,
    /// Replayed from the artifact cache without fetching
    pub from_cache: bool,
}

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Job identifier
    pub job_id: JobId,
    /// Source URL
    pub url: String,
    /// Source platform
    pub platform: Platform,
    /// Requested kind
    pub kind: MediaKind,
    /// Every state visited, in order
    pub history: Vec<JobState>,
    /// Extractor attempts started
    pub attempts: u32,
    /// Delivery details when the job succeeded
    pub delivery: Option<Delivery>,
    /// Bounded error message when the job failed
    pub error: Option<String>,
    /// Temporary storage was ever allocated
    pub storage_allocated: bool,
    /// Temporary storage is released
    pub storage_released: bool,
    /// Number of effective releases (0 or 1)
    pub storage_releases: u32,
}

impl JobOutcome {
    /// Last state reached
    pub fn final_state(&self) -> JobState {
        self.history.last().copied().unwrap_or(JobState::Requested)
    }

    /// Whether the artifact reached the user
    pub fn is_delivered(&self) -> bool {
        self.delivery.is_some()
    }

    /// Whether the job ever entered `state`
    pub fn visited(&self, state: JobState) -> bool {
        self.history.contains(&state)
    }
}

/// Job lifecycle errors (internal invariant violations)
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Transition outside the lifecycle table
    #[error("invalid job transition {from} -> {to}")]
    InvalidTransition {
        /// State before
        from: JobState,
        /// Rejected successor
        to: JobState,
    },

    /// Storage requested outside `Fetching`
    #[error("temporary storage requested in state {0}")]
    StorageOutsideFetch(JobState),

    /// Storage could not be allocated
    #[error("temporary storage error: {0}")]
    Storage(String),
}
