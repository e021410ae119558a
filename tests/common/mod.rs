//! Shared fakes for the integration suites
//!
//! `ScriptedExtractor` plays back a queue of outcomes, one per call, and
//! records how many fetches ran at once. `RecordingTransport` keeps every
//! status update and send so tests can assert on what the user saw.

#![allow(dead_code)]

use async_trait::async_trait;
use media_relay_bot::cache::{ArtifactCache, ArtifactCacheEntry, ArtifactStore, CacheError};
use media_relay_bot::downloader::{
    DownloadJob, DownloadScheduler, JobId, JobTicket, SchedulerConfig,
};
use media_relay_bot::extractor::{
    Extractor, ExtractorError, ExtractorRegistry, FetchRequest, FetchedMedia, MediaMetadata,
};
use media_relay_bot::link::MediaLink;
use media_relay_bot::transport::{
    MediaPayload, SentArtifact, StatusUpdate, Transport, TransportError,
};
use media_relay_bot::{MediaKind, VideoQuality};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted extractor call
#[derive(Debug, Clone)]
pub enum Step {
    /// Write a file and succeed with this metadata
    Ok(MediaMetadata),
    /// Fail with a retryable error
    Transient(&'static str),
    /// Fail with a permanent error
    Permanent(&'static str),
    /// Report a progress line, then succeed
    Progress(&'static str),
    /// Succeed with a small file of this kind, whatever was requested
    Produces(MediaKind),
    /// Never return
    Hang,
    /// Panic inside the fetch
    Panic,
}

/// Metadata used by the end-to-end scenarios
pub fn sample_metadata() -> MediaMetadata {
    MediaMetadata {
        title: Some("Test".to_string()),
        duration_secs: Some(65),
        size_mb: Some(12.3),
        thumbnail: None,
    }
}

/// Extractor that replays [`Step`]s; an empty script means success
pub struct ScriptedExtractor {
    steps: Mutex<VecDeque<Step>>,
    delay: Duration,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub dirs: Mutex<Vec<PathBuf>>,
    pub qualities: Mutex<Vec<Option<VideoQuality>>>,
}

impl ScriptedExtractor {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            dirs: Mutex::new(Vec::new()),
            qualities: Mutex::new(Vec::new()),
        }
    }

    /// Always succeeds
    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    /// Hold every fetch for `delay` before finishing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Ok(sample_metadata()))
    }

    async fn write_file(
        request: &FetchRequest<'_>,
        kind: MediaKind,
        metadata: MediaMetadata,
    ) -> Result<FetchedMedia, ExtractorError> {
        let path = request.output_dir.join("media.mp4");
        tokio::fs::write(&path, b"fake media bytes")
            .await
            .map_err(|e| ExtractorError::Permanent(e.to_string()))?;
        Ok(FetchedMedia {
            path,
            kind,
            metadata,
        })
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedMedia, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);
        self.started.lock().unwrap().push(request.url.to_string());
        self.dirs.lock().unwrap().push(request.output_dir.to_path_buf());
        self.qualities.lock().unwrap().push(request.quality);

        let step = self.next_step();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Step::Ok(metadata) => Self::write_file(request, request.kind, metadata).await,
            Step::Produces(kind) => {
                let metadata = MediaMetadata {
                    size_mb: Some(1.5),
                    ..sample_metadata()
                };
                Self::write_file(request, kind, metadata).await
            }
            Step::Transient(msg) => Err(ExtractorError::Transient(msg.to_string())),
            Step::Permanent(msg) => Err(ExtractorError::Permanent(msg.to_string())),
            Step::Progress(line) => {
                request.progress.report(line);
                // Let the forwarder pick the line up before the sink closes
                tokio::time::sleep(Duration::from_millis(50)).await;
                Self::write_file(request, request.kind, sample_metadata()).await
            }
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExtractorError::Transient("woke up".to_string()))
            }
            Step::Panic => panic!("extractor blew up"),
        }
    }
}

/// A send the transport accepted or refused
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub job_id: JobId,
    pub caption: String,
    pub path: PathBuf,
    pub file_present: bool,
}

/// Transport that records everything
#[derive(Default)]
pub struct RecordingTransport {
    pub updates: Mutex<Vec<(JobId, StatusUpdate)>>,
    pub sent: Mutex<Vec<SentRecord>>,
    pub replays: Mutex<Vec<String>>,
    pub send_attempts: AtomicUsize,
    pub fail_replay: AtomicBool,
    send_error: Mutex<Option<TransportError>>,
    next_handle: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every media send fails with `error`
    pub fn failing_sends(error: TransportError) -> Self {
        let transport = Self::default();
        *transport.send_error.lock().unwrap() = Some(error);
        transport
    }

    /// Every cached replay fails
    pub fn failing_replays() -> Self {
        let transport = Self::default();
        transport.fail_replay.store(true, Ordering::SeqCst);
        transport
    }

    pub fn updates_for(&self, job_id: JobId) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, u)| u.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn replays(&self) -> Vec<String> {
        self.replays.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn present(
        &self,
        ticket: &JobTicket,
        update: StatusUpdate,
    ) -> Result<(), TransportError> {
        self.updates.lock().unwrap().push((ticket.job_id, update));
        Ok(())
    }

    async fn send_media(
        &self,
        ticket: &JobTicket,
        payload: &MediaPayload,
    ) -> Result<SentArtifact, TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.send_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(SentRecord {
            job_id: ticket.job_id,
            caption: payload.caption.clone(),
            path: payload.path.clone(),
            file_present: payload.path.exists(),
        });
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SentArtifact {
            handle: Some(format!("file-{n}")),
        })
    }

    async fn send_cached(
        &self,
        _ticket: &JobTicket,
        entry: &ArtifactCacheEntry,
    ) -> Result<(), TransportError> {
        if self.fail_replay.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("file reference expired".to_string()));
        }
        self.replays.lock().unwrap().push(entry.handle.clone());
        Ok(())
    }
}

/// Store whose backend is always down
pub struct UnavailableStore;

#[async_trait]
impl ArtifactStore for UnavailableStore {
    async fn get(&self, _url: &str) -> Result<Option<ArtifactCacheEntry>, CacheError> {
        Err(CacheError::Unavailable("store offline".to_string()))
    }

    async fn put(&self, _url: &str, _entry: ArtifactCacheEntry) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("store offline".to_string()))
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("store offline".to_string()))
    }
}

/// Fast-retrying config with temp storage under `root`
pub fn test_config(capacity: usize, root: &std::path::Path) -> SchedulerConfig {
    SchedulerConfig::default()
        .with_max_concurrent_fetches(capacity)
        .with_retry_backoff(Duration::from_millis(10))
        .with_progress_interval(Duration::from_millis(1))
        .with_temp_root(root)
}

pub fn build_scheduler(
    config: SchedulerConfig,
    cache: ArtifactCache,
    extractor: Arc<ScriptedExtractor>,
    transport: Arc<RecordingTransport>,
) -> DownloadScheduler {
    DownloadScheduler::new(
        config,
        cache,
        Arc::new(ExtractorRegistry::new(extractor)),
        transport,
    )
}

pub fn job_for(scheduler: &DownloadScheduler, url: &str, kind: MediaKind) -> DownloadJob {
    let link = MediaLink::parse(url).unwrap();
    DownloadJob::new(scheduler.next_job_id(), 7, 7, link, kind)
}
