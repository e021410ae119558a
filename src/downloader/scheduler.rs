//! Download scheduler
//!
//! Drives one [`DownloadJob`] through its lifecycle:
//!
//! 1. **CacheCheck** - a cached handle for the URL is replayed; a failed
//!    replay falls through to a normal fetch.
//! 2. **Queued** - waits FIFO for a worker slot.
//! 3. **Fetching** - calls the platform's extractor under a timeout, retrying
//!    transient failures while attempts remain.
//! 4. **Uploading** - hands the file to the transport and caches the handle.
//! 5. **Cleaned** - temporary storage is released on every path.
//!
//! Everything that goes wrong inside a job, including a panic, ends as a
//! `Failed` outcome; nothing escapes [`DownloadScheduler::submit`].

use crate::cache::{ArtifactCache, ArtifactCacheEntry};
use crate::downloader::config::{SchedulerConfig, MAX_SEND_ATTEMPTS};
use crate::downloader::job::{
    Delivery, DownloadJob, JobError, JobId, JobOutcome, JobState, JobTicket,
};
use crate::downloader::progress::{spawn_forwarder, ProgressSink};
use crate::downloader::retry::{should_retry, wait_backoff};
use crate::downloader::slots::WorkerSlotPool;
use crate::extractor::classify::RetryContext;
use crate::extractor::{
    file_size_mb, Extractor, ExtractorError, ExtractorRegistry, FetchRequest, FetchedMedia,
};
use crate::metrics::{self, FailureReason};
use crate::shutdown::SharedShutdown;
use crate::transport::presenter::{bounded_error, caption};
use crate::transport::{
    send_with_retry, MediaPayload, SendLimits, SendVariant, StatusUpdate, Transport,
    TransportError,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Point-in-time scheduler counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs between submission and outcome
    pub in_flight: usize,
    /// Jobs currently holding a worker slot
    pub fetching: usize,
    /// Highest `fetching` value observed
    pub peak_fetching: usize,
    /// Worker pool size
    pub capacity: usize,
    /// Free worker slots
    pub available: usize,
}

/// Runs download jobs against a cache, an extractor registry and a transport
pub struct DownloadScheduler {
    config: SchedulerConfig,
    cache: ArtifactCache,
    extractors: Arc<ExtractorRegistry>,
    transport: Arc<dyn Transport>,
    slots: WorkerSlotPool,
    limits: SendLimits,
    signature: Option<String>,
    shutdown: Option<SharedShutdown>,
    next_job_id: AtomicU64,
    in_flight: AtomicUsize,
    fetching: AtomicUsize,
    peak_fetching: AtomicUsize,
}

impl std::fmt::Debug for DownloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadScheduler")
            .field("config", &self.config)
            .field("extractors", &self.extractors)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Decrements a counter when dropped
struct CounterGuard<'a>(&'a AtomicUsize);

impl<'a> CounterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), now)
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How the extractor phase ended
enum FetchResult {
    Fetched(FetchedMedia),
    Failed(ExtractorError),
    Interrupted(ExtractorError),
}

impl DownloadScheduler {
    /// Create a scheduler; the worker pool is sized from `config`
    ///
    /// Picks up the global shutdown handle when one is registered.
    pub fn new(
        config: SchedulerConfig,
        cache: ArtifactCache,
        extractors: Arc<ExtractorRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let slots = WorkerSlotPool::new(config.max_concurrent_fetches);
        Self {
            config,
            cache,
            extractors,
            transport,
            slots,
            limits: SendLimits::default(),
            signature: None,
            shutdown: crate::shutdown::get_global_shutdown(),
            next_job_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            fetching: AtomicUsize::new(0),
            peak_fetching: AtomicUsize::new(0),
        }
    }

    /// Override inline upload limits
    pub fn with_send_limits(mut self, limits: SendLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Signature line appended to captions
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Stop retry backoffs early when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Allocate a fresh job identifier
    pub fn next_job_id(&self) -> JobId {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            fetching: self.fetching.load(Ordering::SeqCst),
            peak_fetching: self.peak_fetching.load(Ordering::SeqCst),
            capacity: self.slots.capacity(),
            available: self.slots.available(),
        }
    }

    /// Artifact cache used for lookups and inserts
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Worker slot pool
    pub fn slots(&self) -> &WorkerSlotPool {
        &self.slots
    }

    /// Close the worker pool; queued jobs fail, running jobs finish
    pub fn close(&self) {
        self.slots.close();
    }

    /// Run `job` to its outcome on a background task
    pub fn spawn(self: &Arc<Self>, job: DownloadJob) -> JoinHandle<JobOutcome> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.submit(job).await })
    }

    /// Run `job` to completion
    ///
    /// Never fails: errors and panics inside the job end as a `Failed`
    /// outcome, and temporary storage is always released.
    pub async fn submit(&self, mut job: DownloadJob) -> JobOutcome {
        let ticket = job.ticket();
        let span = info_span!(
            "download_job",
            job_id = ticket.job_id,
            user_id = ticket.user_id,
            platform = %ticket.platform,
            kind = %ticket.kind,
        );

        async move {
            let started = Instant::now();
            let (_in_flight, _) = CounterGuard::enter(&self.in_flight);
            metrics::record_job_submitted(ticket.platform);
            info!(url = %job.url(), "Job submitted");

            let driven = AssertUnwindSafe(self.drive(&mut job, &ticket))
                .catch_unwind()
                .await;

            let delivery = match driven {
                Ok(Ok(delivery)) => delivery,
                Ok(Err(e)) => {
                    error!(state = %job.state(), error = %e, "Job aborted by internal error");
                    self.abort(&mut job, &ticket, "internal error").await;
                    None
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(state = %job.state(), panic = %message, "Job panicked");
                    self.abort(&mut job, &ticket, "internal error").await;
                    None
                }
            };

            if let Err(e) = job.cleanup() {
                error!(state = %job.state(), error = %e, "Job cleanup rejected");
            }

            let outcome = job.into_outcome(delivery);
            metrics::record_job_duration(started.elapsed());
            match &outcome.delivery {
                Some(d) => info!(
                    from_cache = d.from_cache,
                    attempts = outcome.attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job delivered"
                ),
                None => warn!(
                    attempts = outcome.attempts,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Job failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn abort(&self, job: &mut DownloadJob, ticket: &JobTicket, message: &str) {
        if job.state().is_outcome() {
            return;
        }
        job.abort(message);
        metrics::record_job_failed(FailureReason::Internal);
        self.notify(ticket, StatusUpdate::Failed(message.to_string()))
            .await;
    }

    /// State machine driver; `Err` only for invariant violations
    async fn drive(
        &self,
        job: &mut DownloadJob,
        ticket: &JobTicket,
    ) -> Result<Option<Delivery>, JobError> {
        job.transition(JobState::CacheCheck)?;
        self.notify(ticket, StatusUpdate::Preparing).await;

        if let Some(entry) = self.cache.lookup(job.url()).await {
            if !entry.serves(ticket.kind) {
                debug!(cached = %entry.kind, "Cached artifact is a different kind, fetching");
            } else if let Some(delivery) = self.replay(job, ticket, &entry).await? {
                return Ok(Some(delivery));
            }
        }

        job.transition(JobState::Queued)?;
        if self.slots.is_saturated() {
            self.notify(ticket, StatusUpdate::Busy).await;
        }
        let slot = match self.slots.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(error = %e, "No worker slot, giving up");
                job.abort("shutting down");
                metrics::record_job_failed(FailureReason::Shutdown);
                self.notify(ticket, StatusUpdate::Failed("shutting down".to_string()))
                    .await;
                return Ok(None);
            }
        };
        let (_fetching, now_fetching) = CounterGuard::enter(&self.fetching);
        self.peak_fetching.fetch_max(now_fetching, Ordering::SeqCst);

        job.transition(JobState::Fetching)?;
        self.notify(ticket, StatusUpdate::Downloading).await;

        let (err, reason) = match self.fetch_with_retry(job, ticket).await? {
            FetchResult::Fetched(media) => {
                let delivery = self.upload(job, ticket, media).await?;
                drop(slot);
                return Ok(delivery);
            }
            FetchResult::Interrupted(err) => (err, FailureReason::Shutdown),
            FetchResult::Failed(err) if err.is_transient() => {
                (err, FailureReason::ExtractorTransient)
            }
            FetchResult::Failed(err) => (err, FailureReason::ExtractorPermanent),
        };

        let message = bounded_error(err.message());
        job.fail(message.clone())?;
        metrics::record_job_failed(reason);
        self.notify(ticket, StatusUpdate::Failed(message)).await;
        Ok(None)
    }

    /// Replay a cached handle; `None` means fall through to a fetch
    async fn replay(
        &self,
        job: &mut DownloadJob,
        ticket: &JobTicket,
        entry: &ArtifactCacheEntry,
    ) -> Result<Option<Delivery>, JobError> {
        self.notify(ticket, StatusUpdate::CacheHit).await;
        match send_with_retry(MAX_SEND_ATTEMPTS, || {
            self.transport.send_cached(ticket, entry)
        })
        .await
        {
            Ok(()) => {
                job.transition(JobState::Delivered)?;
                metrics::record_job_delivered(ticket.platform, true);
                self.notify(ticket, StatusUpdate::Done).await;
                Ok(Some(Delivery {
                    handle: Some(entry.handle.clone()),
                    from_cache: true,
                }))
            }
            Err(e) => {
                warn!(
                    handle = %entry.handle,
                    error = %e,
                    "Cached artifact replay failed, fetching again"
                );
                metrics::record_cache_replay_failure();
                Ok(None)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        job: &mut DownloadJob,
        ticket: &JobTicket,
    ) -> Result<FetchResult, JobError> {
        let extractor = self.extractors.resolve(ticket.platform);
        debug!(extractor = extractor.name(), "Resolved extractor");

        let (sink, receiver) = ProgressSink::channel(self.config.progress_interval);
        let forwarder = spawn_forwarder(receiver, Arc::clone(&self.transport), ticket.clone());

        let result = self.run_attempts(job, extractor.as_ref(), &sink).await;

        // Drain progress before any later status so updates stay ordered
        sink.close();
        if let Err(e) = forwarder.await {
            debug!(error = %e, "Progress forwarder ended abnormally");
        }
        result
    }

    async fn run_attempts(
        &self,
        job: &mut DownloadJob,
        extractor: &dyn Extractor,
        sink: &ProgressSink,
    ) -> Result<FetchResult, JobError> {
        let max_attempts = self.config.max_fetch_attempts.max(1);
        let timeout = self.config.fetch_timeout;

        loop {
            let attempt = job.attempts();
            let output_dir = {
                let storage = job.storage_for_fetch(self.config.temp_root.as_deref())?;
                if attempt > 1 {
                    storage
                        .clear()
                        .map_err(|e| JobError::Storage(e.to_string()))?;
                }
                storage.path().to_path_buf()
            };

            metrics::record_fetch_attempt(job.platform());
            debug!(attempt, max_attempts, dir = %output_dir.display(), "Starting extractor");

            let request = FetchRequest {
                url: job.url(),
                platform: job.platform(),
                kind: job.kind(),
                no_watermark: job.no_watermark(),
                quality: job.quality(),
                output_dir: &output_dir,
                progress: sink.clone(),
            };
            let result = match tokio::time::timeout(timeout, extractor.fetch(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ExtractorError::Transient(format!(
                    "extractor timed out after {}s",
                    timeout.as_secs()
                ))),
            };

            let err = match result {
                Ok(media) => {
                    info!(attempt, path = %media.path.display(), "Extractor finished");
                    return Ok(FetchResult::Fetched(media));
                }
                Err(e) => e,
            };

            let context = RetryContext {
                attempt,
                max_attempts,
                backoff: self.config.retry_backoff,
                url: job.url().to_string(),
                error_message: err.message().to_string(),
            };

            if !should_retry(&err, attempt, max_attempts) {
                warn!(class = ?err.class(), "{}", context.format_failure());
                return Ok(FetchResult::Failed(err));
            }

            warn!("{}", context.format_retry());
            metrics::record_fetch_retry(job.platform(), self.config.retry_backoff);
            if !wait_backoff(self.config.retry_backoff, self.shutdown.as_ref()).await {
                return Ok(FetchResult::Interrupted(err));
            }
            job.transition(JobState::Fetching)?;
        }
    }

    async fn upload(
        &self,
        job: &mut DownloadJob,
        ticket: &JobTicket,
        media: FetchedMedia,
    ) -> Result<Option<Delivery>, JobError> {
        let FetchedMedia {
            path,
            kind,
            mut metadata,
        } = media;
        if metadata.size_mb.is_none() {
            metadata.size_mb = file_size_mb(&path).await;
        }

        job.transition(JobState::Uploading)?;
        self.notify(ticket, StatusUpdate::Uploading).await;

        let variant = SendVariant::select(kind, metadata.size_mb, &self.limits);
        let payload = MediaPayload {
            variant,
            kind,
            path,
            caption: caption(ticket.platform, &metadata, self.signature.as_deref()),
            title: metadata.title.clone(),
            duration_secs: metadata.duration_secs,
            size_mb: metadata.size_mb,
            thumbnail: metadata.thumbnail.clone(),
        };
        job.set_metadata(metadata);

        match send_with_retry(MAX_SEND_ATTEMPTS, || {
            self.transport.send_media(ticket, &payload)
        })
        .await
        {
            Ok(sent) => {
                match sent.handle.as_deref() {
                    Some(handle) if variant.is_cacheable() => {
                        // Keyed by what was delivered, not what was asked for
                        self.cache.insert(job.url(), handle, kind).await;
                    }
                    _ => debug!(%variant, "Send result not cached"),
                }
                job.transition(JobState::Delivered)?;
                metrics::record_job_delivered(ticket.platform, false);
                self.notify(ticket, StatusUpdate::Done).await;
                Ok(Some(Delivery {
                    handle: sent.handle,
                    from_cache: false,
                }))
            }
            Err(e) => {
                let message = bounded_error(&e.to_string());
                job.fail(message.clone())?;
                metrics::record_job_failed(FailureReason::Send);
                let update = match e {
                    TransportError::EntityTooLarge => StatusUpdate::TooLarge,
                    _ => StatusUpdate::Failed(message),
                };
                self.notify(ticket, update).await;
                Ok(None)
            }
        }
    }

    async fn notify(&self, ticket: &JobTicket, update: StatusUpdate) {
        if let Err(e) = self.transport.present(ticket, update).await {
            debug!(error = %e, "Status update not delivered");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
