//! Observability metrics for the download pipeline
//!
//! Counters and gauges are recorded through the `metrics` facade at all
//! times; they only leave the process when [`init_metrics`] has installed the
//! Prometheus exporter. Without an exporter every `record_*` call is a no-op.
//!
//! ## Metric names
//!
//! - `jobs_submitted_total{platform}`
//! - `cache_hits_total` / `cache_misses_total` / `cache_replay_failures_total`
//! - `fetch_attempts_total{platform}` / `fetch_retries_total{platform}`
//! - `jobs_delivered_total{platform, source}`
//! - `jobs_failed_total{reason}`
//! - `worker_slots_in_use`
//! - `job_duration_seconds`

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::platform::Platform;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Why a job ended without delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Extractor failed transiently on every attempt
    ExtractorTransient,
    /// Extractor failed permanently
    ExtractorPermanent,
    /// Transport refused or lost the upload
    Send,
    /// Invariant violation or caught panic
    Internal,
    /// Worker pool closed while queued
    Shutdown,
}

impl FailureReason {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ExtractorTransient => "extractor_transient",
            FailureReason::ExtractorPermanent => "extractor_permanent",
            FailureReason::Send => "send",
            FailureReason::Internal => "internal",
            FailureReason::Shutdown => "shutdown",
        }
    }
}

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "jobs_submitted_total",
        Unit::Count,
        "Download jobs accepted by the scheduler"
    );

    describe_counter!(
        "cache_hits_total",
        Unit::Count,
        "Links answered from the artifact cache"
    );

    describe_counter!(
        "cache_misses_total",
        Unit::Count,
        "Links with no cached artifact (or an unreadable cache)"
    );

    describe_counter!(
        "cache_replay_failures_total",
        Unit::Count,
        "Cached handles the transport refused to replay"
    );

    describe_counter!(
        "fetch_attempts_total",
        Unit::Count,
        "Extractor invocations"
    );

    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Extractor invocations that were retries of a transient failure"
    );

    describe_counter!(
        "jobs_delivered_total",
        Unit::Count,
        "Jobs that ended with media delivered"
    );

    describe_counter!(
        "jobs_failed_total",
        Unit::Count,
        "Jobs that ended without delivery, by reason"
    );

    describe_gauge!(
        "worker_slots_in_use",
        Unit::Count,
        "Worker slots currently held by fetching jobs"
    );

    describe_histogram!(
        "job_duration_seconds",
        Unit::Seconds,
        "Wall time from submission to outcome"
    );

    *initialized = true;
    info!("Metrics system initialized successfully");

    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// A job entered the scheduler
pub fn record_job_submitted(platform: Platform) {
    counter!("jobs_submitted_total", "platform" => platform.id()).increment(1);
}

/// Result of a cache lookup (errors count as misses)
pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("cache_hits_total").increment(1);
    } else {
        counter!("cache_misses_total").increment(1);
    }
}

/// A cached handle could not be replayed
pub fn record_cache_replay_failure() {
    counter!("cache_replay_failures_total").increment(1);
}

/// An extractor call is about to start
pub fn record_fetch_attempt(platform: Platform) {
    counter!("fetch_attempts_total", "platform" => platform.id()).increment(1);
}

/// A transient failure is being retried after `backoff`
pub fn record_fetch_retry(platform: Platform, backoff: Duration) {
    counter!("fetch_retries_total", "platform" => platform.id()).increment(1);
    debug!(
        platform = %platform,
        backoff_ms = backoff.as_millis(),
        "Fetch retry recorded"
    );
}

/// A job delivered media
pub fn record_job_delivered(platform: Platform, from_cache: bool) {
    let source = if from_cache { "cache" } else { "fetch" };
    counter!(
        "jobs_delivered_total",
        "platform" => platform.id(),
        "source" => source,
    )
    .increment(1);
}

/// A job ended without delivery
pub fn record_job_failed(reason: FailureReason) {
    counter!("jobs_failed_total", "reason" => reason.as_str()).increment(1);
}

/// Current number of held worker slots
pub fn record_slots_in_use(in_use: usize) {
    gauge!("worker_slots_in_use").set(in_use as f64);
}

/// Submission-to-outcome latency
pub fn record_job_duration(duration: Duration) {
    histogram!("job_duration_seconds").record(duration.as_secs_f64());
}
