//! End-to-end job flows through the scheduler with fake extractor and transport

use crate::common::{
    build_scheduler, job_for, test_config, RecordingTransport, ScriptedExtractor, Step,
    UnavailableStore,
};
use media_relay_bot::cache::{ArtifactCache, MemoryArtifactStore};
use media_relay_bot::downloader::JobState;
use media_relay_bot::shutdown::ShutdownCoordinator;
use media_relay_bot::transport::{StatusUpdate, TransportError};
use media_relay_bot::MediaKind;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const URL: &str = "https://youtu.be/abc123";

#[tokio::test]
async fn test_fresh_download_walks_full_state_path() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::new());
    let cache = ArtifactCache::in_memory();
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        cache.clone(),
        extractor.clone(),
        transport.clone(),
    );

    let job = job_for(&scheduler, URL, MediaKind::Video);
    let job_id = job.id();
    let outcome = scheduler.submit(job).await;

    assert_eq!(
        outcome.history,
        vec![
            JobState::Requested,
            JobState::CacheCheck,
            JobState::Queued,
            JobState::Fetching,
            JobState::Uploading,
            JobState::Delivered,
            JobState::Cleaned,
        ]
    );
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.storage_allocated);
    assert!(outcome.storage_released);
    assert_eq!(outcome.storage_releases, 1);

    let delivery = outcome.delivery.expect("delivered");
    assert!(!delivery.from_cache);
    assert_eq!(delivery.handle.as_deref(), Some("file-1"));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].file_present, "file must exist while uploading");
    assert!(sent[0].caption.contains("*Test*"));
    assert!(sent[0].caption.contains("1:05"));
    assert!(sent[0].caption.contains("12\\.3MB"));
    // Storage is gone once the job is cleaned
    assert!(!sent[0].path.exists());

    let entry = cache.lookup(URL).await.expect("cached");
    assert_eq!(entry.handle, "file-1");
    assert_eq!(entry.kind, MediaKind::Video);

    let updates = transport.updates_for(job_id);
    assert_eq!(updates.first(), Some(&StatusUpdate::Preparing));
    assert_eq!(updates.last(), Some(&StatusUpdate::Done));
    assert!(updates.contains(&StatusUpdate::Downloading));
    assert!(updates.contains(&StatusUpdate::Uploading));
}

#[tokio::test]
async fn test_second_request_replays_cached_handle() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport.clone(),
    );

    let first = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;
    assert!(first.is_delivered());

    let second_job = job_for(&scheduler, URL, MediaKind::Video);
    let second_id = second_job.id();
    let second = scheduler.submit(second_job).await;

    assert_eq!(
        second.history,
        vec![
            JobState::Requested,
            JobState::CacheCheck,
            JobState::Delivered,
            JobState::Cleaned,
        ]
    );
    assert!(!second.visited(JobState::Fetching));
    assert!(!second.storage_allocated);
    assert_eq!(second.delivery.as_ref().map(|d| d.from_cache), Some(true));
    assert_eq!(extractor.calls(), 1);
    assert_eq!(transport.replays(), vec!["file-1".to_string()]);
    assert!(transport.updates_for(second_id).contains(&StatusUpdate::CacheHit));
}

#[tokio::test]
async fn test_cached_entry_of_other_kind_is_a_miss() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::new());
    let cache = ArtifactCache::in_memory();
    cache.insert(URL, "audio-handle", MediaKind::Audio).await;
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        cache.clone(),
        extractor.clone(),
        transport.clone(),
    );

    let outcome = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;

    assert!(outcome.visited(JobState::Fetching));
    assert_eq!(extractor.calls(), 1);
    assert!(transport.replays().is_empty());
    assert_eq!(cache.lookup(URL).await.unwrap().kind, MediaKind::Video);
}

#[tokio::test]
async fn test_photo_post_is_cached_as_image_and_replayed() {
    let root = TempDir::new().unwrap();
    let post = "https://www.instagram.com/p/Cphoto1/";
    let extractor = Arc::new(ScriptedExtractor::new(vec![Step::Produces(MediaKind::Image)]));
    let transport = Arc::new(RecordingTransport::new());
    let cache = ArtifactCache::in_memory();
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        cache.clone(),
        extractor.clone(),
        transport.clone(),
    );

    let first = scheduler.submit(job_for(&scheduler, post, MediaKind::Video)).await;
    assert!(first.is_delivered());
    let entry = cache.lookup(post).await.expect("cached");
    assert_eq!(entry.kind, MediaKind::Image);

    // The same post asked for as video again is answered from the cache
    let second = scheduler.submit(job_for(&scheduler, post, MediaKind::Video)).await;
    assert_eq!(second.delivery.as_ref().map(|d| d.from_cache), Some(true));
    assert!(!second.visited(JobState::Fetching));
    assert_eq!(extractor.calls(), 1);
    assert_eq!(transport.replays(), vec![entry.handle]);

    // An audio request still needs a fetch
    let third = scheduler.submit(job_for(&scheduler, post, MediaKind::Audio)).await;
    assert!(third.visited(JobState::Fetching));
    assert_eq!(extractor.calls(), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![Step::Permanent("unsupported")]));
    let transport = Arc::new(RecordingTransport::new());
    let cache = ArtifactCache::in_memory();
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        cache.clone(),
        extractor.clone(),
        transport.clone(),
    );

    let job = job_for(&scheduler, URL, MediaKind::Video);
    let job_id = job.id();
    let outcome = scheduler.submit(job).await;

    assert!(!outcome.is_delivered());
    assert!(outcome.visited(JobState::Failed));
    assert_eq!(outcome.final_state(), JobState::Cleaned);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(extractor.calls(), 1);
    assert!(outcome.error.as_deref().unwrap().contains("unsupported"));
    assert!(outcome.storage_released);
    assert!(!extractor.dirs.lock().unwrap()[0].exists());
    assert!(cache.lookup(URL).await.is_none());
    assert_eq!(
        transport.updates_for(job_id).last(),
        Some(&StatusUpdate::Failed("unsupported".to_string()))
    );
}

#[tokio::test]
async fn test_transient_failure_retried_once_in_same_storage() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![
        Step::Transient("connection reset"),
        Step::Ok(crate::common::sample_metadata()),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport.clone(),
    );

    let outcome = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;

    assert!(outcome.is_delivered());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(extractor.calls(), 2);
    let fetching = outcome
        .history
        .iter()
        .filter(|s| **s == JobState::Fetching)
        .count();
    assert_eq!(fetching, 2);
    let dirs = extractor.dirs.lock().unwrap().clone();
    assert_eq!(dirs[0], dirs[1]);
    assert_eq!(outcome.storage_releases, 1);
}

#[tokio::test]
async fn test_transient_failures_stop_after_budget() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![
        Step::Transient("HTTP Error 503"),
        Step::Transient("HTTP Error 503"),
        Step::Ok(crate::common::sample_metadata()),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport,
    );

    let outcome = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;

    assert!(!outcome.is_delivered());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(extractor.calls(), 2);
    assert!(outcome.error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn test_hanging_extractor_times_out() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![Step::Hang, Step::Hang]));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()).with_fetch_timeout(Duration::from_millis(50)),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport,
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)),
    )
    .await
    .expect("timeout must bound the job");

    assert!(!outcome.is_delivered());
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.error.as_deref().unwrap().contains("timed out"));
    assert!(outcome.storage_released);
    assert_eq!(scheduler.stats().available, 1);
}

#[tokio::test]
async fn test_failed_replay_falls_through_to_fetch() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::failing_replays());
    let cache = ArtifactCache::new(Arc::new(MemoryArtifactStore::new()));
    cache.insert(URL, "stale-handle", MediaKind::Video).await;
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        cache.clone(),
        extractor.clone(),
        transport.clone(),
    );

    let job = job_for(&scheduler, URL, MediaKind::Video);
    let job_id = job.id();
    let outcome = scheduler.submit(job).await;

    assert!(outcome.is_delivered());
    assert_eq!(outcome.delivery.as_ref().map(|d| d.from_cache), Some(false));
    assert_eq!(
        &outcome.history[..4],
        &[
            JobState::Requested,
            JobState::CacheCheck,
            JobState::Queued,
            JobState::Fetching,
        ]
    );
    assert_eq!(extractor.calls(), 1);
    assert!(transport.updates_for(job_id).contains(&StatusUpdate::CacheHit));
    // Fresh handle replaces the stale one
    assert_eq!(cache.lookup(URL).await.unwrap().handle, "file-1");
}

#[tokio::test]
async fn test_unavailable_cache_degrades_to_fetch() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::new(Arc::new(UnavailableStore)),
        extractor.clone(),
        transport,
    );

    let first = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;
    let second = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;

    assert!(first.is_delivered());
    assert!(second.is_delivered());
    assert_eq!(extractor.calls(), 2);
    assert!(scheduler.cache().len().await.is_none());
}

#[tokio::test]
async fn test_rejected_upload_fails_without_caching() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::failing_sends(TransportError::Failed(
        "Bad Request: wrong file".to_string(),
    )));
    let cache = ArtifactCache::in_memory();
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        cache.clone(),
        extractor,
        transport.clone(),
    );

    let outcome = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;

    assert!(!outcome.is_delivered());
    assert!(outcome.visited(JobState::Uploading));
    assert!(outcome.visited(JobState::Failed));
    assert!(outcome.error.as_deref().unwrap().contains("wrong file"));
    assert!(outcome.storage_released);
    assert_eq!(transport.send_attempts(), 1);
    assert!(cache.lookup(URL).await.is_none());
}

#[tokio::test]
async fn test_oversized_upload_reports_too_large() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let transport = Arc::new(RecordingTransport::failing_sends(TransportError::EntityTooLarge));
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor,
        transport.clone(),
    );

    let job = job_for(&scheduler, URL, MediaKind::Video);
    let job_id = job.id();
    let outcome = scheduler.submit(job).await;

    assert!(!outcome.is_delivered());
    assert_eq!(transport.send_attempts(), 1);
    assert_eq!(transport.updates_for(job_id).last(), Some(&StatusUpdate::TooLarge));
}

#[tokio::test]
async fn test_progress_reaches_user_before_upload() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![Step::Progress("📥 42%")]));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor,
        transport.clone(),
    );

    let job = job_for(&scheduler, URL, MediaKind::Video);
    let job_id = job.id();
    scheduler.submit(job).await;

    let updates = transport.updates_for(job_id);
    let progress = updates
        .iter()
        .position(|u| matches!(u, StatusUpdate::Progress(line) if line.starts_with("📥 42%")))
        .expect("progress forwarded");
    let uploading = updates
        .iter()
        .position(|u| *u == StatusUpdate::Uploading)
        .unwrap();
    assert!(progress < uploading);
}

#[tokio::test]
async fn test_panicking_extractor_does_not_poison_scheduler() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![Step::Panic]));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport,
    );

    let crashed = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;
    assert_eq!(crashed.error.as_deref(), Some("internal error"));
    assert!(crashed.storage_released);

    let next = scheduler.submit(job_for(&scheduler, URL, MediaKind::Video)).await;
    assert!(next.is_delivered());
    assert_eq!(extractor.calls(), 2);
    assert_eq!(scheduler.stats().in_flight, 0);
}

#[tokio::test]
async fn test_shutdown_interrupts_retry_backoff() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(vec![Step::Transient(
        "network is unreachable",
    )]));
    let transport = Arc::new(RecordingTransport::new());
    let shutdown = ShutdownCoordinator::shared();
    let scheduler = Arc::new(
        build_scheduler(
            test_config(1, root.path()).with_retry_backoff(Duration::from_secs(30)),
            ArtifactCache::in_memory(),
            extractor.clone(),
            transport,
        )
        .with_shutdown(shutdown.clone()),
    );

    let handle = scheduler.spawn(job_for(&scheduler, URL, MediaKind::Video));
    while extractor.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.request_shutdown();

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("backoff must end on shutdown")
        .unwrap();
    assert!(!outcome.is_delivered());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(extractor.calls(), 1);
    assert!(outcome.storage_released);
}
