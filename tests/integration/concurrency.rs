//! Worker slot bound and queue order under load

use crate::common::{build_scheduler, job_for, test_config, RecordingTransport, ScriptedExtractor};
use media_relay_bot::cache::ArtifactCache;
use media_relay_bot::downloader::JobState;
use media_relay_bot::transport::StatusUpdate;
use media_relay_bot::MediaKind;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_concurrent_fetches_never_exceed_capacity() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding().with_delay(Duration::from_millis(40)));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = Arc::new(build_scheduler(
        test_config(3, root.path()),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport,
    ));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let url = format!("https://youtu.be/clip{i}");
            scheduler.spawn(job_for(&scheduler, &url, MediaKind::Video))
        })
        .collect();

    let mut delivered = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.final_state(), JobState::Cleaned);
        assert!(outcome.storage_released);
        if outcome.is_delivered() {
            delivered += 1;
        }
    }

    assert_eq!(delivered, 10);
    assert_eq!(extractor.calls(), 10);
    assert!(extractor.peak() <= 3, "peak was {}", extractor.peak());
    let stats = scheduler.stats();
    assert!(stats.peak_fetching <= 3);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.fetching, 0);
    assert_eq!(stats.available, 3);
}

#[tokio::test]
async fn test_queued_jobs_start_in_arrival_order() {
    let root = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::succeeding().with_delay(Duration::from_millis(30)));
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = Arc::new(build_scheduler(
        test_config(1, root.path()),
        ArtifactCache::in_memory(),
        extractor.clone(),
        transport.clone(),
    ));

    let urls = [
        "https://youtu.be/first",
        "https://youtu.be/second",
        "https://youtu.be/third",
        "https://youtu.be/fourth",
    ];
    let mut handles = Vec::new();
    let mut ids = Vec::new();
    for url in urls {
        let job = job_for(&scheduler, url, MediaKind::Video);
        ids.push(job.id());
        handles.push(scheduler.spawn(job));
        // Each job reaches the slot queue before the next one arrives
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_delivered());
    }

    let started = extractor.started.lock().unwrap().clone();
    assert_eq!(started, urls.iter().map(|u| u.to_string()).collect::<Vec<_>>());
    assert_eq!(extractor.peak(), 1);

    // Everyone behind the first job was told the bot is busy
    for id in &ids[1..] {
        assert!(transport.updates_for(*id).contains(&StatusUpdate::Busy));
    }
    assert!(!transport.updates_for(ids[0]).contains(&StatusUpdate::Busy));
}

#[tokio::test]
async fn test_cache_hits_bypass_busy_pool() {
    let root = TempDir::new().unwrap();
    let extractor =
        Arc::new(ScriptedExtractor::succeeding().with_delay(Duration::from_millis(200)));
    let transport = Arc::new(RecordingTransport::new());
    let cache = ArtifactCache::in_memory();
    cache
        .insert("https://youtu.be/cached", "cached-handle", MediaKind::Video)
        .await;
    let scheduler = Arc::new(build_scheduler(
        test_config(1, root.path()),
        cache,
        extractor.clone(),
        transport.clone(),
    ));

    let slow = scheduler.spawn(job_for(&scheduler, "https://youtu.be/slow", MediaKind::Video));
    while scheduler.stats().fetching == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let hit = tokio::time::timeout(
        Duration::from_millis(150),
        scheduler.submit(job_for(&scheduler, "https://youtu.be/cached", MediaKind::Video)),
    )
    .await
    .expect("cache hit must not wait for a slot");
    assert_eq!(hit.delivery.map(|d| d.from_cache), Some(true));
    assert!(slow.await.unwrap().is_delivered());
    assert_eq!(transport.replays(), vec!["cached-handle".to_string()]);
}
