//! Persistence of the JSON-file artifact store

use media_relay_bot::cache::file::FileArtifactStore;
use media_relay_bot::cache::{ArtifactCache, ArtifactCacheEntry, ArtifactStore, CacheError};
use media_relay_bot::MediaKind;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache").join("artifacts.json");

    {
        let store = FileArtifactStore::open(&path).unwrap();
        store
            .put(
                "https://youtu.be/abc123",
                ArtifactCacheEntry::new("https://youtu.be/abc123", "file-1", MediaKind::Video),
            )
            .await
            .unwrap();
    }
    assert!(path.exists());

    let reopened = FileArtifactStore::open(&path).unwrap();
    let entry = reopened.get("https://youtu.be/abc123").await.unwrap().unwrap();
    assert_eq!(entry.handle, "file-1");
    assert_eq!(entry.kind, MediaKind::Video);
    assert_eq!(reopened.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_file_opens_empty() {
    let dir = TempDir::new().unwrap();
    let store = FileArtifactStore::open(dir.path().join("absent.json")).unwrap();
    assert_eq!(store.len().await.unwrap(), 0);
    assert!(store.get("https://youtu.be/x").await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("artifacts.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = FileArtifactStore::open(&path).unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)), "got {err:?}");
}

#[tokio::test]
async fn test_facade_over_file_store_last_write_wins() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("artifacts.json");
    let cache = ArtifactCache::new(Arc::new(FileArtifactStore::open(&path).unwrap()));

    cache.insert("https://youtu.be/abc123", "old", MediaKind::Video).await;
    cache.insert("https://youtu.be/abc123", "new", MediaKind::Video).await;

    assert_eq!(cache.lookup("https://youtu.be/abc123").await.unwrap().handle, "new");
    assert_eq!(cache.len().await, Some(1));

    let reopened = FileArtifactStore::open(&path).unwrap();
    assert_eq!(
        reopened.get("https://youtu.be/abc123").await.unwrap().unwrap().handle,
        "new"
    );
}
