//! URL to delivered-artifact cache
//!
//! After a first successful upload the transport hands back an opaque handle
//! (a remote file id). Caching it per source URL lets a repeat request be
//! answered by replaying the handle instead of extracting again.
//!
//! [`ArtifactCache`] never propagates store errors: a failing lookup is a
//! miss and a failing insert is logged and dropped. Stores themselves are
//! ordinary fallible [`ArtifactStore`] implementations.

use crate::MediaKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub mod file;

pub use file::FileArtifactStore;

/// One cached delivery, keyed by source URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCacheEntry {
    /// Source URL (unique key)
    pub url: String,
    /// Transport-issued artifact handle
    pub handle: String,
    /// Kind the handle refers to
    pub kind: MediaKind,
    /// When the entry was written
    pub inserted_at: DateTime<Utc>,
}

impl ArtifactCacheEntry {
    /// Entry stamped with the current time
    pub fn new(url: impl Into<String>, handle: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            handle: handle.into(),
            kind,
            inserted_at: Utc::now(),
        }
    }

    /// Whether this entry answers a request for `requested`
    ///
    /// The entry records the kind that was actually delivered. A video
    /// request for a photo post yields an image, so an image entry also
    /// answers later video requests for the same URL.
    pub fn serves(&self, requested: MediaKind) -> bool {
        self.kind == requested || (requested == MediaKind::Video && self.kind == MediaKind::Image)
    }
}

/// Cache store errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backing store unreachable or failing
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache file exceeds the size limit
    #[error("cache file too large: {size} bytes (max: {max} bytes)")]
    TooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Unsupported cache file schema
    #[error("unsupported cache schema version {0}")]
    Schema(String),
}

/// Backing store for cache entries
///
/// Implementations must be safe to share between tasks; upserts are expected
/// to be atomic per key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Entry for `url`, if any
    async fn get(&self, url: &str) -> Result<Option<ArtifactCacheEntry>, CacheError>;

    /// Insert or replace the entry for `url`
    async fn put(&self, url: &str, entry: ArtifactCacheEntry) -> Result<(), CacheError>;

    /// Number of stored entries
    async fn len(&self) -> Result<usize, CacheError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: DashMap<String, ArtifactCacheEntry>,
}

impl MemoryArtifactStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, url: &str) -> Result<Option<ArtifactCacheEntry>, CacheError> {
        Ok(self.entries.get(url).map(|e| e.value().clone()))
    }

    async fn put(&self, url: &str, entry: ArtifactCacheEntry) -> Result<(), CacheError> {
        self.entries.insert(url.to_string(), entry);
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }
}

/// Soft-failing cache facade used by the scheduler
#[derive(Clone)]
pub struct ArtifactCache {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactCache {
    /// Wrap a store
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Cache backed by a fresh [`MemoryArtifactStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArtifactStore::new()))
    }

    /// Look up `url`; store errors degrade to a miss
    pub async fn lookup(&self, url: &str) -> Option<ArtifactCacheEntry> {
        match self.store.get(url).await {
            Ok(Some(entry)) => {
                crate::metrics::record_cache_lookup(true);
                debug!(url, handle = %entry.handle, "Cache hit");
                Some(entry)
            }
            Ok(None) => {
                crate::metrics::record_cache_lookup(false);
                None
            }
            Err(e) => {
                crate::metrics::record_cache_lookup(false);
                warn!(url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Upsert `url -> handle`; failures are logged and dropped
    pub async fn insert(&self, url: &str, handle: &str, kind: MediaKind) {
        let entry = ArtifactCacheEntry::new(url, handle, kind);
        match self.store.put(url, entry).await {
            Ok(()) => debug!(url, handle, %kind, "Cached artifact handle"),
            Err(e) => warn!(url, error = %e, "Cache insert failed"),
        }
    }

    /// Entry count, if the store can report it
    pub async fn len(&self) -> Option<usize> {
        match self.store.len().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "Cache size unavailable");
                None
            }
        }
    }
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache").finish_non_exhaustive()
    }
}
