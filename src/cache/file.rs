//! JSON-file artifact store
//!
//! Entries live in memory and every write rewrites the whole file through a
//! temp file in the same directory followed by an atomic rename, so a crash
//! never leaves a half-written cache behind.

use super::{ArtifactCacheEntry, ArtifactStore, CacheError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Current on-disk schema version
const SCHEMA_VERSION: &str = "1";

/// Refuse to load cache files larger than this (64 MiB)
const MAX_CACHE_FILE_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    schema_version: String,
    entries: BTreeMap<String, ArtifactCacheEntry>,
}

/// Store persisted as a single JSON document
#[derive(Debug)]
pub struct FileArtifactStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ArtifactCacheEntry>>,
}

impl FileArtifactStore {
    /// Open `path`, starting empty if it does not exist yet
    ///
    /// # Errors
    /// Fails if the file exists but is unreadable, oversized or malformed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = if path.exists() {
            let size = std::fs::metadata(&path)?.len();
            if size > MAX_CACHE_FILE_SIZE {
                return Err(CacheError::TooLarge {
                    size,
                    max: MAX_CACHE_FILE_SIZE,
                });
            }
            let contents = std::fs::read_to_string(&path)?;
            let file: CacheFile = serde_json::from_str(&contents)?;
            if file.schema_version != SCHEMA_VERSION {
                return Err(CacheError::Schema(file.schema_version));
            }
            info!(path = %path.display(), entries = file.entries.len(), "Loaded artifact cache");
            file.entries
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(path: &Path, json: &str) -> Result<(), CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let parent_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(path)
            .map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn get(&self, url: &str) -> Result<Option<ArtifactCacheEntry>, CacheError> {
        Ok(self.entries.lock().await.get(url).cloned())
    }

    async fn put(&self, url: &str, entry: ArtifactCacheEntry) -> Result<(), CacheError> {
        // Held across the write so concurrent puts persist in order
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(url.to_string(), entry);

        let file = CacheFile {
            schema_version: SCHEMA_VERSION.to_string(),
            entries: next,
        };
        let json = serde_json::to_string_pretty(&file)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::save(&path, &json))
            .await
            .map_err(|e| CacheError::Unavailable(format!("cache writer panicked: {e}")))??;

        // Memory only changes once the file does
        *entries = file.entries;
        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "Persisted artifact cache"
        );
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.lock().await.len())
    }
}
