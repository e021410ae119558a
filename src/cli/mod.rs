//! CLI command implementations
//!
//! Every setting can come from a flag or from the environment, so the bot
//! runs unchanged in a container configured only through env vars.

pub mod error;
pub mod fetch;
pub mod platforms;
pub mod serve;

use crate::cache::{ArtifactCache, FileArtifactStore};
use crate::downloader::config::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::downloader::SchedulerConfig;
use crate::extractor::ExtractorRegistry;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use error::CliError;
pub use fetch::FetchArgs;
pub use platforms::PlatformsCommand;
pub use serve::ServeArgs;

/// Upper bound for the worker pool
const MAX_CONCURRENCY: usize = 1000;

/// Parse and validate the worker pool size
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Media relay bot CLI
#[derive(Parser, Debug)]
#[command(name = "media-relay-bot")]
#[command(
    about = "Chat bot that fetches media from popular platforms and relays it back",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum number of concurrent extractor runs (1-1000)
    #[arg(long, global = true, env = "MAX_CONCURRENT_DOWNLOADS",
          default_value_t = DEFAULT_MAX_CONCURRENT_FETCHES, value_parser = parse_concurrency)]
    pub max_concurrent_downloads: usize,

    /// Per-attempt extractor timeout in seconds
    #[arg(long, global = true, env = "DOWNLOAD_TIMEOUT_SECS",
          default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs(),
          value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub download_timeout_secs: u64,

    /// Extractor attempts per job; transient failures are retried (1-5)
    #[arg(long, global = true, env = "MAX_FETCH_ATTEMPTS", default_value = "2",
          value_parser = clap::value_parser!(u32).range(1..=5))]
    pub max_fetch_attempts: u32,

    /// JSON file persisting the artifact cache (in-memory when absent)
    #[arg(long, global = true, env = "CACHE_FILE")]
    pub cache_file: Option<PathBuf>,

    /// yt-dlp executable
    #[arg(long, global = true, env = "YTDLP_BIN", default_value = "yt-dlp")]
    pub ytdlp_bin: PathBuf,

    /// Root for per-job temporary directories (system temp when absent)
    #[arg(long, global = true, env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Prometheus scrape endpoint (disabled when absent)
    #[arg(long, global = true, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Telegram bot
    Serve(ServeArgs),

    /// Download one link into a local directory through the full pipeline
    Fetch(FetchArgs),

    /// List supported platforms
    Platforms(PlatformsCommand),
}

impl Cli {
    /// Scheduler settings from the global flags
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::default()
            .with_max_concurrent_fetches(self.max_concurrent_downloads)
            .with_max_fetch_attempts(self.max_fetch_attempts)
            .with_fetch_timeout(Duration::from_secs(self.download_timeout_secs));
        if let Some(root) = &self.temp_dir {
            config = config.with_temp_root(root.clone());
        }
        config
    }

    /// Artifact cache, file-backed when `--cache-file` is set
    pub fn open_cache(&self) -> Result<ArtifactCache, CliError> {
        match &self.cache_file {
            Some(path) => {
                let store = FileArtifactStore::open(path)?;
                info!(path = %path.display(), "Using file-backed artifact cache");
                Ok(ArtifactCache::new(Arc::new(store)))
            }
            None => {
                info!("Using in-memory artifact cache");
                Ok(ArtifactCache::in_memory())
            }
        }
    }

    /// Extractor wiring for every platform
    pub fn extractors(&self) -> Arc<ExtractorRegistry> {
        Arc::new(ExtractorRegistry::with_ytdlp(self.ytdlp_bin.clone()))
    }

    /// Start the Prometheus exporter when configured
    pub async fn init_metrics(&self) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
        }
        Ok(())
    }
}
