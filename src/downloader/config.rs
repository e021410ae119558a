//! Scheduler configuration constants

use std::path::PathBuf;
use std::time::Duration;

/// Default number of concurrent fetches.
/// 100 keeps a single host busy without letting extractor processes exhaust
/// memory, temporary disk or outbound bandwidth.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 100;

/// Total extractor attempts per job (initial attempt + 1 retry).
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 2;

/// Fixed delay between extractor attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for a single extractor call; exceeding it counts as transient.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// At most one observable progress update per interval.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Per-user cooldown between admitted download requests.
pub const DEFAULT_REQUEST_COOLDOWN: Duration = Duration::from_secs(1);

/// Per-user throttle applied to every inbound update.
pub const DEFAULT_UPDATE_THROTTLE: Duration = Duration::from_millis(500);

/// Maximum characters of an error message shown to the user.
pub const MAX_ERROR_DISPLAY_CHARS: usize = 100;

/// Maximum characters of a media title shown in captions.
pub const MAX_TITLE_DISPLAY_CHARS: usize = 45;

/// Attempts for a single transport send (rate-limit and network retries).
pub const MAX_SEND_ATTEMPTS: u32 = 3;

/// Runtime configuration for [`crate::downloader::DownloadScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker slot pool capacity
    pub max_concurrent_fetches: usize,
    /// Total extractor attempts per job
    pub max_fetch_attempts: u32,
    /// Delay between extractor attempts
    pub retry_backoff: Duration,
    /// Timeout applied to every extractor call
    pub fetch_timeout: Duration,
    /// Minimum spacing between forwarded progress updates
    pub progress_interval: Duration,
    /// Parent directory for per-job temporary storage (system temp when `None`)
    pub temp_root: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_fetch_attempts: DEFAULT_MAX_FETCH_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            temp_root: None,
        }
    }
}

impl SchedulerConfig {
    /// Set worker slot pool capacity (clamped to at least 1)
    pub fn with_max_concurrent_fetches(mut self, capacity: usize) -> Self {
        self.max_concurrent_fetches = capacity.max(1);
        self
    }

    /// Set total extractor attempts (clamped to at least 1)
    pub fn with_max_fetch_attempts(mut self, attempts: u32) -> Self {
        self.max_fetch_attempts = attempts.max(1);
        self
    }

    /// Set delay between extractor attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set extractor call timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set progress forwarding interval
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set parent directory for temporary storage
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}
