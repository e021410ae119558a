//! Download orchestration and admission control
//!
//! This module holds everything between "a user sent a link" and "the file
//! reached the user":
//!
//! 1. **Admission**: per-user cooldown via [`rate_limit::RateLimiter`]
//! 2. **Job**: lifecycle state machine in [`job::DownloadJob`]
//! 3. **Scheduling**: cache check, FIFO worker slots and retries in
//!    [`scheduler::DownloadScheduler`]
//! 4. **Storage**: per-job temporary directories in [`storage::TempStorage`]
//! 5. **Progress**: throttled extractor progress in [`progress::ProgressSink`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_relay_bot::cache::ArtifactCache;
//! use media_relay_bot::downloader::{DownloadJob, DownloadScheduler, RateLimiter, SchedulerConfig};
//! use media_relay_bot::extractor::ExtractorRegistry;
//! use media_relay_bot::transport::ConsoleTransport;
//! use media_relay_bot::{MediaKind, MediaLink};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::new(Duration::from_secs(1));
//! let scheduler = Arc::new(DownloadScheduler::new(
//!     SchedulerConfig::default().with_max_concurrent_fetches(4),
//!     ArtifactCache::in_memory(),
//!     Arc::new(ExtractorRegistry::with_ytdlp("yt-dlp")),
//!     Arc::new(ConsoleTransport::new("./downloads")),
//! ));
//!
//! if limiter.admit(42) {
//!     let link = MediaLink::parse("https://youtu.be/abc123")?;
//!     let job = DownloadJob::new(scheduler.next_job_id(), 42, 42, link, MediaKind::Video);
//!     let outcome = scheduler.spawn(job).await?;
//!     println!("{:?}", outcome.final_state());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! [`DownloadScheduler::submit`] does not return errors. Extractor, transport
//! and internal failures all end as a `Failed` [`JobOutcome`] carrying a
//! bounded message; cache errors are swallowed and degrade to a miss.

pub mod config;
pub mod job;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod slots;
pub mod storage;

pub use config::SchedulerConfig;
pub use job::{Delivery, DownloadJob, JobError, JobId, JobOutcome, JobState, JobTicket};
pub use progress::{ProgressReceiver, ProgressSink};
pub use rate_limit::RateLimiter;
pub use scheduler::{DownloadScheduler, SchedulerStats};
pub use slots::{SlotError, WorkerSlot, WorkerSlotPool};
pub use storage::TempStorage;
