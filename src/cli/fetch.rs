//! One-shot download through the full scheduler
//!
//! Runs the same cache check, worker slot, retry and cleanup path as the bot,
//! but "delivers" into a local directory. With `--cache-file` a second run for
//! the same link is answered from the cache without fetching.

use crate::downloader::{DownloadJob, DownloadScheduler, JobOutcome};
use crate::link::MediaLink;
use crate::shutdown::SharedShutdown;
use crate::transport::ConsoleTransport;
use crate::{MediaKind, VideoQuality};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{Cli, CliError};

/// Local user id for CLI jobs
const CLI_USER: i64 = 0;

/// Fetch command arguments
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Link (or text containing a link)
    pub url: String,

    /// Media kind (defaults to the platform's first capability)
    #[arg(long)]
    pub kind: Option<MediaKind>,

    /// Cap video height (360p, 480p, 720p, 1080p); best available when omitted
    #[arg(long)]
    pub quality: Option<VideoQuality>,

    /// Ask for the watermark-free TikTok variant
    #[arg(long, default_value_t = false)]
    pub no_watermark: bool,

    /// Directory receiving the delivered file
    #[arg(long, short = 'o', default_value = "downloads")]
    pub output_dir: PathBuf,

    /// Print the outcome as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl FetchArgs {
    /// Run the download and print its outcome
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let link = MediaLink::parse(&self.url)?;
        let platform = link.platform();
        let kind = self.kind.unwrap_or_else(|| platform.default_kind());
        if !platform.supports(kind) {
            return Err(CliError::InvalidArgument(format!(
                "{} does not provide {kind}",
                platform.display_name()
            )));
        }

        cli.init_metrics().await?;
        let transport = Arc::new(ConsoleTransport::new(&self.output_dir));
        let scheduler = DownloadScheduler::new(
            cli.scheduler_config(),
            cli.open_cache()?,
            cli.extractors(),
            transport,
        )
        .with_shutdown(shutdown);

        info!(url = %link.url(), %platform, %kind, "Fetching");
        let mut job = DownloadJob::new(scheduler.next_job_id(), CLI_USER, CLI_USER, link, kind)
            .with_no_watermark(self.no_watermark);
        if let Some(quality) = self.quality {
            job = job.with_quality(quality);
        }
        let outcome = scheduler.submit(job).await;

        println!("{}", self.render(&outcome));
        match outcome.delivery {
            Some(_) => Ok(()),
            None => Err(CliError::DownloadFailed(
                outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    fn render(&self, outcome: &JobOutcome) -> String {
        if self.json {
            let history: Vec<&str> = outcome.history.iter().map(|s| s.as_str()).collect();
            return json!({
                "url": outcome.url,
                "platform": outcome.platform.id(),
                "kind": outcome.kind,
                "delivered": outcome.is_delivered(),
                "from_cache": outcome.delivery.as_ref().map(|d| d.from_cache),
                "path": outcome.delivery.as_ref().and_then(|d| d.handle.clone()),
                "attempts": outcome.attempts,
                "error": outcome.error,
                "history": history,
            })
            .to_string();
        }

        match &outcome.delivery {
            Some(delivery) => {
                let source = if delivery.from_cache { " (from cache)" } else { "" };
                format!(
                    "✓ Saved {}{source}",
                    delivery.handle.as_deref().unwrap_or("file")
                )
            }
            None => format!(
                "✗ Failed after {} attempt(s): {}",
                outcome.attempts,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
