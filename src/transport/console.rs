//! Local-directory transport for the `fetch` command.
//!
//! "Uploading" copies the fetched file into an output directory; the stored
//! path is the artifact handle, so a cached replay only has to check that the
//! file is still there. Status updates drive an indicatif spinner per job.

use super::{MediaPayload, SentArtifact, StatusUpdate, Transport, TransportError};
use crate::cache::ArtifactCacheEntry;
use crate::downloader::job::{JobId, JobTicket};
use async_trait::async_trait;
use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Transport that writes artifacts to a directory
#[derive(Debug)]
pub struct ConsoleTransport {
    output_dir: PathBuf,
    bars: MultiProgress,
    spinners: DashMap<JobId, ProgressBar>,
}

impl ConsoleTransport {
    /// Deliver into `output_dir` (created on first send)
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            bars: MultiProgress::new(),
            spinners: DashMap::new(),
        }
    }

    /// Suppress terminal output (tests, non-interactive runs)
    pub fn hidden(output_dir: impl Into<PathBuf>) -> Self {
        let transport = Self::new(output_dir);
        transport.bars.set_draw_target(ProgressDrawTarget::hidden());
        transport
    }

    /// Destination directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn spinner(&self, ticket: &JobTicket) -> ProgressBar {
        self.spinners
            .entry(ticket.job_id)
            .or_insert_with(|| {
                let pb = self.bars.add(ProgressBar::new_spinner());
                let style = ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                pb.set_style(style);
                pb.set_prefix(format!("{} {}", ticket.platform.emoji(), ticket.platform));
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            })
            .clone()
    }

    fn finish(&self, ticket: &JobTicket, message: String) {
        if let Some((_, pb)) = self.spinners.remove(&ticket.job_id) {
            pb.finish_with_message(message);
        }
    }

    fn target_name(ticket: &JobTicket, source: &Path) -> String {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        format!("{}-{}-{file_name}", ticket.platform.id(), ticket.job_id)
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn present(
        &self,
        ticket: &JobTicket,
        update: StatusUpdate,
    ) -> Result<(), TransportError> {
        let message = match update {
            StatusUpdate::Preparing => "preparing".to_string(),
            StatusUpdate::CacheHit => "found in cache".to_string(),
            StatusUpdate::Busy => "all workers busy, queued".to_string(),
            StatusUpdate::Downloading => "downloading".to_string(),
            StatusUpdate::Progress(line) => line,
            StatusUpdate::Uploading => "saving".to_string(),
            StatusUpdate::Done => {
                self.finish(ticket, "done".to_string());
                return Ok(());
            }
            StatusUpdate::Failed(message) => {
                self.finish(ticket, format!("failed: {message}"));
                return Ok(());
            }
            StatusUpdate::TooLarge => {
                self.finish(ticket, "failed: file too large".to_string());
                return Ok(());
            }
        };
        self.spinner(ticket).set_message(message);
        Ok(())
    }

    async fn send_media(
        &self,
        ticket: &JobTicket,
        payload: &MediaPayload,
    ) -> Result<SentArtifact, TransportError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| TransportError::Failed(format!("cannot create output dir: {e}")))?;

        let target = self.output_dir.join(Self::target_name(ticket, &payload.path));
        tokio::fs::copy(&payload.path, &target)
            .await
            .map_err(|e| TransportError::Failed(format!("cannot store file: {e}")))?;

        info!(
            job_id = ticket.job_id,
            path = %target.display(),
            variant = %payload.variant,
            "Saved artifact"
        );
        Ok(SentArtifact {
            handle: Some(target.to_string_lossy().into_owned()),
        })
    }

    async fn send_cached(
        &self,
        ticket: &JobTicket,
        entry: &ArtifactCacheEntry,
    ) -> Result<(), TransportError> {
        match tokio::fs::metadata(&entry.handle).await {
            Ok(meta) if meta.is_file() => {
                info!(job_id = ticket.job_id, path = %entry.handle, "Artifact already saved");
                Ok(())
            }
            _ => Err(TransportError::Failed(format!(
                "cached artifact {} is gone",
                entry.handle
            ))),
        }
    }
}
