//! yt-dlp subprocess extractor
//!
//! Runs yt-dlp once per attempt with the job's directory as output template
//! root. Progress lines on stdout are parsed and fed to the progress sink; the
//! final info line (printed after the file is moved into place) carries the
//! metadata. Failures are classified from stderr.
//!
//! The child is spawned with `kill_on_drop`, so a caller that times out and
//! drops the future also stops the process.

use super::classify::{classify_stderr, error_summary, FailureKind};
use super::{
    file_size_mb, Extractor, ExtractorError, ExtractorResult, FetchRequest, FetchedMedia,
    MediaMetadata,
};
use crate::{MediaKind, VideoQuality};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Socket timeout passed to yt-dlp
const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Thumbnail download timeout
const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Output file stem inside the job directory
const OUTPUT_STEM: &str = "media";

const VIDEO_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best";
const AUDIO_FORMAT: &str = "bestaudio/best";

const PROGRESS_TEMPLATE: &str = "download:[download] %(progress._percent_str)s \
    of %(progress._total_bytes_str)s at %(progress._speed_str)s ETA %(progress._eta_str)s";
const INFO_TEMPLATE: &str = "after_move:%(.{id,title,duration,thumbnail,filepath,ext})j";

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg", "oga", "wav", "flac", "aac"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "m4v"];
const SCRATCH_EXTENSIONS: &[&str] = &["part", "ytdl", "json", "tmp"];

/// Format selector for video, capped at `quality` when given
pub fn video_format(quality: Option<VideoQuality>) -> String {
    match quality {
        None => VIDEO_FORMAT.to_string(),
        Some(q) => {
            let h = q.height();
            format!(
                "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/\
                 bestvideo[height<={h}]+bestaudio/best[height<={h}]/best"
            )
        }
    }
}

/// Info line printed by yt-dlp after the download is finalized
#[derive(Debug, Clone, Default, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    filepath: Option<String>,
}

/// One parsed `[download]` progress line
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Percent complete (0-100)
    pub percent: f32,
    /// Total size as printed by yt-dlp ("12.50MiB")
    pub total: Option<String>,
    /// Transfer speed as printed ("2.10MiB/s")
    pub speed: Option<String>,
    /// Remaining time as printed ("00:05")
    pub eta: Option<String>,
}

impl std::fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "📥 {:.0}%", self.percent)?;
        if let Some(total) = &self.total {
            write!(f, " of {total}")?;
        }
        if let Some(speed) = &self.speed {
            write!(f, " · {speed}")?;
        }
        if let Some(eta) = &self.eta {
            write!(f, " · ETA {eta}")?;
        }
        Ok(())
    }
}

fn known(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || v == "NA" || v.contains("Unknown") {
        None
    } else {
        Some(v.to_string())
    }
}

/// Parse a yt-dlp `[download]` line; `None` for anything else.
pub fn parse_progress(line: &str) -> Option<DownloadProgress> {
    let rest = line.trim().strip_prefix("[download]")?;
    if !rest.contains('%') {
        return None;
    }

    let parts: Vec<&str> = rest.split_whitespace().collect();
    let mut progress = DownloadProgress {
        percent: 0.0,
        total: None,
        speed: None,
        eta: None,
    };
    let mut found_percent = false;

    for (i, part) in parts.iter().enumerate() {
        if let Some(p) = part.strip_suffix('%') {
            if let Ok(p) = p.parse::<f32>() {
                progress.percent = p.clamp(0.0, 100.0);
                found_percent = true;
            }
        }
        let next = parts.get(i + 1).copied();
        match (*part, next) {
            ("of", Some(v)) => progress.total = known(v.trim_start_matches('~')),
            ("at", Some(v)) => progress.speed = known(v),
            ("ETA", Some(v)) => progress.eta = known(v),
            _ => {}
        }
    }

    found_percent.then_some(progress)
}

/// Kind of media a file extension denotes
pub fn kind_from_extension(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Audio)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Locate the produced media file inside `dir`.
///
/// Scratch files are skipped. Files matching the requested kind win over
/// others, so a stray thumbnail never shadows the video.
pub async fn find_output(dir: &Path, wanted: MediaKind) -> Option<(PathBuf, MediaKind)> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut candidates = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let scratch = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SCRATCH_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if scratch {
            continue;
        }
        if let Some(kind) = kind_from_extension(&path) {
            candidates.push((path, kind));
        }
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    let preferred = candidates.iter().position(|(_, kind)| *kind == wanted);
    match preferred {
        Some(idx) => Some(candidates.swap_remove(idx)),
        None => candidates.into_iter().next(),
    }
}

/// Extractor backed by the yt-dlp command line tool
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: PathBuf,
    leading_args: Vec<String>,
    http: reqwest::Client,
}

impl YtDlpExtractor {
    /// Use the yt-dlp executable at `binary` (looked up on `PATH` if bare)
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Arguments placed before the generated ones (e.g. `-m yt_dlp` for a python launcher)
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// HTTP client used for thumbnails
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Executable path
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line for `request`, excluding the executable
    pub fn build_args(&self, request: &FetchRequest<'_>) -> Vec<String> {
        let template = request
            .output_dir
            .join(format!("{OUTPUT_STEM}.%(ext)s"))
            .to_string_lossy()
            .into_owned();

        let mut args = self.leading_args.clone();
        args.extend(
            [
                "--no-playlist",
                "--no-warnings",
                "--newline",
                "--progress",
                "--force-ipv4",
                "--no-mtime",
            ]
            .map(String::from),
        );
        args.push("--socket-timeout".into());
        args.push(SOCKET_TIMEOUT_SECS.to_string());
        args.push("--progress-template".into());
        args.push(PROGRESS_TEMPLATE.into());
        args.push("--print".into());
        args.push(INFO_TEMPLATE.into());

        match request.kind {
            MediaKind::Audio => {
                args.extend(
                    [
                        "-f",
                        AUDIO_FORMAT,
                        "--extract-audio",
                        "--audio-format",
                        "mp3",
                        "--audio-quality",
                        "320K",
                    ]
                    .map(String::from),
                );
            }
            MediaKind::Video => {
                args.push("-f".into());
                args.push(video_format(request.quality));
                args.extend(["--merge-output-format", "mp4"].map(String::from));
            }
            MediaKind::Image => {
                args.extend(["-f", "best"].map(String::from));
            }
        }

        args.push("-o".into());
        args.push(template);
        args.push("--".into());
        args.push(request.url.to_string());
        args
    }

    async fn fetch_thumbnail(&self, url: &str) -> Option<bytes::Bytes> {
        let response = self
            .http
            .get(url)
            .timeout(THUMBNAIL_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.bytes().await.ok()
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> ExtractorResult<FetchedMedia> {
        let args = self.build_args(request);
        debug!(
            binary = %self.binary.display(),
            url = request.url,
            kind = %request.kind,
            quality = ?request.quality,
            "Spawning yt-dlp"
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let kind = if e.kind() == std::io::ErrorKind::NotFound {
                    FailureKind::ToolMissing
                } else {
                    FailureKind::Unknown
                };
                ExtractorError::from_class(
                    kind.class(),
                    format!("{}: {e}", kind.description()),
                )
            })?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut info: Option<YtDlpInfo> = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parse_progress(&line) {
                    request.progress.report(progress.to_string());
                } else if line.trim_start().starts_with('{') {
                    match serde_json::from_str::<YtDlpInfo>(line.trim()) {
                        Ok(parsed) => info = Some(parsed),
                        Err(e) => debug!(error = %e, "Ignoring unparsable yt-dlp info line"),
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            ExtractorError::Transient(format!("failed to wait for yt-dlp: {e}"))
        })?;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let kind = classify_stderr(&stderr);
            let summary = error_summary(&stderr);
            let message = if summary.is_empty() {
                kind.description().to_string()
            } else {
                summary
            };
            warn!(
                url = request.url,
                exit_code = ?status.code(),
                failure = ?kind,
                "yt-dlp failed"
            );
            return Err(ExtractorError::from_class(kind.class(), message));
        }

        let info = info.unwrap_or_default();
        let reported = info
            .filepath
            .as_deref()
            .map(PathBuf::from)
            .filter(|p| p.starts_with(request.output_dir) && p.is_file())
            .and_then(|p| kind_from_extension(&p).map(|k| (p, k)));

        let (path, kind) = match reported {
            Some(found) => found,
            None => find_output(request.output_dir, request.kind)
                .await
                .ok_or_else(|| {
                    ExtractorError::Permanent(FailureKind::NoMedia.description().to_string())
                })?,
        };

        let thumbnail = match (&info.thumbnail, kind) {
            (Some(url), MediaKind::Video | MediaKind::Audio) => self.fetch_thumbnail(url).await,
            _ => None,
        };

        debug!(path = %path.display(), id = ?info.id, "yt-dlp produced file");

        Ok(FetchedMedia {
            metadata: MediaMetadata {
                title: info.title,
                duration_secs: info.duration.map(|d| d.max(0.0).round() as u64),
                size_mb: file_size_mb(&path).await,
                thumbnail,
            },
            path,
            kind,
        })
    }
}
