//! TikTok extractor with a watermark-free path.
//!
//! When the job asks for no watermark, the clip is resolved through the tikwm
//! API and downloaded directly. Any problem on that path falls back to the
//! regular yt-dlp extractor, which yields the watermarked clip.

use super::classify::classify_http;
use super::{
    file_size_mb, Extractor, ExtractorError, ExtractorResult, FetchRequest, FetchedMedia,
    MediaMetadata, YtDlpExtractor,
};
use crate::MediaKind;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Default no-watermark resolver endpoint
pub const DEFAULT_TIKWM_API: &str = "https://www.tikwm.com/api/";

const API_TIMEOUT: Duration = Duration::from_secs(30);
const VIDEO_TIMEOUT: Duration = Duration::from_secs(60);
const OUTPUT_FILE: &str = "video.mp4";
const TITLE_SUFFIX: &str = " (no watermark)";

#[derive(Debug, Deserialize)]
struct TikwmResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TikwmData>,
}

#[derive(Debug, Deserialize)]
struct TikwmData {
    #[serde(default)]
    play: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    cover: Option<String>,
}

/// TikTok handler: tikwm first when asked, yt-dlp otherwise
#[derive(Debug, Clone)]
pub struct TikTokExtractor {
    fallback: Arc<YtDlpExtractor>,
    http: reqwest::Client,
    api_base: String,
}

impl TikTokExtractor {
    /// Wrap the yt-dlp extractor used as fallback
    pub fn new(fallback: Arc<YtDlpExtractor>) -> Self {
        Self {
            fallback,
            http: reqwest::Client::new(),
            api_base: DEFAULT_TIKWM_API.to_string(),
        }
    }

    /// Override the resolver endpoint
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// HTTP client for the API and the direct download
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn http_error(err: reqwest::Error) -> ExtractorError {
        let kind = classify_http(err.status(), Some(&err));
        ExtractorError::from_class(kind.class(), format!("{}: {err}", kind.description()))
    }

    async fn fetch_no_watermark(
        &self,
        request: &FetchRequest<'_>,
    ) -> ExtractorResult<FetchedMedia> {
        let api_url = url::Url::parse_with_params(&self.api_base, &[("url", request.url)])
            .map_err(|e| ExtractorError::Permanent(format!("invalid API endpoint: {e}")))?;

        let response: TikwmResponse = self
            .http
            .get(api_url)
            .timeout(API_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::http_error)?
            .json()
            .await
            .map_err(|e| ExtractorError::Transient(format!("bad API response: {e}")))?;

        if response.code != 0 {
            return Err(ExtractorError::Permanent(format!(
                "API rejected link: {}",
                response.msg.unwrap_or_else(|| response.code.to_string())
            )));
        }

        let data = response
            .data
            .ok_or_else(|| ExtractorError::Permanent("API returned no data".to_string()))?;
        let play = data
            .play
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ExtractorError::Permanent("API returned no video URL".to_string()))?;

        request.progress.report("📥 Downloading");

        let path = request.output_dir.join(OUTPUT_FILE);
        let video = self
            .http
            .get(play)
            .timeout(VIDEO_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::http_error)?;

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ExtractorError::Transient(format!("cannot create output: {e}")))?;
        let mut stream = video.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Self::http_error)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ExtractorError::Transient(format!("write failed: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| ExtractorError::Transient(format!("write failed: {e}")))?;

        let thumbnail = match data.cover.as_deref() {
            Some(cover) => match self.http.get(cover).timeout(API_TIMEOUT).send().await {
                Ok(resp) if resp.status().is_success() => resp.bytes().await.ok(),
                _ => None,
            },
            None => None,
        };

        let title = data.title.unwrap_or_else(|| "TikTok".to_string());
        Ok(FetchedMedia {
            metadata: MediaMetadata {
                title: Some(format!("{title}{TITLE_SUFFIX}")),
                duration_secs: data.duration,
                size_mb: file_size_mb(&path).await,
                thumbnail,
            },
            path,
            kind: MediaKind::Video,
        })
    }
}

#[async_trait]
impl Extractor for TikTokExtractor {
    fn name(&self) -> &str {
        "tiktok"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> ExtractorResult<FetchedMedia> {
        if request.no_watermark && request.kind == MediaKind::Video {
            match self.fetch_no_watermark(request).await {
                Ok(media) => {
                    info!(url = request.url, "Fetched TikTok clip without watermark");
                    return Ok(media);
                }
                Err(e) => {
                    warn!(
                        url = request.url,
                        error = %e,
                        "No-watermark path failed, falling back to yt-dlp"
                    );
                    let _ = tokio::fs::remove_file(request.output_dir.join(OUTPUT_FILE)).await;
                }
            }
        }
        self.fallback.fetch(request).await
    }
}
