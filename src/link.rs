//! Link extraction and validation
//!
//! Finds the first `http(s)://` URL inside free message text and resolves the
//! platform it belongs to.

use crate::platform::Platform;
use std::fmt;
use url::Url;

/// Characters that terminate a URL inside message text
const URL_TERMINATORS: &[char] = &['<', '>', '"', '{', '}', '|', '\\', '^', '`', '[', ']'];

/// A validated media link with its detected platform
///
/// # Examples
///
/// ```
/// use media_relay_bot::link::MediaLink;
/// use media_relay_bot::Platform;
///
/// let link = MediaLink::parse("watch https://youtu.be/abc123 now").unwrap();
/// assert_eq!(link.url(), "https://youtu.be/abc123");
/// assert_eq!(link.platform(), Platform::Youtube);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaLink {
    url: String,
    platform: Platform,
}

impl MediaLink {
    /// Extract the first URL from `text` and detect its platform
    ///
    /// # Errors
    ///
    /// [`LinkError::NoUrl`] if the text holds no parseable http(s) URL,
    /// [`LinkError::UnsupportedPlatform`] if the URL matches no known platform.
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        let url = extract_url(text).ok_or(LinkError::NoUrl)?;
        let platform =
            Platform::detect(&url).ok_or_else(|| LinkError::UnsupportedPlatform(url.clone()))?;
        Ok(Self { url, platform })
    }

    /// Build a link from a URL already known to belong to `platform`
    pub fn with_platform(url: impl Into<String>, platform: Platform) -> Self {
        Self {
            url: url.into(),
            platform,
        }
    }

    /// Source URL (cache key)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Detected platform
    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl fmt::Display for MediaLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.platform)
    }
}

/// Extract the first http(s) URL from free text
pub fn extract_url(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let mut search_from = 0;

    while search_from < lower.len() {
        let rest = &lower[search_from..];
        let offset = match (rest.find("http://"), rest.find("https://")) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };

        let start = search_from + offset;
        let candidate: String = text[start..]
            .chars()
            .take_while(|c| !c.is_whitespace() && !URL_TERMINATORS.contains(c))
            .collect();

        if let Ok(parsed) = Url::parse(&candidate) {
            if parsed.host_str().is_some() {
                return Some(candidate);
            }
        }

        search_from = start + "http://".len();
    }

    None
}

/// Link errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// No URL present in the text
    #[error("no link found in message")]
    NoUrl,

    /// URL does not belong to a supported platform
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}
