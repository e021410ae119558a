//! Supported platform table
//!
//! Every platform the bot understands is a variant of the closed [`Platform`]
//! enum. Each variant carries its URL patterns, display metadata and the set
//! of media kinds it can deliver. Detection is a pure substring match over the
//! lowercased URL; the first platform (in declaration order) with a matching
//! pattern wins.

use crate::MediaKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A supported media platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// youtube.com, youtu.be
    Youtube,
    /// Instagram posts, reels and stories
    Instagram,
    /// tiktok.com, vm.tiktok.com
    Tiktok,
    /// twitter.com, x.com
    Twitter,
    /// facebook.com, fb.watch
    Facebook,
    /// pinterest.com, pin.it
    Pinterest,
    /// Spotify tracks
    Spotify,
    /// soundcloud.com
    Soundcloud,
    /// VK videos, clips and music
    Vk,
    /// likee.video
    Likee,
    /// dailymotion.com, dai.ly
    Dailymotion,
    /// vimeo.com
    Vimeo,
    /// reddit.com, redd.it
    Reddit,
    /// tumblr.com
    Tumblr,
    /// Twitch clips
    Twitch,
    /// ok.ru
    Okru,
    /// rutube.ru
    Rutube,
}

const VIDEO: &[MediaKind] = &[MediaKind::Video];
const AUDIO: &[MediaKind] = &[MediaKind::Audio];
const IMAGE: &[MediaKind] = &[MediaKind::Image];
const VIDEO_AUDIO: &[MediaKind] = &[MediaKind::Video, MediaKind::Audio];
const VIDEO_IMAGE: &[MediaKind] = &[MediaKind::Video, MediaKind::Image];

impl Platform {
    /// All platforms in detection order
    pub const ALL: [Platform; 17] = [
        Platform::Youtube,
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Twitter,
        Platform::Facebook,
        Platform::Pinterest,
        Platform::Spotify,
        Platform::Soundcloud,
        Platform::Vk,
        Platform::Likee,
        Platform::Dailymotion,
        Platform::Vimeo,
        Platform::Reddit,
        Platform::Tumblr,
        Platform::Twitch,
        Platform::Okru,
        Platform::Rutube,
    ];

    /// Detect the platform a URL belongs to
    pub fn detect(url: &str) -> Option<Platform> {
        let lower = url.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|platform| platform.patterns().iter().any(|p| lower.contains(p)))
    }

    /// Stable lowercase identifier
    pub fn id(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Pinterest => "pinterest",
            Platform::Spotify => "spotify",
            Platform::Soundcloud => "soundcloud",
            Platform::Vk => "vk",
            Platform::Likee => "likee",
            Platform::Dailymotion => "dailymotion",
            Platform::Vimeo => "vimeo",
            Platform::Reddit => "reddit",
            Platform::Tumblr => "tumblr",
            Platform::Twitch => "twitch",
            Platform::Okru => "okru",
            Platform::Rutube => "rutube",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::Tiktok => "TikTok",
            Platform::Twitter => "Twitter/X",
            Platform::Facebook => "Facebook",
            Platform::Pinterest => "Pinterest",
            Platform::Spotify => "Spotify",
            Platform::Soundcloud => "SoundCloud",
            Platform::Vk => "VK",
            Platform::Likee => "Likee",
            Platform::Dailymotion => "Dailymotion",
            Platform::Vimeo => "Vimeo",
            Platform::Reddit => "Reddit",
            Platform::Tumblr => "Tumblr",
            Platform::Twitch => "Twitch",
            Platform::Okru => "OK.ru",
            Platform::Rutube => "Rutube",
        }
    }

    /// Emoji shown next to the platform name
    pub fn emoji(&self) -> &'static str {
        match self {
            Platform::Youtube => "🎬",
            Platform::Instagram => "📸",
            Platform::Tiktok => "🎵",
            Platform::Twitter => "🐦",
            Platform::Facebook => "📘",
            Platform::Pinterest => "📌",
            Platform::Spotify => "🎧",
            Platform::Soundcloud => "🔊",
            Platform::Vk => "📱",
            Platform::Likee => "🎭",
            Platform::Dailymotion => "📺",
            Platform::Vimeo => "🎥",
            Platform::Reddit => "🔴",
            Platform::Tumblr => "📝",
            Platform::Twitch => "💜",
            Platform::Okru => "🟠",
            Platform::Rutube => "🔵",
        }
    }

    /// Lowercase URL substrings identifying this platform
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            Platform::Youtube => &["youtube.com", "youtu.be", "youtube.com/shorts"],
            Platform::Instagram => &[
                "instagram.com/p/",
                "instagram.com/reel/",
                "instagram.com/stories/",
            ],
            Platform::Tiktok => &["tiktok.com", "vm.tiktok.com"],
            Platform::Twitter => &["twitter.com", "x.com"],
            Platform::Facebook => &["facebook.com", "fb.watch"],
            Platform::Pinterest => &["pinterest.com", "pin.it"],
            Platform::Spotify => &["open.spotify.com/track", "spotify.com/track"],
            Platform::Soundcloud => &["soundcloud.com"],
            Platform::Vk => &["vk.com/video", "vk.com/clip", "vk.com/music"],
            Platform::Likee => &["likee.video", "l.likee.video", "likee.com"],
            Platform::Dailymotion => &["dailymotion.com", "dai.ly"],
            Platform::Vimeo => &["vimeo.com"],
            Platform::Reddit => &["reddit.com", "redd.it", "v.redd.it"],
            Platform::Tumblr => &["tumblr.com"],
            Platform::Twitch => &["twitch.tv/clip", "clips.twitch.tv"],
            Platform::Okru => &["ok.ru", "odnoklassniki.ru"],
            Platform::Rutube => &["rutube.ru"],
        }
    }

    /// Media kinds this platform can deliver, preferred kind first
    pub fn capabilities(&self) -> &'static [MediaKind] {
        match self {
            Platform::Youtube | Platform::Tiktok | Platform::Vk => VIDEO_AUDIO,
            Platform::Instagram | Platform::Twitter | Platform::Reddit | Platform::Tumblr => {
                VIDEO_IMAGE
            }
            Platform::Pinterest => IMAGE,
            Platform::Spotify | Platform::Soundcloud => AUDIO,
            Platform::Facebook
            | Platform::Likee
            | Platform::Dailymotion
            | Platform::Vimeo
            | Platform::Twitch
            | Platform::Okru
            | Platform::Rutube => VIDEO,
        }
    }

    /// Whether the platform can deliver the given kind
    pub fn supports(&self, kind: MediaKind) -> bool {
        self.capabilities().contains(&kind)
    }

    /// Kind used when the user is not asked to choose
    pub fn default_kind(&self) -> MediaKind {
        self.capabilities()
            .first()
            .copied()
            .unwrap_or(MediaKind::Video)
    }

    /// Whether the user should pick a kind before the download starts
    pub fn needs_choice(&self) -> bool {
        matches!(
            self,
            Platform::Youtube
                | Platform::Tiktok
                | Platform::Vk
                | Platform::Soundcloud
                | Platform::Spotify
        ) || self.capabilities().len() > 1
    }

    /// Whether a watermark-free variant can be requested
    pub fn offers_no_watermark(&self) -> bool {
        matches!(self, Platform::Tiktok)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.id() == lower)
            .ok_or_else(|| format!("Unknown platform: {s}"))
    }
}
