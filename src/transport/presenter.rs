//! User-facing text: captions, status lines, bounded error messages.
//!
//! Everything returned here is MarkdownV2. Dynamic values go through
//! [`escape_markdown`]; localised templates are pre-escaped.

use super::i18n::{text, Lang, Text};
use super::StatusUpdate;
use crate::downloader::config::{MAX_ERROR_DISPLAY_CHARS, MAX_TITLE_DISPLAY_CHARS};
use crate::channels::Channel;
use crate::extractor::MediaMetadata;
use crate::platform::Platform;
use crate::VideoQuality;

const MARKDOWN_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escape MarkdownV2 reserved characters
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// First `max` characters of `text` (char boundaries, not bytes)
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Error message bounded for display
pub fn bounded_error(message: &str) -> String {
    truncate_chars(message.trim(), MAX_ERROR_DISPLAY_CHARS)
}

/// Title cut to the display bound with a trailing ellipsis
pub fn display_title(title: &str, max: usize) -> String {
    if title.chars().count() > max {
        format!("{}...", truncate_chars(title, max))
    } else {
        title.to_string()
    }
}

/// `m:ss` rendering of a duration
pub fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Caption for a freshly uploaded file
pub fn caption(platform: Platform, metadata: &MediaMetadata, signature: Option<&str>) -> String {
    let title = metadata
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| display_title(t, MAX_TITLE_DISPLAY_CHARS))
        .unwrap_or_else(|| platform.display_name().to_string());

    let mut out = format!("{} *{}*", platform.emoji(), escape_markdown(&title));
    if let Some(secs) = metadata.duration_secs.filter(|s| *s > 0) {
        out.push_str(&format!("\n⏱ {}", escape_markdown(&format_duration(secs))));
    }
    if let Some(size) = metadata.size_mb {
        out.push_str(&format!("\n📦 {}MB", escape_markdown(&format!("{size:.1}"))));
    }
    if let Some(sig) = signature {
        out.push_str(&format!("\n\n🤖 {}", escape_markdown(sig)));
    }
    out
}

/// Caption for a replayed cached artifact
pub fn cached_caption(platform: Platform, signature: Option<&str>) -> String {
    let name = escape_markdown(platform.display_name());
    match signature {
        Some(sig) => format!("{} {name} via {}", platform.emoji(), escape_markdown(sig)),
        None => format!("{} {name}", platform.emoji()),
    }
}

fn with_header(platform: Platform, body: &str) -> String {
    format!(
        "{} *{}*\n\n{body}",
        platform.emoji(),
        escape_markdown(platform.display_name())
    )
}

/// Status message text; `None` when the status message should be removed
pub fn status_text(lang: Lang, platform: Platform, update: &StatusUpdate) -> Option<String> {
    let body = match update {
        StatusUpdate::Preparing => text(lang, Text::Preparing).to_string(),
        StatusUpdate::CacheHit => text(lang, Text::CacheHit).to_string(),
        StatusUpdate::Busy => text(lang, Text::Busy).to_string(),
        StatusUpdate::Downloading => text(lang, Text::Downloading).to_string(),
        StatusUpdate::Progress(line) => escape_markdown(line),
        StatusUpdate::Uploading => text(lang, Text::Uploading).to_string(),
        StatusUpdate::Done => return None,
        StatusUpdate::Failed(message) => {
            let message = if message.trim().is_empty() {
                text(lang, Text::ErrorUnknown).to_string()
            } else {
                escape_markdown(&bounded_error(message))
            };
            return Some(format!("{}\n\n{message}", text(lang, Text::ErrorTitle)));
        }
        StatusUpdate::TooLarge => {
            return Some(format!(
                "{}\n\n{}",
                text(lang, Text::ErrorTitle),
                text(lang, Text::FileTooLarge)
            ));
        }
    };
    Some(with_header(platform, &body))
}

/// Kind picker prompt
pub fn kind_prompt(lang: Lang, platform: Platform) -> String {
    text(lang, Text::WhatToDownload)
        .replace("{emoji}", platform.emoji())
        .replace("{name}", &escape_markdown(platform.display_name()))
}

/// `/start` greeting
pub fn welcome(lang: Lang, name: &str) -> String {
    text(lang, Text::StartWelcome).replace("{name}", &escape_markdown(name))
}

/// `/settings` body showing the current video quality
pub fn settings_text(lang: Lang, quality: VideoQuality) -> String {
    text(lang, Text::Settings).replace("{quality}", &escape_markdown(quality.as_str()))
}

/// Admin list of required channels
pub fn channel_list(channels: &[Channel]) -> String {
    if channels.is_empty() {
        return "📂 No required channels\\.".to_string();
    }
    let mut out = String::from("📋 *Required channels*\n");
    for channel in channels {
        out.push_str(&format!(
            "\n📢 {} \\(`{}`\\)",
            escape_markdown(&channel.title),
            channel.id
        ));
    }
    out
}

/// Plain-text platform table for `/platforms` and the CLI
pub fn platform_table() -> String {
    Platform::ALL
        .iter()
        .map(|p| {
            let kinds: Vec<&str> = p.capabilities().iter().map(|k| k.as_str()).collect();
            format!("{} {} ({})", p.emoji(), p.display_name(), kinds.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
