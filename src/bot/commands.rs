//! Slash commands, callback payloads and inline keyboards

use crate::channels::Channel;
use crate::platform::Platform;
use crate::transport::i18n::{text, Lang, Text};
use crate::transport::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};
use crate::{ChatId, MediaKind, VideoQuality};

/// A parsed `/command`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register and greet
    Start,
    /// Usage
    Help,
    /// Language picker
    Lang,
    /// Supported platform table
    Platforms,
    /// Video quality picker
    Settings,
    /// Admin: user and scheduler counters
    Stats,
    /// Admin: send text to every active user
    Broadcast(String),
    /// Admin: require joining a channel (`@username` or id)
    AddChannel(String),
    /// Admin: list required channels
    Channels,
    /// Anything else starting with `/`
    Unknown(String),
}

impl Command {
    /// Parse message text; `None` when it is not a command
    ///
    /// `/cmd@botname args` is accepted; the bot name is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "lang" | "language" => Command::Lang,
            "platforms" => Command::Platforms,
            "settings" => Command::Settings,
            "stats" => Command::Stats,
            "broadcast" => Command::Broadcast(args.to_string()),
            "add_channel" => Command::AddChannel(args.to_string()),
            "channels" => Command::Channels,
            _ => Command::Unknown(name),
        })
    }

    /// Restricted to configured admins
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Stats | Command::Broadcast(_) | Command::AddChannel(_) | Command::Channels
        )
    }
}

/// Callback payload of an inline button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Download the pending link as `kind`
    Download {
        /// Requested kind
        kind: MediaKind,
        /// TikTok watermark-free variant
        no_watermark: bool,
    },
    /// Discard the pending link
    Cancel,
    /// Switch interface language
    SetLanguage(Lang),
    /// Change preferred video quality
    SetQuality(VideoQuality),
    /// Re-check channel subscriptions
    CheckSubscription,
    /// Admin: drop a required channel
    RemoveChannel(ChatId),
    /// Delete the message carrying the keyboard
    Close,
}

const NO_WATERMARK_CHOICE: &str = "nowm";
const CHECK_SUBSCRIPTION: &str = "check_subscription";

impl CallbackAction {
    /// Parse a callback payload
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "cancel" => return Some(CallbackAction::Cancel),
            "close" => return Some(CallbackAction::Close),
            CHECK_SUBSCRIPTION => return Some(CallbackAction::CheckSubscription),
            _ => {}
        }
        if let Some(choice) = data.strip_prefix("dl:") {
            if choice == NO_WATERMARK_CHOICE {
                return Some(CallbackAction::Download {
                    kind: MediaKind::Video,
                    no_watermark: true,
                });
            }
            let kind = choice.parse::<MediaKind>().ok()?;
            return Some(CallbackAction::Download {
                kind,
                no_watermark: false,
            });
        }
        if let Some(code) = data.strip_prefix("lang:") {
            return code.parse::<Lang>().ok().map(CallbackAction::SetLanguage);
        }
        if let Some(quality) = data.strip_prefix("q:") {
            return quality.parse().ok().map(CallbackAction::SetQuality);
        }
        if let Some(id) = data.strip_prefix("del_ch:") {
            return id.parse().ok().map(CallbackAction::RemoveChannel);
        }
        None
    }

    /// Payload for the button
    pub fn data(&self) -> String {
        match self {
            CallbackAction::Download {
                no_watermark: true, ..
            } => format!("dl:{NO_WATERMARK_CHOICE}"),
            CallbackAction::Download { kind, .. } => format!("dl:{kind}"),
            CallbackAction::Cancel => "cancel".to_string(),
            CallbackAction::SetLanguage(lang) => format!("lang:{}", lang.code()),
            CallbackAction::SetQuality(quality) => format!("q:{quality}"),
            CallbackAction::CheckSubscription => CHECK_SUBSCRIPTION.to_string(),
            CallbackAction::RemoveChannel(id) => format!("del_ch:{id}"),
            CallbackAction::Close => "close".to_string(),
        }
    }
}

/// Kind picker for a link from `platform`
pub fn kind_keyboard(lang: Lang, platform: Platform) -> InlineKeyboardMarkup {
    let mut buttons = Vec::new();
    if platform.supports(MediaKind::Video) {
        buttons.push(button(
            text(lang, Text::BtnVideo),
            CallbackAction::Download {
                kind: MediaKind::Video,
                no_watermark: false,
            },
        ));
    }
    if platform.offers_no_watermark() {
        buttons.push(button(
            text(lang, Text::BtnVideoNoWatermark),
            CallbackAction::Download {
                kind: MediaKind::Video,
                no_watermark: true,
            },
        ));
    }
    if platform.supports(MediaKind::Audio) {
        buttons.push(button(
            text(lang, Text::BtnAudio),
            CallbackAction::Download {
                kind: MediaKind::Audio,
                no_watermark: false,
            },
        ));
    }
    if platform.supports(MediaKind::Image) {
        buttons.push(button(
            text(lang, Text::BtnImage),
            CallbackAction::Download {
                kind: MediaKind::Image,
                no_watermark: false,
            },
        ));
    }
    buttons.push(button(text(lang, Text::BtnCancel), CallbackAction::Cancel));
    InlineKeyboardMarkup::single_column(buttons)
}

/// Language picker
pub fn language_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::single_column(
        Lang::ALL
            .iter()
            .map(|lang| button(lang.label(), CallbackAction::SetLanguage(*lang)))
            .collect(),
    )
}

/// Quality picker in two rows, the current choice ticked
pub fn quality_keyboard(current: VideoQuality) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = VideoQuality::ALL
        .iter()
        .map(|quality| {
            let label = if *quality == current {
                format!("{quality} ✓")
            } else {
                quality.to_string()
            };
            button(&label, CallbackAction::SetQuality(*quality))
        })
        .collect();
    InlineKeyboardMarkup {
        inline_keyboard: buttons.chunks(2).map(|row| row.to_vec()).collect(),
    }
}

/// Join buttons for `missing` channels plus a re-check button
pub fn subscription_keyboard(lang: Lang, missing: &[Channel]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = missing
        .iter()
        .map(|c| InlineKeyboardButton::link(format!("➕ {}", c.title), c.invite_link.clone()))
        .collect();
    buttons.push(button(
        text(lang, Text::BtnSubscribed),
        CallbackAction::CheckSubscription,
    ));
    InlineKeyboardMarkup::single_column(buttons)
}

/// Admin channel list: one remove button per channel and a close button
pub fn channel_list_keyboard(channels: &[Channel]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = channels
        .iter()
        .map(|c| button(&format!("🗑 {}", c.title), CallbackAction::RemoveChannel(c.id)))
        .collect();
    buttons.push(button("❌ Close", CallbackAction::Close));
    InlineKeyboardMarkup::single_column(buttons)
}

fn button(label: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.data())
}
