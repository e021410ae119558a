//! Bot API wire types (the subset this bot reads and writes)

use crate::transport::SendVariant;
use serde::{Deserialize, Serialize};

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Call succeeded
    pub ok: bool,
    /// Payload on success
    pub result: Option<T>,
    /// Human-readable error
    #[serde(default)]
    pub description: Option<String>,
    /// Numeric error code (HTTP-like)
    #[serde(default)]
    pub error_code: Option<u16>,
    /// Extra error parameters
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

/// Flood-control details
#[derive(Debug, Default, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before retrying
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// Incoming update
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id
    pub update_id: i64,
    /// New message
    #[serde(default)]
    pub message: Option<Message>,
    /// Inline button press
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// User who caused the update
    pub fn sender(&self) -> Option<&User> {
        self.message
            .as_ref()
            .and_then(|m| m.from.as_ref())
            .or_else(|| self.callback_query.as_ref().map(|c| &c.from))
    }
}

/// Chat message
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Id within the chat
    pub message_id: i64,
    /// Chat the message belongs to
    pub chat: Chat,
    /// Sender
    #[serde(default)]
    pub from: Option<User>,
    /// Text content
    #[serde(default)]
    pub text: Option<String>,
    /// Attached video
    #[serde(default)]
    pub video: Option<FileRef>,
    /// Attached audio
    #[serde(default)]
    pub audio: Option<FileRef>,
    /// Attached document
    #[serde(default)]
    pub document: Option<FileRef>,
    /// Photo sizes, smallest first
    #[serde(default)]
    pub photo: Option<Vec<FileRef>>,
}

impl Message {
    /// File id that can be replayed for a send of `variant`
    pub fn artifact_handle(&self, variant: SendVariant) -> Option<String> {
        let file = match variant {
            SendVariant::Video => self.video.as_ref(),
            SendVariant::Audio => self.audio.as_ref(),
            SendVariant::Photo => self.photo.as_ref().and_then(|sizes| sizes.last()),
            SendVariant::Document => self.document.as_ref(),
        };
        file.map(|f| f.file_id.clone())
    }
}

/// Chat reference
///
/// Messages carry only the id; `getChat` fills in the rest for channels.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: i64,
    /// Channel or group title
    #[serde(default)]
    pub title: Option<String>,
    /// Public username without `@`
    #[serde(default)]
    pub username: Option<String>,
    /// Primary invite link, visible to administrators
    #[serde(default)]
    pub invite_link: Option<String>,
}

impl Chat {
    /// Link users can follow to join: the invite link, else the public one
    pub fn join_link(&self) -> Option<String> {
        self.invite_link
            .clone()
            .or_else(|| self.username.as_ref().map(|u| format!("https://t.me/{u}")))
    }
}

/// Membership status reported by `getChatMember`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Owner
    Creator,
    /// Administrator
    Administrator,
    /// Ordinary member
    Member,
    /// Member under restrictions
    Restricted,
    /// Not a member
    Left,
    /// Banned
    Kicked,
}

impl MemberStatus {
    /// Counts as subscribed to a channel
    pub fn is_subscribed(&self) -> bool {
        !matches!(self, MemberStatus::Left | MemberStatus::Kicked)
    }

    /// Can manage the chat
    pub fn is_admin(&self) -> bool {
        matches!(self, MemberStatus::Creator | MemberStatus::Administrator)
    }
}

/// Result of `getChatMember`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    /// Membership status
    pub status: MemberStatus,
}

/// Telegram user
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// User id
    pub id: i64,
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Username without `@`
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// First and last name joined
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

/// Uploaded file reference
#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    /// Reusable file id
    pub file_id: String,
}

/// Inline button press
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Query id to answer
    pub id: String,
    /// Who pressed
    pub from: User,
    /// Message carrying the keyboard
    #[serde(default)]
    pub message: Option<Message>,
    /// Button payload
    #[serde(default)]
    pub data: Option<String>,
}

/// Inline keyboard attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InlineKeyboardMarkup {
    /// Rows of buttons
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// Keyboard with one button per row
    pub fn single_column(buttons: Vec<InlineKeyboardButton>) -> Self {
        Self {
            inline_keyboard: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

/// Inline button: either a callback payload or a link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardButton {
    /// Label
    pub text: String,
    /// Payload delivered back in the callback query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    /// URL opened by the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineKeyboardButton {
    /// Callback button
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    /// Link button
    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}
