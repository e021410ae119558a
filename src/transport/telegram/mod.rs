//! Telegram Bot API client and [`Transport`] implementation
//!
//! [`TelegramApi`] is a thin reqwest wrapper over the handful of Bot API
//! methods the bot uses. Error envelopes are mapped onto [`TransportError`]:
//! `retry_after` becomes `RateLimited`, 413 becomes `EntityTooLarge`.
//!
//! [`TelegramTransport`] keeps one status message per job, editing it as the
//! job advances and deleting it once the media is delivered.

use super::presenter;
use super::{MediaPayload, SendVariant, SentArtifact, StatusUpdate, Transport, TransportError};
use crate::cache::ArtifactCacheEntry;
use crate::downloader::job::{JobId, JobTicket};
use crate::users::UserRepository;
use crate::{ChatId, MediaKind};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod types;

pub use types::{
    CallbackQuery, Chat, ChatMember, InlineKeyboardButton, InlineKeyboardMarkup, MemberStatus,
    Message, Update, User,
};

/// Public Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Timeout for ordinary calls
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for uploads
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

const PARSE_MODE: &str = "MarkdownV2";

/// Bot API client
#[derive(Debug, Clone)]
pub struct TelegramApi {
    http: reqwest::Client,
    base: String,
}

impl TelegramApi {
    /// Client for `token` against the public endpoint
    pub fn new(token: &str) -> Self {
        Self::with_base(DEFAULT_API_BASE, token)
    }

    /// Client against a custom endpoint (local Bot API server, tests)
    pub fn with_base(api_base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    fn network_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Failed(err.to_string())
        }
    }

    fn map_envelope<T>(response: types::ApiResponse<T>) -> Result<T, TransportError> {
        if response.ok {
            return response
                .result
                .ok_or_else(|| TransportError::Failed("empty result".to_string()));
        }

        let description = response.description.unwrap_or_default();
        let retry_after = response.parameters.and_then(|p| p.retry_after);
        match (response.error_code, retry_after) {
            (_, Some(secs)) => Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(secs),
            }),
            (Some(429), None) => Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(1),
            }),
            (Some(413), _) => Err(TransportError::EntityTooLarge),
            _ if description.to_lowercase().contains("too large") => {
                Err(TransportError::EntityTooLarge)
            }
            _ => Err(TransportError::Failed(description)),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
        if response.status() == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            return Err(TransportError::EntityTooLarge);
        }
        let envelope: types::ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Failed(format!("bad response: {e}")))?;
        Self::map_envelope(envelope)
    }

    /// Call `method` with a JSON body
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let response = self
            .http
            .post(self.url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(Self::network_error)?;
        Self::decode(response).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
            Duration::from_secs(timeout_secs) + CALL_TIMEOUT,
        )
        .await
    }

    /// Send a text message
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        markdown: bool,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TransportError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if markdown {
            body["parse_mode"] = json!(PARSE_MODE);
        }
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        self.call("sendMessage", &body, CALL_TIMEOUT).await
    }

    /// Replace the text (and keyboard) of a message
    pub async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": PARSE_MODE,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        match self.call::<Value>("editMessageText", &body, CALL_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(TransportError::Failed(d)) if d.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete a message
    pub async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: i64,
    ) -> Result<(), TransportError> {
        self.call::<Value>(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
            CALL_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    /// Acknowledge a button press, optionally with a toast or an alert
    pub async fn answer_callback_query(
        &self,
        query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            body["text"] = json!(text);
            body["show_alert"] = json!(show_alert);
        }
        self.call::<Value>("answerCallbackQuery", &body, CALL_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// The bot's own account
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &json!({}), CALL_TIMEOUT).await
    }

    /// Look up a chat by `@username` or numeric id
    pub async fn get_chat(&self, chat: &str) -> Result<Chat, TransportError> {
        let chat_id = match chat.trim().parse::<i64>() {
            Ok(id) => json!(id),
            Err(_) => json!(chat.trim()),
        };
        self.call("getChat", &json!({ "chat_id": chat_id }), CALL_TIMEOUT).await
    }

    /// Membership of `user_id` in `chat_id`
    pub async fn get_chat_member(
        &self,
        chat_id: ChatId,
        user_id: i64,
    ) -> Result<ChatMember, TransportError> {
        self.call(
            "getChatMember",
            &json!({ "chat_id": chat_id, "user_id": user_id }),
            CALL_TIMEOUT,
        )
        .await
    }

    /// Upload a local file with the method matching `payload.variant`
    pub async fn send_file(
        &self,
        chat_id: ChatId,
        payload: &MediaPayload,
    ) -> Result<Message, TransportError> {
        let bytes = tokio::fs::read(&payload.path)
            .await
            .map_err(|e| TransportError::Failed(format!("cannot read file: {e}")))?;
        let file_name = payload
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());

        let field = payload.variant.as_str();
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", payload.caption.clone())
            .text("parse_mode", PARSE_MODE)
            .part(field, Part::bytes(bytes).file_name(file_name));

        if let Some(secs) = payload.duration_secs {
            if matches!(payload.variant, SendVariant::Video | SendVariant::Audio) {
                form = form.text("duration", secs.to_string());
            }
        }
        match payload.variant {
            SendVariant::Video => {
                form = form.text("supports_streaming", "true");
            }
            SendVariant::Audio => {
                if let Some(title) = &payload.title {
                    form = form.text("title", presenter::truncate_chars(title, 1000));
                }
            }
            SendVariant::Photo | SendVariant::Document => {}
        }
        if let Some(thumb) = &payload.thumbnail {
            if matches!(payload.variant, SendVariant::Video | SendVariant::Audio) {
                form = form.part("thumbnail", Part::bytes(thumb.to_vec()).file_name("thumb.jpg"));
            }
        }

        let method = match payload.variant {
            SendVariant::Video => "sendVideo",
            SendVariant::Audio => "sendAudio",
            SendVariant::Photo => "sendPhoto",
            SendVariant::Document => "sendDocument",
        };
        let response = self
            .http
            .post(self.url(method))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(Self::network_error)?;
        Self::decode(response).await
    }

    /// Resend an uploaded file by id
    pub async fn send_by_handle(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        handle: &str,
        caption: &str,
    ) -> Result<Message, TransportError> {
        let (method, field) = match kind {
            MediaKind::Video => ("sendVideo", "video"),
            MediaKind::Audio => ("sendAudio", "audio"),
            MediaKind::Image => ("sendPhoto", "photo"),
        };
        let mut body = json!({ "chat_id": chat_id, "caption": caption, "parse_mode": PARSE_MODE });
        body[field] = json!(handle);
        self.call(method, &body, CALL_TIMEOUT).await
    }
}

/// [`Transport`] over the Bot API
pub struct TelegramTransport {
    api: Arc<TelegramApi>,
    users: Arc<dyn UserRepository>,
    status_messages: DashMap<JobId, i64>,
    signature: Option<String>,
}

impl TelegramTransport {
    /// Transport using `api`, looking up languages in `users`
    pub fn new(api: Arc<TelegramApi>, users: Arc<dyn UserRepository>) -> Self {
        Self {
            api,
            users,
            status_messages: DashMap::new(),
            signature: None,
        }
    }

    /// Sign captions with `signature` (e.g. the bot's @username)
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Caption signature, if any
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Underlying API client
    pub fn api(&self) -> &Arc<TelegramApi> {
        &self.api
    }
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("status_messages", &self.status_messages.len())
            .field("signature", &self.signature)
            .finish()
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn present(
        &self,
        ticket: &JobTicket,
        update: StatusUpdate,
    ) -> Result<(), TransportError> {
        let lang = self.users.language(ticket.user_id).await.unwrap_or_default();
        let terminal = update.is_terminal();

        let Some(text) = presenter::status_text(lang, ticket.platform, &update) else {
            if let Some((_, message_id)) = self.status_messages.remove(&ticket.job_id) {
                if let Err(e) = self.api.delete_message(ticket.chat_id, message_id).await {
                    debug!(job_id = ticket.job_id, error = %e, "Status message not deleted");
                }
            }
            return Ok(());
        };

        let existing = self.status_messages.get(&ticket.job_id).map(|m| *m);
        match existing {
            Some(message_id) => {
                self.api
                    .edit_message_text(ticket.chat_id, message_id, &text, None)
                    .await?;
            }
            None => {
                let message = self.api.send_message(ticket.chat_id, &text, true, None).await?;
                if !terminal {
                    self.status_messages.insert(ticket.job_id, message.message_id);
                }
            }
        }
        if terminal {
            self.status_messages.remove(&ticket.job_id);
        }
        Ok(())
    }

    async fn send_media(
        &self,
        ticket: &JobTicket,
        payload: &MediaPayload,
    ) -> Result<SentArtifact, TransportError> {
        let message = self.api.send_file(ticket.chat_id, payload).await?;
        let handle = message.artifact_handle(payload.variant);
        if handle.is_none() {
            warn!(
                job_id = ticket.job_id,
                variant = %payload.variant,
                "Send result carried no file id"
            );
        }
        Ok(SentArtifact { handle })
    }

    async fn send_cached(
        &self,
        ticket: &JobTicket,
        entry: &ArtifactCacheEntry,
    ) -> Result<(), TransportError> {
        let caption = presenter::cached_caption(ticket.platform, self.signature.as_deref());
        self.api
            .send_by_handle(ticket.chat_id, entry.kind, &entry.handle, &caption)
            .await
            .map(|_| ())
    }
}
