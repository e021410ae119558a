//! Update dispatch against a local stand-in for the Bot API

use crate::common::{build_scheduler, test_config, RecordingTransport, ScriptedExtractor};
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use media_relay_bot::bot::{Bot, BotConfig};
use media_relay_bot::cache::ArtifactCache;
use media_relay_bot::channels::Channel;
use media_relay_bot::transport::i18n::{text, Lang, Text};
use media_relay_bot::transport::telegram::types::Update;
use media_relay_bot::transport::TelegramApi;
use media_relay_bot::users::{MemoryUserRepository, UserRepository};
use media_relay_bot::VideoQuality;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const ADMIN: i64 = 100;
const BLOCKED: i64 = 666;
const BOT_ID: i64 = 999;
const GROUP: i64 = -500;
const NEWS: i64 = -1001;
const BROKEN: i64 = -1002;

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

/// Local Bot API: records every call, answers from shared membership state
#[derive(Clone, Default)]
struct MockApi {
    calls: Calls,
    /// `(chat, user)` to `getChatMember` status; unknown pairs have left
    members: Arc<Mutex<HashMap<(i64, i64), &'static str>>>,
}

fn api_error(code: u16, description: &str) -> Json<Value> {
    Json(json!({ "ok": false, "error_code": code, "description": description }))
}

async fn api_method(
    State(mock): State<MockApi>,
    Path((_bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.calls.lock().unwrap().push((method.clone(), body.clone()));
    let chat_id = body["chat_id"].as_i64().unwrap_or_default();
    let result = match method.as_str() {
        "sendMessage" if chat_id == BLOCKED => {
            return api_error(403, "Forbidden: bot was blocked by the user");
        }
        "getMe" => json!({ "id": BOT_ID, "first_name": "Relay", "username": "relay_bot" }),
        "getChat" if body["chat_id"] == json!("@news") => {
            json!({ "id": NEWS, "title": "News", "username": "news" })
        }
        "getChat" => return api_error(400, "Bad Request: chat not found"),
        "getChatMember" if chat_id == BROKEN => {
            return api_error(400, "Bad Request: member list is inaccessible");
        }
        "getChatMember" => {
            let user_id = body["user_id"].as_i64().unwrap_or_default();
            let members = mock.members.lock().unwrap();
            let status = members.get(&(chat_id, user_id)).copied().unwrap_or("left");
            json!({ "status": status, "user": { "id": user_id, "first_name": "U" } })
        }
        _ => json!({ "message_id": 1, "chat": { "id": chat_id } }),
    };
    Json(json!({ "ok": true, "result": result }))
}

struct Harness {
    bot: Bot,
    mock: MockApi,
    users: Arc<MemoryUserRepository>,
    extractor: Arc<ScriptedExtractor>,
    transport: Arc<RecordingTransport>,
    _root: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let mock = MockApi::default();
        let app = Router::new()
            .route("/:bot/:method", post(api_method))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let root = TempDir::new().unwrap();
        let extractor = Arc::new(ScriptedExtractor::succeeding());
        let transport = Arc::new(RecordingTransport::new());
        let scheduler = Arc::new(build_scheduler(
            test_config(1, root.path()),
            ArtifactCache::in_memory(),
            extractor.clone(),
            transport.clone(),
        ));

        let users = Arc::new(MemoryUserRepository::new());
        let repo: Arc<dyn UserRepository> = users.clone();
        let api = Arc::new(TelegramApi::with_base(&format!("http://{addr}"), "TEST"));
        let config = BotConfig::default()
            .with_admins(vec![ADMIN])
            .with_update_throttle(Duration::ZERO)
            .with_request_cooldown(Duration::ZERO)
            .with_broadcast_interval(Duration::ZERO);

        Self {
            bot: Bot::new(api, scheduler, repo, config),
            mock,
            users,
            extractor,
            transport,
            _root: root,
        }
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.mock.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.mock.calls.lock().unwrap().clear();
    }

    fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body)
            .collect()
    }

    fn set_member(&self, chat: i64, user: i64, status: &'static str) {
        self.mock.members.lock().unwrap().insert((chat, user), status);
    }

    async fn wait_for_downloads(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.transport.sent().len() < count
                || self.bot.scheduler().stats().in_flight > 0
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("download finished");
    }
}

/// Every callback payload on the keyboard of `body`
fn button_data(body: &Value) -> Vec<String> {
    body["reply_markup"]["inline_keyboard"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|row| row.as_array().unwrap().clone())
        .filter_map(|b| b["callback_data"].as_str().map(String::from))
        .collect()
}

fn message_in(chat: i64, user: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "chat": { "id": chat },
            "from": { "id": user, "first_name": "Ann", "username": "ann" },
            "text": text
        }
    }))
    .unwrap()
}

fn callback_in(chat: i64, user: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 2,
        "callback_query": {
            "id": "cb-1",
            "from": { "id": user, "first_name": "Ann" },
            "message": { "message_id": 11, "chat": { "id": chat } },
            "data": data
        }
    }))
    .unwrap()
}

fn text_update(user: i64, text: &str) -> Update {
    message_in(user, user, text)
}

fn callback_update(user: i64, data: &str) -> Update {
    callback_in(user, user, data)
}

#[tokio::test]
async fn test_start_registers_and_greets() {
    let h = Harness::start().await;

    h.bot.handle_update(text_update(5, "/start")).await;

    let sent = h.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], json!(5));
    let record = h.users.get(5).expect("registered");
    assert!(record.active);
    assert_eq!(record.profile.username.as_deref(), Some("ann"));
}

#[tokio::test]
async fn test_multi_kind_link_asks_for_choice() {
    let h = Harness::start().await;

    h.bot
        .handle_update(text_update(5, "check https://youtu.be/abc123 out"))
        .await;

    let sent = h.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    let buttons = button_data(&sent[0]);
    assert!(buttons.contains(&"dl:video".to_string()));
    assert!(buttons.contains(&"dl:audio".to_string()));
    assert!(buttons.contains(&"cancel".to_string()));
    assert_eq!(h.bot.pending().len(), 1);
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn test_choice_starts_download() {
    let h = Harness::start().await;

    h.bot.handle_update(text_update(5, "https://youtu.be/abc123")).await;
    h.bot.handle_update(callback_update(5, "dl:video")).await;

    assert_eq!(h.calls_to("answerCallbackQuery").len(), 1);
    assert_eq!(h.calls_to("deleteMessage").len(), 1);
    assert!(h.bot.pending().is_empty());

    h.wait_for_downloads(1).await;
    assert_eq!(h.extractor.calls(), 1);
    assert_eq!(h.extractor.started.lock().unwrap()[0], "https://youtu.be/abc123");
}

#[tokio::test]
async fn test_cancel_drops_pending_choice() {
    let h = Harness::start().await;

    h.bot.handle_update(text_update(5, "https://youtu.be/abc123")).await;
    h.bot.handle_update(callback_update(5, "cancel")).await;

    assert!(h.bot.pending().is_empty());
    let edits = h.calls_to("editMessageText");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0]["message_id"], json!(11));

    // A late button press finds nothing to download
    h.bot.handle_update(callback_update(5, "dl:video")).await;
    assert_eq!(h.calls_to("editMessageText").len(), 2);
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn test_bad_links_get_error_replies() {
    let h = Harness::start().await;

    h.bot.handle_update(text_update(5, "no link here")).await;
    h.bot
        .handle_update(text_update(5, "https://example.com/video/1"))
        .await;

    let sent = h.calls_to("sendMessage");
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0]["text"], sent[1]["text"]);
    assert!(h.bot.pending().is_empty());
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn test_admin_commands_ignored_for_regular_users() {
    let h = Harness::start().await;

    h.bot.handle_update(text_update(5, "/stats")).await;
    h.bot.handle_update(text_update(5, "/broadcast hello")).await;
    assert!(h.calls().is_empty());

    h.bot.handle_update(text_update(ADMIN, "/stats")).await;
    let sent = h.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert!(sent[0]["text"].as_str().unwrap().contains("Free worker slots: 1/1"));
}

#[tokio::test]
async fn test_broadcast_marks_unreachable_users_inactive() {
    let h = Harness::start().await;
    for user in [1, BLOCKED, ADMIN] {
        h.bot.handle_update(text_update(user, "/start")).await;
    }
    h.clear_calls();

    let report = h.bot.broadcast("maintenance tonight").await;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert!(!h.users.get(BLOCKED).unwrap().active);
    assert!(h.users.get(1).unwrap().active);
    let bodies: Vec<Value> = h.calls_to("sendMessage");
    assert!(bodies.iter().all(|b| b["text"] == json!("maintenance tonight")));
}

#[tokio::test]
async fn test_language_choice_is_saved() {
    let h = Harness::start().await;
    h.bot.handle_update(text_update(5, "/start")).await;

    h.bot.handle_update(callback_update(5, "lang:ru")).await;

    assert_eq!(h.users.language(5).await.unwrap(), Lang::Ru);
    assert_eq!(h.calls_to("editMessageText").len(), 1);
}

#[tokio::test]
async fn test_group_members_keep_their_own_pending_links() {
    let h = Harness::start().await;

    h.bot
        .handle_update(message_in(GROUP, 5, "https://youtu.be/abc123"))
        .await;
    assert_eq!(h.bot.pending().len(), 1);

    // Another member pressing the same keyboard finds nothing of theirs
    h.bot.handle_update(callback_in(GROUP, 6, "dl:video")).await;
    assert_eq!(h.bot.pending().len(), 1);
    let edits = h.calls_to("editMessageText");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0]["text"], json!(text(Lang::Uz, Text::LinkExpired)));
    assert_eq!(h.extractor.calls(), 0);

    h.bot.handle_update(callback_in(GROUP, 5, "dl:video")).await;
    assert!(h.bot.pending().is_empty());
    h.wait_for_downloads(1).await;
    assert_eq!(h.extractor.calls(), 1);
}

#[tokio::test]
async fn test_settings_quality_is_saved_and_used_for_downloads() {
    let h = Harness::start().await;

    h.bot.handle_update(text_update(5, "/settings")).await;
    let sent = h.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert!(sent[0]["text"].as_str().unwrap().contains("720p"));
    assert!(button_data(&sent[0]).contains(&"q:480p".to_string()));

    h.bot.handle_update(callback_update(5, "q:480p")).await;
    assert_eq!(h.users.video_quality(5).await.unwrap(), VideoQuality::P480);
    let edits = h.calls_to("editMessageText");
    assert_eq!(edits.len(), 1);
    assert!(edits[0]["text"].as_str().unwrap().contains("480p"));

    h.bot.handle_update(text_update(5, "https://youtu.be/abc123")).await;
    h.bot.handle_update(callback_update(5, "dl:video")).await;
    h.wait_for_downloads(1).await;
    assert_eq!(
        *h.extractor.qualities.lock().unwrap(),
        vec![Some(VideoQuality::P480)]
    );
}

#[tokio::test]
async fn test_unsubscribed_user_is_gated_until_joining() {
    let h = Harness::start().await;
    let channels = h.bot.channels();
    channels
        .add(Channel::new(NEWS, "News", None, "https://t.me/news"))
        .await
        .unwrap();
    // A channel the bot cannot inspect never blocks anyone
    channels
        .add(Channel::new(BROKEN, "Gone", None, "https://t.me/gone"))
        .await
        .unwrap();

    h.bot.handle_update(text_update(5, "https://youtu.be/abc123")).await;

    let sent = h.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["text"], json!(text(Lang::Uz, Text::SubscribeRequired)));
    let rows = sent[0]["reply_markup"]["inline_keyboard"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0]["url"], json!("https://t.me/news"));
    assert_eq!(rows[1][0]["callback_data"], json!("check_subscription"));
    assert!(h.bot.pending().is_empty());

    h.bot
        .handle_update(callback_update(5, "check_subscription"))
        .await;
    let answers = h.calls_to("answerCallbackQuery");
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["show_alert"], json!(true));
    assert_eq!(answers[0]["text"], json!(text(Lang::Uz, Text::NotSubscribed)));
    assert!(h.calls_to("deleteMessage").is_empty());

    h.set_member(NEWS, 5, "member");
    h.clear_calls();
    h.bot
        .handle_update(callback_update(5, "check_subscription"))
        .await;
    let answers = h.calls_to("answerCallbackQuery");
    assert_eq!(
        answers[0]["text"],
        json!(text(Lang::Uz, Text::SubscriptionConfirmed))
    );
    assert_eq!(h.calls_to("deleteMessage").len(), 1);

    h.bot.handle_update(text_update(5, "https://youtu.be/abc123")).await;
    assert_eq!(h.bot.pending().len(), 1);
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn test_admin_manages_required_channels() {
    let h = Harness::start().await;
    h.set_member(NEWS, BOT_ID, "administrator");

    h.bot.handle_update(text_update(ADMIN, "/add_channel @nowhere")).await;
    h.bot.handle_update(text_update(ADMIN, "/add_channel @news")).await;

    let replies = h.calls_to("sendMessage");
    assert_eq!(replies.len(), 2);
    assert!(replies[0]["text"].as_str().unwrap().starts_with("❌"));
    assert_eq!(replies[1]["text"], json!("✅ Channel added: News"));
    let channels = h.bot.channels().list().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].invite_link, "https://t.me/news");

    h.clear_calls();
    h.bot.handle_update(text_update(ADMIN, "/channels")).await;
    let list = h.calls_to("sendMessage");
    assert!(button_data(&list[0]).contains(&format!("del_ch:{NEWS}")));

    // Members may not remove channels
    h.set_member(NEWS, 5, "member");
    h.bot
        .handle_update(callback_update(5, &format!("del_ch:{NEWS}")))
        .await;
    assert_eq!(h.bot.channels().list().await.unwrap().len(), 1);

    h.bot
        .handle_update(callback_update(ADMIN, &format!("del_ch:{NEWS}")))
        .await;
    assert!(h.bot.channels().list().await.unwrap().is_empty());
    assert_eq!(h.calls_to("editMessageText").len(), 1);
}

#[tokio::test]
async fn test_add_channel_requires_bot_admin_rights() {
    let h = Harness::start().await;
    h.set_member(NEWS, BOT_ID, "member");

    h.bot.handle_update(text_update(ADMIN, "/add_channel @news")).await;

    let replies = h.calls_to("sendMessage");
    assert_eq!(
        replies[0]["text"],
        json!("❌ The bot is not an administrator of this channel")
    );
    assert!(h.bot.channels().list().await.unwrap().is_empty());
}
