//! Update dispatcher for the Telegram front-end
//!
//! [`Bot::run`] long-polls `getUpdates` and hands every update to
//! [`Bot::handle_update`] on its own task:
//!
//! - every update passes a per-user throttle first (admins exempt); throttled
//!   updates are dropped without a reply
//! - when required channels are configured, non-admins who have not joined
//!   all of them get the join list instead of an answer
//! - `/start`, `/help`, `/lang`, `/platforms`, `/settings` and the admin-only
//!   `/stats`, `/broadcast`, `/add_channel` and `/channels` are answered
//!   directly
//! - any other text is treated as a link: after the download cooldown it is
//!   either scheduled straight away or parked until the user picks a kind
//!   from an inline keyboard
//!
//! Shutdown stops polling, closes the worker pool and waits for in-flight
//! jobs to finish.

pub mod commands;
pub mod pending;

use crate::downloader::config::{
    DEFAULT_REQUEST_COOLDOWN, DEFAULT_UPDATE_THROTTLE, MAX_SEND_ATTEMPTS,
};
use crate::channels::{Channel, ChannelRepository, MemoryChannelRepository};
use crate::downloader::{DownloadJob, DownloadScheduler, RateLimiter, SchedulerStats};
use crate::link::{LinkError, MediaLink};
use crate::shutdown::SharedShutdown;
use crate::transport::i18n::{text, Lang, Text};
use crate::transport::presenter;
use crate::transport::telegram::{CallbackQuery, Message, TelegramApi, Update, User};
use crate::transport::{send_with_retry, TransportError};
use crate::users::{UserProfile, UserRepository, UserStats};
use crate::{ChatId, MediaKind, UserId, VideoQuality};
use commands::{
    channel_list_keyboard, kind_keyboard, language_keyboard, quality_keyboard,
    subscription_keyboard, CallbackAction, Command,
};
use pending::{PendingChoices, DEFAULT_CHOICE_TTL};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Long-poll timeout for `getUpdates`
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Pause between broadcast messages (~30 messages per second)
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(35);

/// How long shutdown waits for in-flight jobs
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Wait after a failed poll
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Users allowed to run admin commands; exempt from the update throttle
    pub admins: Vec<UserId>,
    /// Minimum gap between two updates from one user
    pub update_throttle: Duration,
    /// Minimum gap between two download requests from one user
    pub request_cooldown: Duration,
    /// `getUpdates` long-poll timeout in seconds
    pub poll_timeout_secs: u64,
    /// Pause between broadcast messages
    pub broadcast_interval: Duration,
    /// Expiry of a pending kind choice
    pub choice_ttl: Duration,
    /// Shutdown wait for in-flight jobs
    pub drain_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            update_throttle: DEFAULT_UPDATE_THROTTLE,
            request_cooldown: DEFAULT_REQUEST_COOLDOWN,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            choice_ttl: DEFAULT_CHOICE_TTL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl BotConfig {
    /// Set admin user ids
    pub fn with_admins(mut self, admins: Vec<UserId>) -> Self {
        self.admins = admins;
        self
    }

    /// Set the per-update throttle
    pub fn with_update_throttle(mut self, throttle: Duration) -> Self {
        self.update_throttle = throttle;
        self
    }

    /// Set the download request cooldown
    pub fn with_request_cooldown(mut self, cooldown: Duration) -> Self {
        self.request_cooldown = cooldown;
        self
    }

    /// Set the broadcast pacing
    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }
}

/// Result of an admin broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Messages delivered
    pub delivered: usize,
    /// Recipients that could not be reached (now marked inactive)
    pub failed: usize,
}

/// Telegram update dispatcher
pub struct Bot {
    api: Arc<TelegramApi>,
    scheduler: Arc<DownloadScheduler>,
    users: Arc<dyn UserRepository>,
    channels: Arc<dyn ChannelRepository>,
    config: BotConfig,
    update_limiter: RateLimiter,
    request_limiter: RateLimiter,
    pending: PendingChoices,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Bot {
    /// Dispatcher over `api`, scheduling downloads on `scheduler`
    pub fn new(
        api: Arc<TelegramApi>,
        scheduler: Arc<DownloadScheduler>,
        users: Arc<dyn UserRepository>,
        config: BotConfig,
    ) -> Self {
        let update_limiter =
            RateLimiter::new(config.update_throttle).with_exempt(config.admins.iter().copied());
        let request_limiter = RateLimiter::new(config.request_cooldown);
        let pending = PendingChoices::new(config.choice_ttl);
        Self {
            api,
            scheduler,
            users,
            channels: Arc::new(MemoryChannelRepository::new()),
            config,
            update_limiter,
            request_limiter,
            pending,
        }
    }

    /// Use `channels` as the required-channel store
    pub fn with_channels(mut self, channels: Arc<dyn ChannelRepository>) -> Self {
        self.channels = channels;
        self
    }

    /// Required channels users must join
    pub fn channels(&self) -> &Arc<dyn ChannelRepository> {
        &self.channels
    }

    /// Scheduler jobs are submitted to
    pub fn scheduler(&self) -> &Arc<DownloadScheduler> {
        &self.scheduler
    }

    /// Links waiting for a kind choice
    pub fn pending(&self) -> &PendingChoices {
        &self.pending
    }

    /// Whether `user` may run admin commands
    pub fn is_admin(&self, user: UserId) -> bool {
        self.config.admins.contains(&user)
    }

    /// Poll for updates until shutdown, then drain in-flight jobs
    pub async fn run(self: Arc<Self>, shutdown: SharedShutdown) {
        info!(admins = self.config.admins.len(), "Bot polling started");
        let mut offset: i64 = 0;

        while !shutdown.is_shutdown_requested() {
            let polled = tokio::select! {
                r = self.api.get_updates(offset, self.config.poll_timeout_secs) => r,
                _ = shutdown.wait_for_shutdown() => break,
            };

            match polled {
                Ok(updates) => {
                    if !updates.is_empty() {
                        debug!(count = updates.len(), offset, "Received updates");
                    }
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let bot = Arc::clone(&self);
                        tokio::spawn(async move { bot.handle_update(update).await });
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    let backoff = match e {
                        TransportError::RateLimited { retry_after } => retry_after,
                        _ => POLL_ERROR_BACKOFF,
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.wait_for_shutdown() => break,
                    }
                }
            }

            let purged = self.pending.purge_expired(Instant::now());
            if purged > 0 {
                debug!(purged, "Dropped expired kind choices");
            }
        }

        info!("Update polling stopped");
        self.drain().await;
    }

    /// Close the worker pool and wait for running jobs
    pub async fn drain(&self) {
        self.scheduler.close();
        let deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let in_flight = self.scheduler.stats().in_flight;
            if in_flight == 0 {
                info!("All jobs finished");
                return;
            }
            if Instant::now() >= deadline {
                warn!(in_flight, "Drain timeout reached with jobs still running");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Dispatch one update; errors are logged, never returned
    pub async fn handle_update(&self, update: Update) {
        let Some(user_id) = update.sender().map(|u| u.id) else {
            return;
        };
        if !self.update_limiter.admit(user_id) {
            debug!(user_id, update_id = update.update_id, "Update throttled");
            return;
        }
        if let Err(e) = self.users.set_active(user_id, true).await {
            warn!(user_id, error = %e, "Could not record user activity");
        }
        if !self.is_admin(user_id) {
            let missing = self.missing_subscriptions(user_id).await;
            if !missing.is_empty() {
                debug!(user_id, missing = missing.len(), "Required channels not joined");
                if let Err(e) = self.prompt_subscription(&update, user_id, &missing).await {
                    warn!(user_id, error = %e, "Subscription prompt failed");
                }
                return;
            }
        }

        let result = if let Some(query) = update.callback_query {
            self.handle_callback(query).await
        } else if let Some(message) = update.message {
            self.handle_message(message).await
        } else {
            Ok(())
        };
        if let Err(e) = result {
            warn!(user_id, update_id = update.update_id, error = %e, "Update handling failed");
        }
    }

    /// Required channels `user_id` has not joined
    ///
    /// Channels whose membership cannot be checked (the bot lost its admin
    /// rights, the channel is gone) are skipped rather than held against
    /// the user.
    async fn missing_subscriptions(&self, user_id: UserId) -> Vec<Channel> {
        let channels = match self.channels.list().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Required channels unavailable, not gating");
                return Vec::new();
            }
        };
        let mut missing = Vec::new();
        for channel in channels {
            match self.api.get_chat_member(channel.id, user_id).await {
                Ok(member) if !member.status.is_subscribed() => missing.push(channel),
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        channel_id = channel.id,
                        error = %e,
                        "Membership check failed, skipping"
                    );
                }
            }
        }
        missing
    }

    async fn prompt_subscription(
        &self,
        update: &Update,
        user_id: UserId,
        missing: &[Channel],
    ) -> Result<(), TransportError> {
        let lang = self.lang(user_id).await;
        if let Some(query) = &update.callback_query {
            let notice = match query.data.as_deref().and_then(CallbackAction::parse) {
                Some(CallbackAction::CheckSubscription) => Text::NotSubscribed,
                _ => Text::SubscribeFirst,
            };
            return self
                .api
                .answer_callback_query(&query.id, Some(text(lang, notice)), true)
                .await;
        }
        if let Some(message) = &update.message {
            let keyboard = subscription_keyboard(lang, missing);
            self.api
                .send_message(
                    message.chat.id,
                    text(lang, Text::SubscribeRequired),
                    true,
                    Some(&keyboard),
                )
                .await?;
        }
        Ok(())
    }

    async fn lang(&self, user: UserId) -> Lang {
        match self.users.language(user).await {
            Ok(lang) => lang,
            Err(e) => {
                debug!(user_id = user, error = %e, "Language lookup failed");
                Lang::default()
            }
        }
    }

    async fn video_quality(&self, user: UserId) -> VideoQuality {
        match self.users.video_quality(user).await {
            Ok(quality) => quality,
            Err(e) => {
                debug!(user_id = user, error = %e, "Quality lookup failed");
                VideoQuality::default()
            }
        }
    }

    async fn handle_message(&self, message: Message) -> Result<(), TransportError> {
        let (Some(text), Some(from)) = (message.text.as_deref(), message.from.as_ref()) else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        let lang = self.lang(from.id).await;

        match Command::parse(text) {
            Some(command) => self.handle_command(command, chat_id, from, lang).await,
            None => self.handle_link(chat_id, from.id, text, lang).await,
        }
    }

    async fn handle_command(
        &self,
        command: Command,
        chat_id: ChatId,
        from: &User,
        lang: Lang,
    ) -> Result<(), TransportError> {
        if command.is_admin_only() && !self.is_admin(from.id) {
            debug!(user_id = from.id, ?command, "Admin command from non-admin ignored");
            return Ok(());
        }

        match command {
            Command::Start => {
                let profile = UserProfile {
                    id: from.id,
                    username: from.username.clone(),
                    full_name: from.full_name(),
                };
                match self.users.register(profile).await {
                    Ok(true) => info!(user_id = from.id, "New user registered"),
                    Ok(false) => {}
                    Err(e) => warn!(user_id = from.id, error = %e, "User registration failed"),
                }
                let greeting = presenter::welcome(lang, &from.full_name());
                self.api.send_message(chat_id, &greeting, true, None).await?;
            }
            Command::Help => {
                self.api
                    .send_message(chat_id, text(lang, Text::Help), true, None)
                    .await?;
            }
            Command::Lang => {
                self.api
                    .send_message(
                        chat_id,
                        text(lang, Text::SelectLanguage),
                        true,
                        Some(&language_keyboard()),
                    )
                    .await?;
            }
            Command::Platforms => {
                self.api
                    .send_message(chat_id, &presenter::platform_table(), false, None)
                    .await?;
            }
            Command::Settings => {
                let quality = self.video_quality(from.id).await;
                self.api
                    .send_message(
                        chat_id,
                        &presenter::settings_text(lang, quality),
                        true,
                        Some(&quality_keyboard(quality)),
                    )
                    .await?;
            }
            Command::Stats => {
                let users = self.users.stats().await.unwrap_or_else(|e| {
                    warn!(error = %e, "User stats unavailable");
                    UserStats::default()
                });
                let cached = self.scheduler.cache().len().await;
                let report = format_stats(&users, &self.scheduler.stats(), cached);
                self.api.send_message(chat_id, &report, false, None).await?;
            }
            Command::Broadcast(body) => {
                if body.is_empty() {
                    self.api
                        .send_message(chat_id, "Usage: /broadcast <text>", false, None)
                        .await?;
                    return Ok(());
                }
                let report = self.broadcast(&body).await;
                let summary = format!(
                    "📢 Broadcast finished\nDelivered: {}\nFailed: {}",
                    report.delivered, report.failed
                );
                self.api.send_message(chat_id, &summary, false, None).await?;
            }
            Command::AddChannel(target) => {
                if target.is_empty() {
                    self.api
                        .send_message(chat_id, "Usage: /add_channel <@username|id>", false, None)
                        .await?;
                    return Ok(());
                }
                let reply = match self.add_channel(&target).await {
                    Ok(channel) => format!("✅ Channel added: {}", channel.title),
                    Err(reason) => format!("❌ {reason}"),
                };
                self.api.send_message(chat_id, &reply, false, None).await?;
            }
            Command::Channels => {
                let channels = self.channels.list().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Required channels unavailable");
                    Vec::new()
                });
                self.api
                    .send_message(
                        chat_id,
                        &presenter::channel_list(&channels),
                        true,
                        Some(&channel_list_keyboard(&channels)),
                    )
                    .await?;
            }
            Command::Unknown(name) => {
                debug!(command = %name, "Unknown command ignored");
            }
        }
        Ok(())
    }

    async fn handle_link(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_text: &str,
        lang: Lang,
    ) -> Result<(), TransportError> {
        if !self.request_limiter.admit(user_id) {
            debug!(user_id, "Download request throttled");
            return Ok(());
        }

        let link = match MediaLink::parse(message_text) {
            Ok(link) => link,
            Err(LinkError::NoUrl) => {
                self.api
                    .send_message(chat_id, text(lang, Text::ErrorLink), true, None)
                    .await?;
                return Ok(());
            }
            Err(LinkError::UnsupportedPlatform(url)) => {
                debug!(user_id, url = %url, "Unsupported platform");
                self.api
                    .send_message(chat_id, text(lang, Text::ErrorUnsupported), true, None)
                    .await?;
                return Ok(());
            }
        };

        let platform = link.platform();
        if platform.needs_choice() {
            let prompt = presenter::kind_prompt(lang, platform);
            let keyboard = kind_keyboard(lang, platform);
            self.pending.insert(chat_id, user_id, link);
            self.api
                .send_message(chat_id, &prompt, true, Some(&keyboard))
                .await?;
        } else {
            self.start_job(chat_id, user_id, link, platform.default_kind(), false).await;
        }
        Ok(())
    }

    /// Resolve `target`, check the bot administers it and store it
    async fn add_channel(&self, target: &str) -> Result<Channel, String> {
        let chat = self
            .api
            .get_chat(target)
            .await
            .map_err(|e| format!("Channel lookup failed: {e}"))?;
        let me = self
            .api
            .get_me()
            .await
            .map_err(|e| format!("Bot identity unavailable: {e}"))?;
        let member = self
            .api
            .get_chat_member(chat.id, me.id)
            .await
            .map_err(|e| format!("Membership check failed: {e}"))?;
        if !member.status.is_admin() {
            return Err("The bot is not an administrator of this channel".to_string());
        }
        let link = chat
            .join_link()
            .ok_or_else(|| "The channel has neither a username nor an invite link".to_string())?;
        let title = chat
            .title
            .clone()
            .or_else(|| chat.username.clone())
            .unwrap_or_else(|| chat.id.to_string());

        let channel = Channel::new(chat.id, title, chat.username.clone(), link);
        self.channels
            .add(channel.clone())
            .await
            .map_err(|e| format!("Channel not saved: {e}"))?;
        info!(channel_id = channel.id, title = %channel.title, "Required channel added");
        Ok(channel)
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<(), TransportError> {
        let user_id = query.from.id;
        let action = query.data.as_deref().and_then(CallbackAction::parse);
        // The subscription gate has already passed for this user
        let notice = match action {
            Some(CallbackAction::CheckSubscription) => {
                Some(text(self.lang(user_id).await, Text::SubscriptionConfirmed))
            }
            _ => None,
        };
        if let Err(e) = self
            .api
            .answer_callback_query(&query.id, notice, notice.is_some())
            .await
        {
            debug!(error = %e, "Callback query not acknowledged");
        }
        let Some(message) = query.message.as_ref() else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        let message_id = message.message_id;

        let Some(action) = action else {
            debug!(data = ?query.data, "Unknown callback payload");
            return Ok(());
        };

        match action {
            CallbackAction::SetLanguage(lang) => {
                if let Err(e) = self.users.set_language(user_id, lang).await {
                    warn!(user_id, error = %e, "Language not saved");
                }
                let selected = text(lang, Text::LanguageSelected);
                self.api
                    .edit_message_text(chat_id, message_id, selected, None)
                    .await?;
            }
            CallbackAction::SetQuality(quality) => {
                if let Err(e) = self.users.set_video_quality(user_id, quality).await {
                    warn!(user_id, error = %e, "Video quality not saved");
                }
                let lang = self.lang(user_id).await;
                self.api
                    .edit_message_text(
                        chat_id,
                        message_id,
                        &presenter::settings_text(lang, quality),
                        Some(&quality_keyboard(quality)),
                    )
                    .await?;
            }
            CallbackAction::Cancel => {
                self.pending.take(chat_id, user_id);
                let lang = self.lang(user_id).await;
                self.api
                    .edit_message_text(chat_id, message_id, text(lang, Text::Cancelled), None)
                    .await?;
            }
            CallbackAction::Download { kind, no_watermark } => {
                let Some(link) = self.pending.take(chat_id, user_id) else {
                    let lang = self.lang(user_id).await;
                    self.api
                        .edit_message_text(chat_id, message_id, text(lang, Text::LinkExpired), None)
                        .await?;
                    return Ok(());
                };
                self.delete_quietly(chat_id, message_id).await;
                self.start_job(chat_id, user_id, link, kind, no_watermark).await;
            }
            CallbackAction::CheckSubscription | CallbackAction::Close => {
                self.delete_quietly(chat_id, message_id).await;
            }
            CallbackAction::RemoveChannel(channel_id) => {
                if !self.is_admin(user_id) {
                    debug!(user_id, channel_id, "Channel removal from non-admin ignored");
                    return Ok(());
                }
                match self.channels.remove(channel_id).await {
                    Ok(removed) => info!(channel_id, removed, "Required channel removed"),
                    Err(e) => warn!(channel_id, error = %e, "Channel not removed"),
                }
                let channels = self.channels.list().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Required channels unavailable");
                    Vec::new()
                });
                self.api
                    .edit_message_text(
                        chat_id,
                        message_id,
                        &presenter::channel_list(&channels),
                        Some(&channel_list_keyboard(&channels)),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete_quietly(&self, chat_id: ChatId, message_id: i64) {
        if let Err(e) = self.api.delete_message(chat_id, message_id).await {
            debug!(error = %e, "Message not deleted");
        }
    }

    async fn start_job(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        link: MediaLink,
        kind: MediaKind,
        no_watermark: bool,
    ) {
        let quality = self.video_quality(user_id).await;
        let job_id = self.scheduler.next_job_id();
        debug!(
            job_id,
            user_id,
            url = %link.url(),
            %kind,
            %quality,
            no_watermark,
            "Scheduling download"
        );
        let job = DownloadJob::new(job_id, user_id, chat_id, link, kind)
            .with_no_watermark(no_watermark)
            .with_quality(quality);
        // Detached; the scheduler logs and reports the outcome itself
        drop(self.scheduler.spawn(job));
    }

    /// Send `body` to every active user, pacing sends
    pub async fn broadcast(&self, body: &str) -> BroadcastReport {
        let recipients = match self.users.active_users().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Broadcast recipients unavailable");
                return BroadcastReport::default();
            }
        };
        info!(recipients = recipients.len(), "Broadcast started");

        let mut report = BroadcastReport::default();
        for (i, user_id) in recipients.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.broadcast_interval).await;
            }
            let sent = send_with_retry(MAX_SEND_ATTEMPTS, || {
                self.api.send_message(user_id, body, false, None)
            })
            .await;
            match sent {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    debug!(user_id, error = %e, "Broadcast recipient unreachable");
                    report.failed += 1;
                    if let Err(e) = self.users.set_active(user_id, false).await {
                        warn!(user_id, error = %e, "Could not mark user inactive");
                    }
                }
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast finished"
        );
        report
    }
}

/// Plain-text `/stats` report
pub fn format_stats(
    users: &UserStats,
    scheduler: &SchedulerStats,
    cached: Option<usize>,
) -> String {
    let cached = cached
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unavailable".to_string());
    format!(
        "📊 Statistics\n\n\
         Users: {}\n\
         Active: {}\n\
         New today: {}\n\n\
         Jobs in flight: {}\n\
         Free worker slots: {}/{}\n\
         Cached links: {}",
        users.total,
        users.active,
        users.new_today,
        scheduler.in_flight,
        scheduler.available,
        scheduler.capacity,
        cached
    )
}
