//! `serve`: run the Telegram bot with its liveness endpoint

use crate::bot::{Bot, BotConfig};
use crate::downloader::DownloadScheduler;
use crate::health;
use crate::shutdown::SharedShutdown;
use crate::transport::telegram::DEFAULT_API_BASE;
use crate::transport::{SendLimits, TelegramApi, TelegramTransport};
use crate::users::{MemoryUserRepository, UserRepository};
use crate::UserId;
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use super::{Cli, CliError};

/// Serve command arguments
#[derive(Args)]
pub struct ServeArgs {
    /// Bot API token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Comma separated admin user ids
    #[arg(long, env = "ADMIN_IDS", value_delimiter = ',')]
    pub admin_ids: Vec<UserId>,

    /// Liveness endpoint bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = health::DEFAULT_HEALTH_ADDR)]
    pub health_addr: SocketAddr,

    /// Bot API base URL (self-hosted Bot API servers lift upload limits)
    #[arg(long, env = "TELEGRAM_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Signature line added to captions, e.g. "@my_bot"
    #[arg(long, env = "BOT_SIGNATURE")]
    pub signature: Option<String>,

    /// Largest video/audio sent inline, in MB; bigger files go as documents
    #[arg(long, env = "MAX_INLINE_MEDIA_MB", default_value_t = 50.0)]
    pub max_inline_media_mb: f64,
}

impl std::fmt::Debug for ServeArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServeArgs")
            .field("bot_token", &"<redacted>")
            .field("admin_ids", &self.admin_ids)
            .field("health_addr", &self.health_addr)
            .field("api_base", &self.api_base)
            .field("signature", &self.signature)
            .field("max_inline_media_mb", &self.max_inline_media_mb)
            .finish()
    }
}

impl ServeArgs {
    /// Run until shutdown
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        if self.bot_token.trim().is_empty() {
            return Err(CliError::ConfigurationError(
                "BOT_TOKEN must not be empty".to_string(),
            ));
        }
        if self.max_inline_media_mb <= 0.0 {
            return Err(CliError::InvalidArgument(
                "--max-inline-media-mb must be positive".to_string(),
            ));
        }
        cli.init_metrics().await?;

        let api = Arc::new(TelegramApi::with_base(&self.api_base, &self.bot_token));
        let users: Arc<dyn UserRepository> = Arc::new(MemoryUserRepository::new());

        let mut transport = TelegramTransport::new(api.clone(), users.clone());
        if let Some(sig) = &self.signature {
            transport = transport.with_signature(sig.clone());
        }

        let limits = SendLimits {
            media_max_mb: self.max_inline_media_mb,
            ..SendLimits::default()
        };
        let mut scheduler = DownloadScheduler::new(
            cli.scheduler_config(),
            cli.open_cache()?,
            cli.extractors(),
            Arc::new(transport),
        )
        .with_send_limits(limits)
        .with_shutdown(shutdown.clone());
        if let Some(sig) = &self.signature {
            scheduler = scheduler.with_signature(sig.clone());
        }
        let scheduler = Arc::new(scheduler);

        let health = tokio::spawn(health::serve(self.health_addr, shutdown.clone()));

        let config = BotConfig::default().with_admins(self.admin_ids.clone());
        let bot = Arc::new(Bot::new(api, scheduler, users, config));
        info!(
            admins = self.admin_ids.len(),
            health_addr = %self.health_addr,
            "Bot starting"
        );
        bot.run(shutdown.clone()).await;

        shutdown.request_shutdown();
        match health.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Health endpoint failed");
                return Err(CliError::IoError(e));
            }
            Err(e) => error!(error = %e, "Health endpoint task aborted"),
        }
        info!("Bot stopped");
        Ok(())
    }
}
