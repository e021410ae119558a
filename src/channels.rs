//! Channels users must join before the bot serves them
//!
//! Admins add channels with `/add_channel` and remove them from the
//! `/channels` list. While the list is empty nobody is gated.

use crate::ChatId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Channel store errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelStoreError {
    /// Backing store failure
    #[error("channel store unavailable: {0}")]
    Unavailable(String),
}

/// A required channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel chat id
    pub id: ChatId,
    /// Display title
    pub title: String,
    /// Public username without `@`
    pub username: Option<String>,
    /// Link shown on the join button
    pub invite_link: String,
    /// When the channel was added
    pub added_at: DateTime<Utc>,
}

impl Channel {
    /// Channel stamped with the current time
    pub fn new(
        id: ChatId,
        title: impl Into<String>,
        username: Option<String>,
        invite_link: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            username,
            invite_link: invite_link.into(),
            added_at: Utc::now(),
        }
    }
}

/// Persistence for required channels
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Insert or refresh by id; returns `true` when the channel is new
    async fn add(&self, channel: Channel) -> Result<bool, ChannelStoreError>;

    /// Remove by id; returns `true` when something was removed
    async fn remove(&self, id: ChatId) -> Result<bool, ChannelStoreError>;

    /// All channels, oldest first
    async fn list(&self) -> Result<Vec<Channel>, ChannelStoreError>;
}

/// In-process repository
#[derive(Debug, Default)]
pub struct MemoryChannelRepository {
    channels: DashMap<ChatId, Channel>,
}

impl MemoryChannelRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelRepository for MemoryChannelRepository {
    async fn add(&self, channel: Channel) -> Result<bool, ChannelStoreError> {
        let mut is_new = true;
        self.channels
            .entry(channel.id)
            .and_modify(|existing| {
                is_new = false;
                // Keep the original position in the list
                let added_at = existing.added_at;
                *existing = Channel {
                    added_at,
                    ..channel.clone()
                };
            })
            .or_insert_with(|| channel.clone());
        Ok(is_new)
    }

    async fn remove(&self, id: ChatId) -> Result<bool, ChannelStoreError> {
        Ok(self.channels.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<Channel>, ChannelStoreError> {
        let mut channels: Vec<Channel> = self.channels.iter().map(|c| c.value().clone()).collect();
        channels.sort_by_key(|c| (c.added_at, c.id));
        Ok(channels)
    }
}
