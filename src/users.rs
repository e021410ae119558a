//! User records behind a narrow repository interface.
//!
//! The bot registers users on `/start`, marks them active on every message
//! and inactive when a broadcast cannot reach them, and keeps their interface
//! language and preferred video quality. Only an in-memory repository
//! ships; durable stores implement [`UserRepository`].

use crate::transport::i18n::Lang;
use crate::{UserId, VideoQuality};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// User store errors
#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    /// Backing store failure
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Identity as reported by the chat backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identifier
    pub id: UserId,
    /// Public username without `@`
    pub username: Option<String>,
    /// Display name
    pub full_name: String,
}

/// Stored user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Identity
    pub profile: UserProfile,
    /// Reachable for broadcasts
    pub active: bool,
    /// Interface language
    pub language: Lang,
    /// Height cap for video downloads
    #[serde(default)]
    pub video_quality: VideoQuality,
    /// First registration
    pub joined_at: DateTime<Utc>,
    /// Last time the user did anything
    pub last_active: DateTime<Utc>,
}

/// Counters for the admin `/stats` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    /// All known users
    pub total: usize,
    /// Users not marked inactive
    pub active: usize,
    /// Users who joined since midnight UTC
    pub new_today: usize,
}

/// Persistence for user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or refresh a user; returns `true` when the user is new
    async fn register(&self, profile: UserProfile) -> Result<bool, UserStoreError>;

    /// Mark a user reachable or unreachable
    async fn set_active(&self, user_id: UserId, active: bool) -> Result<(), UserStoreError>;

    /// Interface language (default when unknown)
    async fn language(&self, user_id: UserId) -> Result<Lang, UserStoreError>;

    /// Change interface language
    async fn set_language(&self, user_id: UserId, lang: Lang) -> Result<(), UserStoreError>;

    /// Preferred video quality (default when unknown)
    async fn video_quality(&self, user_id: UserId) -> Result<VideoQuality, UserStoreError>;

    /// Change preferred video quality
    async fn set_video_quality(
        &self,
        user_id: UserId,
        quality: VideoQuality,
    ) -> Result<(), UserStoreError>;

    /// Identifiers of users marked active
    async fn active_users(&self) -> Result<Vec<UserId>, UserStoreError>;

    /// Aggregate counters
    async fn stats(&self) -> Result<UserStats, UserStoreError>;
}

/// In-process repository
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: DashMap<UserId, UserRecord>,
}

impl MemoryUserRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored record, if any
    pub fn get(&self, user_id: UserId) -> Option<UserRecord> {
        self.users.get(&user_id).map(|r| r.value().clone())
    }

    /// Apply `change` to the record of `user_id`, creating a bare one first
    fn update(&self, user_id: UserId, change: impl FnOnce(&mut UserRecord)) {
        let now = Utc::now();
        let mut record = self.users.entry(user_id).or_insert_with(|| UserRecord {
            profile: UserProfile {
                id: user_id,
                username: None,
                full_name: String::new(),
            },
            active: true,
            language: Lang::default(),
            video_quality: VideoQuality::default(),
            joined_at: now,
            last_active: now,
        });
        change(record.value_mut());
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn register(&self, profile: UserProfile) -> Result<bool, UserStoreError> {
        let now = Utc::now();
        let mut is_new = false;
        self.users
            .entry(profile.id)
            .and_modify(|record| {
                record.profile = profile.clone();
                record.active = true;
                record.last_active = now;
            })
            .or_insert_with(|| {
                is_new = true;
                UserRecord {
                    profile: profile.clone(),
                    active: true,
                    language: Lang::default(),
                    video_quality: VideoQuality::default(),
                    joined_at: now,
                    last_active: now,
                }
            });
        Ok(is_new)
    }

    async fn set_active(&self, user_id: UserId, active: bool) -> Result<(), UserStoreError> {
        if let Some(mut record) = self.users.get_mut(&user_id) {
            record.active = active;
            if active {
                record.last_active = Utc::now();
            }
        }
        Ok(())
    }

    async fn language(&self, user_id: UserId) -> Result<Lang, UserStoreError> {
        Ok(self
            .users
            .get(&user_id)
            .map(|r| r.language)
            .unwrap_or_default())
    }

    async fn set_language(&self, user_id: UserId, lang: Lang) -> Result<(), UserStoreError> {
        self.update(user_id, |record| record.language = lang);
        Ok(())
    }

    async fn video_quality(&self, user_id: UserId) -> Result<VideoQuality, UserStoreError> {
        Ok(self
            .users
            .get(&user_id)
            .map(|r| r.video_quality)
            .unwrap_or_default())
    }

    async fn set_video_quality(
        &self,
        user_id: UserId,
        quality: VideoQuality,
    ) -> Result<(), UserStoreError> {
        self.update(user_id, |record| record.video_quality = quality);
        Ok(())
    }

    async fn active_users(&self) -> Result<Vec<UserId>, UserStoreError> {
        let mut ids: Vec<UserId> = self
            .users
            .iter()
            .filter(|r| r.active)
            .map(|r| *r.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn stats(&self) -> Result<UserStats, UserStoreError> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc());
        let mut stats = UserStats::default();
        for record in self.users.iter() {
            stats.total += 1;
            if record.active {
                stats.active += 1;
            }
            if midnight.is_some_and(|m| record.joined_at >= m) {
                stats.new_today += 1;
            }
        }
        Ok(stats)
    }
}
