//! Links waiting for the user to pick a media kind
//!
//! Choices are keyed by chat and user together, so in a group chat one
//! member's link never answers another member's button press.

use crate::link::MediaLink;
use crate::{ChatId, UserId};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// How long a kind picker stays valid
pub const DEFAULT_CHOICE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct PendingChoice {
    link: MediaLink,
    created: Instant,
}

/// One pending link per user in a chat; a newer link replaces the older one
#[derive(Debug)]
pub struct PendingChoices {
    entries: DashMap<(ChatId, UserId), PendingChoice>,
    ttl: Duration,
}

impl Default for PendingChoices {
    fn default() -> Self {
        Self::new(DEFAULT_CHOICE_TTL)
    }
}

impl PendingChoices {
    /// Store with the given expiry
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Remember `link` sent by `user` in `chat`
    pub fn insert(&self, chat: ChatId, user: UserId, link: MediaLink) {
        self.insert_at(chat, user, link, Instant::now());
    }

    /// [`insert`](Self::insert) with an explicit clock
    pub fn insert_at(&self, chat: ChatId, user: UserId, link: MediaLink, now: Instant) {
        self.entries.insert((chat, user), PendingChoice { link, created: now });
    }

    /// Remove and return the link `user` left in `chat`, if not expired
    pub fn take(&self, chat: ChatId, user: UserId) -> Option<MediaLink> {
        self.take_at(chat, user, Instant::now())
    }

    /// [`take`](Self::take) with an explicit clock
    pub fn take_at(&self, chat: ChatId, user: UserId, now: Instant) -> Option<MediaLink> {
        let (_, choice) = self.entries.remove(&(chat, user))?;
        if now.saturating_duration_since(choice.created) > self.ttl {
            return None;
        }
        Some(choice.link)
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, c| now.saturating_duration_since(c.created) <= self.ttl);
        before - self.entries.len()
    }

    /// Pending entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No pending entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
