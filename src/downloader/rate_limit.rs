//! Per-user admission control
//!
//! A request from user U is admitted only if at least `cooldown` has passed
//! since U's last admitted request. The compare and the timestamp update
//! happen under the map's per-shard entry lock, so two concurrent calls for
//! the same user can never both be admitted inside one window. Rejections
//! leave the record untouched.

use crate::UserId;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Per-user cooldown gate
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_admitted: DashMap<UserId, Instant>,
    exempt: HashSet<UserId>,
}

impl RateLimiter {
    /// Create a limiter with the given cooldown
    ///
    /// # Arguments
    /// * `cooldown` - Minimum spacing between two admitted requests of one user
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_admitted: DashMap::new(),
            exempt: HashSet::new(),
        }
    }

    /// Users that bypass the limiter entirely (admins)
    pub fn with_exempt<I: IntoIterator<Item = UserId>>(mut self, users: I) -> Self {
        self.exempt.extend(users);
        self
    }

    /// Configured cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Admit a request from `user` at the current instant
    pub fn admit(&self, user: UserId) -> bool {
        self.admit_at(user, Instant::now())
    }

    /// Admit a request from `user` observed at `now`
    ///
    /// Returns `true` and records `now` iff the user has no admitted request
    /// within the cooldown window.
    pub fn admit_at(&self, user: UserId, now: Instant) -> bool {
        if self.exempt.contains(&user) {
            return true;
        }

        let mut admitted = false;
        self.last_admitted
            .entry(user)
            .and_modify(|last| {
                if now.saturating_duration_since(*last) >= self.cooldown {
                    *last = now;
                    admitted = true;
                }
            })
            .or_insert_with(|| {
                admitted = true;
                now
            });

        if !admitted {
            tracing::trace!(user_id = user, "Request dropped by cooldown");
        }
        admitted
    }

    /// Number of users with a recorded admission
    pub fn tracked_users(&self) -> usize {
        self.last_admitted.len()
    }
}
