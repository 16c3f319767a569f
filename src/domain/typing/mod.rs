//! Ephemeral per-channel typing state.
//!
//! Each entry carries an explicit `expires_at`; readers filter expired
//! entries so a typer is never observed past its expiry even if the sweep
//! has not run yet.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::foundation::{ChannelId, Timestamp, UserId};

/// One user typing in one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEntry {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub expires_at: Timestamp,
}

impl TypingEntry {
    pub fn is_expired(&self, now: &Timestamp) -> bool {
        !now.is_before(&self.expires_at)
    }
}

/// The typers of a single channel.
#[derive(Debug, Clone)]
pub struct TypingSet {
    channel_id: ChannelId,
    entries: HashMap<UserId, TypingEntry>,
}

impl TypingSet {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            entries: HashMap::new(),
        }
    }

    /// Starts or renews `user`. Returns true if the visible set changed.
    pub fn start(&mut self, user: &UserId, now: Timestamp, ttl: Duration) -> bool {
        let expires_at = now.plus(ttl);
        match self.entries.get_mut(user) {
            Some(entry) if !entry.is_expired(&now) => {
                entry.expires_at = expires_at;
                false
            }
            _ => {
                self.entries.insert(
                    user.clone(),
                    TypingEntry {
                        channel_id: self.channel_id,
                        user_id: user.clone(),
                        expires_at,
                    },
                );
                true
            }
        }
    }

    /// Stops `user`. Returns true if an entry was removed.
    ///
    /// An entry past its expiry but not yet swept still counts: its removal
    /// has not been announced, and the sweep will no longer see it.
    pub fn stop(&mut self, user: &UserId) -> bool {
        self.entries.remove(user).is_some()
    }

    /// Drops expired entries. Returns true if any were removed.
    pub fn expire(&mut self, now: &Timestamp) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.entries.len() != before
    }

    /// Users typing at `now`, sorted for stable output.
    pub fn current(&self, now: &Timestamp) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.user_id.clone())
            .collect();
        users.sort();
        users
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
