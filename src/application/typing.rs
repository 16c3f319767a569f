//! Typing aggregator: per-channel typing sets with TTL expiry.
//!
//! Updates are produced only when a channel's visible typer set changes.
//! Renewals within the TTL are silent. Expired typers disappear at the next
//! [`TypingAggregator::sweep`], so a stale typer is broadcast as gone within
//! TTL plus one sweep interval.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::foundation::{ChannelId, Timestamp, UserId};
use crate::domain::typing::TypingSet;

/// The typer list to broadcast for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUpdate {
    pub channel_id: ChannelId,
    pub user_ids: Vec<UserId>,
}

pub struct TypingAggregator {
    channels: RwLock<HashMap<ChannelId, TypingSet>>,
    ttl: Duration,
}

impl TypingAggregator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// `user` started (or is still) typing.
    pub async fn start(&self, channel_id: ChannelId, user: &UserId, now: Timestamp) -> Option<TypingUpdate> {
        let mut channels = self.channels.write().await;
        let set = channels
            .entry(channel_id)
            .or_insert_with(|| TypingSet::new(channel_id));
        set.start(user, now, self.ttl).then(|| TypingUpdate {
            channel_id,
            user_ids: set.current(&now),
        })
    }

    /// `user` stopped typing. Idempotent.
    pub async fn stop(&self, channel_id: ChannelId, user: &UserId, now: Timestamp) -> Option<TypingUpdate> {
        let mut channels = self.channels.write().await;
        let set = channels.get_mut(&channel_id)?;
        let changed = set.stop(user);
        let update = changed.then(|| TypingUpdate {
            channel_id,
            user_ids: set.current(&now),
        });
        if set.is_empty() {
            channels.remove(&channel_id);
        }
        update
    }

    /// Users typing in `channel_id` at `now`.
    pub async fn current_typers(&self, channel_id: ChannelId, now: Timestamp) -> Vec<UserId> {
        self.channels
            .read()
            .await
            .get(&channel_id)
            .map(|set| set.current(&now))
            .unwrap_or_default()
    }

    /// Drops expired typers and reports channels whose set changed.
    pub async fn sweep(&self, now: Timestamp) -> Vec<TypingUpdate> {
        let mut channels = self.channels.write().await;
        let mut updates = Vec::new();
        for (channel_id, set) in channels.iter_mut() {
            if set.expire(&now) {
                updates.push(TypingUpdate {
                    channel_id: *channel_id,
                    user_ids: set.current(&now),
                });
            }
        }
        channels.retain(|_, set| !set.is_empty());
        updates
    }
}
