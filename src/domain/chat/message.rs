//! Message view produced by the persistence collaborator.
//!
//! The engine never owns message storage; it orders and relays changes to
//! these views. Ordering everywhere is by [`OrderKey`], i.e. `(createdAt, id)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ChannelId, MessageId, Timestamp, UserId};

/// Total order of messages inside a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub created_at: Timestamp,
    pub id: MessageId,
}

/// File attached to a message (stored elsewhere; only metadata travels).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Aggregated reactions for one emoji.
///
/// `has_reacted` is viewer-relative: the server always sends `false` and
/// each client recomputes it from `users` for its own user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub count: u32,
    #[serde(default)]
    pub has_reacted: bool,
    pub users: Vec<UserId>,
}

/// Emoji → reaction summary, ordered for stable serialization.
pub type Reactions = BTreeMap<String, ReactionSummary>;

/// A chat message as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub mentions: Vec<UserId>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reactions: Reactions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl MessageView {
    /// Creates a fresh message authored now.
    pub fn new(
        channel_id: ChannelId,
        author_id: UserId,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::new(),
            channel_id,
            author_id,
            content: content.into(),
            created_at,
            updated_at: created_at,
            reply_to_id: None,
            mentions: Vec::new(),
            attachments: Vec::new(),
            reactions: Reactions::new(),
            deleted_at: None,
        }
    }

    /// Position of this message in channel order.
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            created_at: self.created_at,
            id: self.id,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Toggles `user`'s `emoji` reaction. Returns true if the reaction was added.
    pub fn toggle_reaction(&mut self, user: &UserId, emoji: &str, now: Timestamp) -> bool {
        let summary = self.reactions.entry(emoji.to_string()).or_default();
        let added = match summary.users.iter().position(|u| u == user) {
            Some(index) => {
                summary.users.remove(index);
                false
            }
            None => {
                summary.users.push(user.clone());
                true
            }
        };
        summary.count = summary.users.len() as u32;
        if summary.count == 0 {
            self.reactions.remove(emoji);
        }
        self.updated_at = now;
        added
    }

    /// Recomputes `has_reacted` for every emoji relative to `viewer`.
    pub fn personalize(&mut self, viewer: &UserId) {
        for summary in self.reactions.values_mut() {
            summary.has_reacted = summary.users.contains(viewer);
        }
    }
}
