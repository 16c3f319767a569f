//! Channel mutations and the sequenced events they produce.
//!
//! A [`MutationRequest`] is what a connection asks for; a
//! [`SequencedEvent`] is what every room member observes once the channel
//! sequencer has accepted it. Rejected mutations never become events.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ChannelId, MessageId, Timestamp, UserId, ValidationError};

use super::message::{Attachment, MessageView, Reactions};

/// Longest emoji shortcode/grapheme sequence accepted for a reaction.
const MAX_EMOJI_LEN: usize = 64;

/// Most mentions a single message may carry.
const MAX_MENTIONS: usize = 50;

/// Payload of a new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub reply_to_id: Option<MessageId>,
    pub mentions: Vec<UserId>,
    pub attachments: Vec<Attachment>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reply_to_id: None,
            mentions: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// A requested change to a channel's message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMutation {
    Create(NewMessage),
    Edit { message_id: MessageId, content: String },
    Delete { message_id: MessageId },
    ToggleReaction { message_id: MessageId, emoji: String },
}

impl ChannelMutation {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMutation::Create(_) => "create",
            ChannelMutation::Edit { .. } => "edit",
            ChannelMutation::Delete { .. } => "delete",
            ChannelMutation::ToggleReaction { .. } => "reaction",
        }
    }

    /// Entry validation. Malformed payloads never reach the sequencer.
    pub fn validate(&self, max_content_len: usize) -> Result<(), ValidationError> {
        match self {
            ChannelMutation::Create(new) => {
                if new.content.trim().is_empty() && new.attachments.is_empty() {
                    return Err(ValidationError::empty_field("content"));
                }
                validate_content_len(&new.content, max_content_len)?;
                if new.mentions.len() > MAX_MENTIONS {
                    return Err(ValidationError::too_long(
                        "mentions",
                        MAX_MENTIONS,
                        new.mentions.len(),
                    ));
                }
                for attachment in &new.attachments {
                    if attachment.url.trim().is_empty() {
                        return Err(ValidationError::empty_field("attachments.url"));
                    }
                }
                Ok(())
            }
            ChannelMutation::Edit { content, .. } => {
                if content.trim().is_empty() {
                    return Err(ValidationError::empty_field("content"));
                }
                validate_content_len(content, max_content_len)
            }
            ChannelMutation::Delete { .. } => Ok(()),
            ChannelMutation::ToggleReaction { emoji, .. } => {
                if emoji.trim().is_empty() {
                    return Err(ValidationError::empty_field("emoji"));
                }
                if emoji.chars().count() > MAX_EMOJI_LEN || emoji.chars().any(char::is_whitespace) {
                    return Err(ValidationError::invalid_format(
                        "emoji",
                        "must be a single emoji or shortcode",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn validate_content_len(content: &str, max: usize) -> Result<(), ValidationError> {
    let len = content.chars().count();
    if len > max {
        return Err(ValidationError::too_long("content", max, len));
    }
    Ok(())
}

/// A mutation as submitted by an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub channel_id: ChannelId,
    pub actor: UserId,
    pub mutation: ChannelMutation,
}

impl MutationRequest {
    pub fn new(channel_id: ChannelId, actor: UserId, mutation: ChannelMutation) -> Self {
        Self {
            channel_id,
            actor,
            mutation,
        }
    }
}

/// Effect of an accepted mutation, as broadcast to the channel room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    MessageNew(MessageView),
    MessageUpdated(MessageView),
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        message_id: MessageId,
        deleted_at: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    ReactionUpdated {
        message_id: MessageId,
        reactions: Reactions,
        updated_at: Timestamp,
    },
}

impl ChannelEvent {
    /// Wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            ChannelEvent::MessageNew(_) => "message:new",
            ChannelEvent::MessageUpdated(_) => "message:updated",
            ChannelEvent::MessageDeleted { .. } => "message:deleted",
            ChannelEvent::ReactionUpdated { .. } => "reaction:updated",
        }
    }

    /// Message the event concerns.
    pub fn message_id(&self) -> MessageId {
        match self {
            ChannelEvent::MessageNew(view) | ChannelEvent::MessageUpdated(view) => view.id,
            ChannelEvent::MessageDeleted { message_id, .. }
            | ChannelEvent::ReactionUpdated { message_id, .. } => *message_id,
        }
    }
}

/// An accepted mutation with its per-channel position.
///
/// `sequence` starts at 1 and increases by exactly one per accepted
/// mutation in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedEvent {
    pub channel_id: ChannelId,
    pub sequence: u64,
    pub actor: UserId,
    pub occurred_at: Timestamp,
    pub event: ChannelEvent,
}
