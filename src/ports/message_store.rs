//! Persistence port for channel messages.
//!
//! Message storage belongs to a collaborator; the channel sequencer calls
//! this port to apply an accepted mutation and receives the resulting
//! [`MessageView`]. Calls for one channel are always serialized by that
//! channel's sequencer, so implementations need no per-channel locking of
//! their own.

use async_trait::async_trait;

use crate::domain::chat::{MessageView, NewMessage};
use crate::domain::foundation::{ChannelId, DomainError, MessageId, Timestamp, UserId};

/// Stores and mutates messages.
///
/// Mutations on a missing or deleted message return
/// `ErrorCode::MessageNotFound`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Look up a message, including soft-deleted ones.
    async fn find(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<MessageView>, DomainError>;

    /// Persist a new message authored at `created_at`.
    async fn create(
        &self,
        channel_id: &ChannelId,
        author: &UserId,
        message: NewMessage,
        created_at: Timestamp,
    ) -> Result<MessageView, DomainError>;

    /// Replace a message's content.
    async fn edit(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        content: String,
        updated_at: Timestamp,
    ) -> Result<MessageView, DomainError>;

    /// Soft-delete a message. Returns the deletion time.
    async fn delete(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        deleted_at: Timestamp,
    ) -> Result<Timestamp, DomainError>;

    /// Add `user`'s `emoji` reaction, or remove it if present.
    async fn toggle_reaction(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        user: &UserId,
        emoji: &str,
        at: Timestamp,
    ) -> Result<MessageView, DomainError>;
}
