//! Port for per-user read positions.

use async_trait::async_trait;

use crate::domain::foundation::{ChannelId, DomainError, MessageId, Timestamp, UserId};

/// Records how far a user has read in a channel.
///
/// Read markers are private to the user; nothing is broadcast.
#[async_trait]
pub trait ReadMarkerStore: Send + Sync {
    /// Mark `channel_id` read up to `message_id`, or entirely when `None`.
    async fn mark_read(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        message_id: Option<MessageId>,
        at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Last read position, if any.
    async fn last_read(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
    ) -> Result<Option<ReadMarker>, DomainError>;
}

/// A stored read position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMarker {
    pub message_id: Option<MessageId>,
    pub read_at: Timestamp,
}
