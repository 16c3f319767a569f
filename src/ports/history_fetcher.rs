//! REST history port used by client-side timelines.
//!
//! Pages are numbered from 1 (newest). Each page lists its messages in
//! ascending `(createdAt, id)` order and says whether older ones exist.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chat::MessageView;
use crate::domain::foundation::{ChannelId, MessageId};
use crate::domain::timeline::HistoryPage;

/// Failures fetching history.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("message {0} not found")]
    NotFound(MessageId),

    #[error("history request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("history transport error: {0}")]
    Transport(String),

    #[error("history response could not be decoded: {0}")]
    Decode(String),
}

impl HistoryError {
    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            HistoryError::Transport(_) => true,
            HistoryError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Fetches message history for one channel.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// `page` counts from 1 = newest.
    async fn fetch_page(
        &self,
        channel_id: &ChannelId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError>;

    /// Up to `limit` messages immediately older than `before`.
    async fn fetch_before(
        &self,
        channel_id: &ChannelId,
        before: &MessageId,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError>;

    /// Up to `limit` messages immediately newer than `after`.
    async fn fetch_after(
        &self,
        channel_id: &ChannelId,
        after: &MessageId,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError>;

    /// A single message, `None` if it does not exist or was deleted.
    async fn fetch_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<MessageView>, HistoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(HistoryError::Http { status: 503, message: "busy".into() }.is_retryable());
        assert!(!HistoryError::Http { status: 404, message: "gone".into() }.is_retryable());
        assert!(HistoryError::Transport("reset".into()).is_retryable());
    }
}
