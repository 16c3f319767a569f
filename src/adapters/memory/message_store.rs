//! In-memory message store.
//!
//! Implements both the write side used by the sequencer ([`MessageStore`])
//! and the read side used by client timelines ([`HistoryFetcher`]), so a
//! single instance can back a development server or an end-to-end test.
//! Soft-deleted messages stay in storage but are never returned in history.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::chat::{MessageView, NewMessage, OrderKey};
use crate::domain::foundation::{ChannelId, DomainError, MessageId, Timestamp, UserId};
use crate::domain::timeline::HistoryPage;
use crate::ports::{HistoryError, HistoryFetcher, MessageStore};

#[derive(Default)]
struct ChannelLog {
    messages: HashMap<MessageId, MessageView>,
    order: BTreeMap<OrderKey, MessageId>,
}

impl ChannelLog {
    fn live(&self) -> impl DoubleEndedIterator<Item = &MessageView> + '_ {
        self.order
            .values()
            .filter_map(|id| self.messages.get(id))
            .filter(|m| !m.is_deleted())
    }

    fn live_mut(&mut self, id: &MessageId) -> Result<&mut MessageView, DomainError> {
        match self.messages.get_mut(id) {
            Some(m) if !m.is_deleted() => Ok(m),
            _ => Err(DomainError::message_not_found(id)),
        }
    }
}

/// Message storage kept entirely in process memory.
#[derive(Default)]
pub struct InMemoryMessageStore {
    channels: RwLock<HashMap<ChannelId, ChannelLog>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live messages in a channel.
    pub async fn count(&self, channel_id: &ChannelId) -> usize {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map_or(0, |log| log.live().count())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn find(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<MessageView>, DomainError> {
        Ok(self
            .channels
            .read()
            .await
            .get(channel_id)
            .and_then(|log| log.messages.get(message_id))
            .cloned())
    }

    async fn create(
        &self,
        channel_id: &ChannelId,
        author: &UserId,
        message: NewMessage,
        created_at: Timestamp,
    ) -> Result<MessageView, DomainError> {
        let mut view = MessageView::new(*channel_id, author.clone(), message.content, created_at);
        view.reply_to_id = message.reply_to_id;
        view.mentions = message.mentions;
        view.attachments = message.attachments;

        let mut channels = self.channels.write().await;
        let log = channels.entry(*channel_id).or_default();
        log.order.insert(view.order_key(), view.id);
        log.messages.insert(view.id, view.clone());
        Ok(view)
    }

    async fn edit(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        content: String,
        updated_at: Timestamp,
    ) -> Result<MessageView, DomainError> {
        let mut channels = self.channels.write().await;
        let log = channels
            .get_mut(channel_id)
            .ok_or_else(|| DomainError::message_not_found(message_id))?;
        let message = log.live_mut(message_id)?;
        message.content = content;
        message.updated_at = updated_at;
        Ok(message.clone())
    }

    async fn delete(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        deleted_at: Timestamp,
    ) -> Result<Timestamp, DomainError> {
        let mut channels = self.channels.write().await;
        let log = channels
            .get_mut(channel_id)
            .ok_or_else(|| DomainError::message_not_found(message_id))?;
        let message = log.live_mut(message_id)?;
        message.deleted_at = Some(deleted_at);
        message.updated_at = deleted_at;
        Ok(deleted_at)
    }

    async fn toggle_reaction(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        user: &UserId,
        emoji: &str,
        at: Timestamp,
    ) -> Result<MessageView, DomainError> {
        let mut channels = self.channels.write().await;
        let log = channels
            .get_mut(channel_id)
            .ok_or_else(|| DomainError::message_not_found(message_id))?;
        let message = log.live_mut(message_id)?;
        message.toggle_reaction(user, emoji, at);
        Ok(message.clone())
    }
}

#[async_trait]
impl HistoryFetcher for InMemoryMessageStore {
    async fn fetch_page(
        &self,
        channel_id: &ChannelId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let channels = self.channels.read().await;
        let Some(log) = channels.get(channel_id) else {
            return Ok(HistoryPage::default());
        };
        let live: Vec<&MessageView> = log.live().collect();

        let limit = limit as usize;
        let skip = (page.max(1) as usize - 1).saturating_mul(limit);
        let end = live.len().saturating_sub(skip);
        let start = end.saturating_sub(limit);

        Ok(HistoryPage::new(
            live[start..end].iter().map(|m| (*m).clone()).collect(),
            start > 0,
        ))
    }

    async fn fetch_before(
        &self,
        channel_id: &ChannelId,
        before: &MessageId,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let channels = self.channels.read().await;
        let log = channels
            .get(channel_id)
            .ok_or(HistoryError::NotFound(*before))?;
        let anchor = log
            .messages
            .get(before)
            .map(MessageView::order_key)
            .ok_or(HistoryError::NotFound(*before))?;

        let older: Vec<&MessageView> = log.live().filter(|m| m.order_key() < anchor).collect();
        let start = older.len().saturating_sub(limit as usize);
        Ok(HistoryPage::new(
            older[start..].iter().map(|m| (*m).clone()).collect(),
            start > 0,
        ))
    }

    async fn fetch_after(
        &self,
        channel_id: &ChannelId,
        after: &MessageId,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let channels = self.channels.read().await;
        let log = channels
            .get(channel_id)
            .ok_or(HistoryError::NotFound(*after))?;
        let anchor = log
            .messages
            .get(after)
            .map(MessageView::order_key)
            .ok_or(HistoryError::NotFound(*after))?;

        let mut newer = log.live().filter(|m| m.order_key() > anchor);
        let messages: Vec<MessageView> = newer.by_ref().take(limit as usize).cloned().collect();
        let has_more = newer.next().is_some();
        Ok(HistoryPage::new(messages, has_more))
    }

    async fn fetch_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<MessageView>, HistoryError> {
        Ok(self
            .channels
            .read()
            .await
            .get(channel_id)
            .and_then(|log| log.messages.get(message_id))
            .filter(|m| !m.is_deleted())
            .cloned())
    }
}
