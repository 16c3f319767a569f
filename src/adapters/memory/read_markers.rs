//! In-memory read marker store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{ChannelId, DomainError, MessageId, Timestamp, UserId};
use crate::ports::{ReadMarker, ReadMarkerStore};

#[derive(Default)]
pub struct InMemoryReadMarkerStore {
    markers: RwLock<HashMap<(UserId, ChannelId), ReadMarker>>,
}

impl InMemoryReadMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadMarkerStore for InMemoryReadMarkerStore {
    async fn mark_read(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        message_id: Option<MessageId>,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        self.markers.write().await.insert(
            (user_id.clone(), *channel_id),
            ReadMarker {
                message_id,
                read_at: at,
            },
        );
        Ok(())
    }

    async fn last_read(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
    ) -> Result<Option<ReadMarker>, DomainError> {
        Ok(self
            .markers
            .read()
            .await
            .get(&(user_id.clone(), *channel_id))
            .cloned())
    }
}
