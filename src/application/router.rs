//! Room fan-out over the connection registry.
//!
//! Each member's queue is tried without waiting first. Members whose queue is
//! full get one bounded retry; if that also fails the broadcast is reported
//! as a partial delivery and the slow connection is evicted so it resyncs on
//! reconnect instead of silently missing events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use crate::domain::chat::RoomId;
use crate::domain::foundation::ConnectionId;
use crate::domain::protocol::ServerEvent;
use crate::ports::{BroadcastError, DeliveryReport, RoomBroadcaster};

use super::registry::ConnectionRegistry;

/// Delivers events to room members through their outbound queues.
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    retry_window: Duration,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, retry_window: Duration) -> Self {
        Self {
            registry,
            retry_window,
        }
    }
}

#[async_trait]
impl RoomBroadcaster for BroadcastRouter {
    async fn broadcast(
        &self,
        room: RoomId,
        event: ServerEvent,
    ) -> Result<DeliveryReport, BroadcastError> {
        let targets = self.registry.senders(&room).await;
        let mut report = DeliveryReport::default();
        let mut stalled = Vec::new();

        for (connection_id, sender) in targets {
            let Some(sender) = sender else {
                report.closed.push(connection_id);
                continue;
            };
            match sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(event)) => stalled.push((connection_id, sender, event)),
                Err(TrySendError::Closed(_)) => report.closed.push(connection_id),
            }
        }

        for (connection_id, sender, event) in stalled {
            match sender.send_timeout(event, self.retry_window).await {
                Ok(()) => report.delivered += 1,
                Err(SendTimeoutError::Timeout(_)) => report.failed.push(connection_id),
                Err(SendTimeoutError::Closed(_)) => report.closed.push(connection_id),
            }
        }

        if !report.closed.is_empty() {
            tracing::debug!(room = %room, closed = report.closed.len(), "skipped closing connections");
        }

        if report.is_complete() {
            return Ok(report);
        }

        for connection_id in &report.failed {
            if self.registry.evict(*connection_id).await {
                tracing::warn!(room = %room, connection_id = %connection_id, "evicted slow consumer");
            }
        }
        tracing::error!(
            room = %room,
            delivered = report.delivered,
            failed = report.failed.len(),
            "partial broadcast delivery"
        );
        Err(BroadcastError::PartialDelivery { room, report })
    }

    async fn send_to(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        let Some(sender) = self.registry.sender(connection_id).await else {
            let registered = self.registry.connection(connection_id).await.is_some();
            return Err(if registered {
                BroadcastError::Unavailable(connection_id)
            } else {
                BroadcastError::UnknownConnection(connection_id)
            });
        };

        match sender.send_timeout(event, self.retry_window).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                self.registry.evict(connection_id).await;
                tracing::warn!(connection_id = %connection_id, "evicted slow consumer");
                Err(BroadcastError::Unavailable(connection_id))
            }
            Err(SendTimeoutError::Closed(_)) => Err(BroadcastError::Unavailable(connection_id)),
        }
    }
}
