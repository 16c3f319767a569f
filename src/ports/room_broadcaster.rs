//! Fan-out port: deliver one event to every connection in a room.
//!
//! # Delivery Semantics
//!
//! - Order is preserved per connection for events broadcast by one caller.
//! - A failed delivery to any member fails the whole broadcast with
//!   [`BroadcastError::PartialDelivery`]; the report says who got it.
//! - Connections that were already closing are not counted as failures.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chat::RoomId;
use crate::domain::foundation::ConnectionId;
use crate::domain::protocol::ServerEvent;

/// Per-broadcast delivery accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Members the event was queued for.
    pub delivered: usize,
    /// Members whose queue stayed full past the retry window.
    pub failed: Vec<ConnectionId>,
    /// Members that were closing; cleanup handles them.
    pub closed: Vec<ConnectionId>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Members that were expected to receive the event.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Broadcast failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    /// Some members could not be reached.
    #[error("delivered to {} of {} members in {room}", .report.delivered, .report.attempted())]
    PartialDelivery { room: RoomId, report: DeliveryReport },

    /// Target connection is not registered.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// Target connection's queue is closed or full.
    #[error("connection {0} is not accepting events")]
    Unavailable(ConnectionId),
}

/// Delivers server events to rooms and single connections.
#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    /// Deliver `event` to every current member of `room`.
    async fn broadcast(
        &self,
        room: RoomId,
        event: ServerEvent,
    ) -> Result<DeliveryReport, BroadcastError>;

    /// Deliver `event` to one connection.
    async fn send_to(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;
}
