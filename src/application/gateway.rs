//! Chat gateway: dispatches client events to the engine components.
//!
//! ```text
//!              ┌──────────────────────── ChatGateway ─────────────────────────┐
//! ClientEvent ─┤ rooms ─▶ ConnectionRegistry      presence ─▶ PresenceTracker │
//!              │ typing ─▶ TypingAggregator       mutations ─▶ ChannelSequencer│
//!              │ mark:read ─▶ ReadMarkerStore                                  │
//!              └───────────────────────────── RoomBroadcaster ◀────────────────┘
//! ```
//!
//! Errors are reported to the originating connection only, as an `error`
//! event; they never reach other room members.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::chat::{ChannelMutation, MutationRequest, RoomId};
use crate::domain::foundation::{
    AuthError, ChannelId, ConnectionId, DomainError, ErrorCode, Timestamp, UserId, WorkspaceId,
};
use crate::domain::presence::PresenceTransition;
use crate::domain::protocol::{ClientEvent, ServerEvent};
use crate::ports::{AccessChecker, Capability, ReadMarkerStore, RoomBroadcaster};

use super::presence::PresenceTracker;
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::sequencer::ChannelSequencer;
use super::typing::{TypingAggregator, TypingUpdate};

/// Gateway tunables.
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_message_length: usize,
}

/// Entry point for every connection-level operation.
pub struct ChatGateway {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    typing: Arc<TypingAggregator>,
    sequencer: ChannelSequencer,
    broadcaster: Arc<dyn RoomBroadcaster>,
    access: Arc<dyn AccessChecker>,
    read_markers: Arc<dyn ReadMarkerStore>,
    config: GatewayConfig,
}

impl ChatGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceTracker>,
        typing: Arc<TypingAggregator>,
        sequencer: ChannelSequencer,
        broadcaster: Arc<dyn RoomBroadcaster>,
        access: Arc<dyn AccessChecker>,
        read_markers: Arc<dyn ReadMarkerStore>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            presence,
            typing,
            sequencer,
            broadcaster,
            access,
            read_markers,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn sequencer(&self) -> &ChannelSequencer {
        &self.sequencer
    }

    /// Authenticate and register a connection, then greet it.
    pub async fn connect(&self, token: &str) -> Result<ConnectionHandle, AuthError> {
        let handle = self.registry.authenticate(token).await?;
        let greeting = ServerEvent::Connected {
            connection_id: handle.id,
            user: handle.user.clone(),
        };
        self.reply(handle.id, greeting).await;
        tracing::info!(connection_id = %handle.id, user_id = %handle.user.id, "client connected");
        Ok(handle)
    }

    /// Handle one client event. Failures go back to the sender as `error`.
    pub async fn handle(&self, connection_id: ConnectionId, event: ClientEvent) {
        let name = event.name();
        if let Err(err) = self.dispatch(connection_id, event).await {
            tracing::debug!(
                connection_id = %connection_id,
                event = name,
                code = %err.code,
                "client request failed"
            );
            self.reply(connection_id, ServerEvent::error(&err, Some(name)))
                .await;
        }
    }

    /// Report a malformed frame to its sender.
    pub async fn reject_frame(&self, connection_id: ConnectionId, err: DomainError) {
        self.reply(connection_id, ServerEvent::error(&err, None)).await;
    }

    /// Tear down a connection. Safe to call from every close path.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(connection) = self.registry.close(connection_id).await else {
            return;
        };
        let now = Timestamp::now();
        let user = connection.user_id().clone();

        for t in self.presence.disconnect(connection_id, now).await {
            self.announce_presence(&t).await;
        }
        for channel in &connection.channels {
            let room = RoomId::Channel(*channel);
            if self.registry.user_has_other_member(&user, &room, connection_id).await {
                continue;
            }
            if let Some(update) = self.typing.stop(*channel, &user, now).await {
                self.announce_typing(update).await;
            }
        }
        tracing::info!(connection_id = %connection_id, user_id = %user, "client disconnected");
    }

    /// Expire heartbeats and typers as of `now`, broadcasting the changes.
    pub async fn sweep(&self, now: Timestamp) {
        for t in self.presence.sweep(now).await {
            self.announce_presence(&t).await;
        }
        for update in self.typing.sweep(now).await {
            self.announce_typing(update).await;
        }
    }

    /// Runs [`ChatGateway::sweep`] every sweep interval until shutdown.
    pub async fn run_maintenance(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::debug!("presence/typing maintenance stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep(Timestamp::now()).await;
                }
            }
        }
    }

    async fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> Result<(), DomainError> {
        let connection = self
            .registry
            .connection(connection_id)
            .await
            .ok_or_else(|| DomainError::new(ErrorCode::Unauthorized, "Connection is not registered"))?;
        let user = connection.user.id.clone();
        let now = Timestamp::now();

        match event {
            ClientEvent::WorkspaceJoin { workspace_id } => {
                self.join_workspace(connection_id, &user, workspace_id, now).await
            }
            ClientEvent::WorkspaceLeave { workspace_id } => {
                let room = RoomId::Workspace(workspace_id);
                self.registry.leave(connection_id, &room).await;
                if let Some(t) = self.presence.leave(connection_id, workspace_id, now).await {
                    self.announce_presence(&t).await;
                }
                Ok(())
            }
            ClientEvent::ChannelJoin { channel_id } => {
                self.join_channel(connection_id, &user, channel_id, now).await
            }
            ClientEvent::ChannelLeave { channel_id } => {
                let room = RoomId::Channel(channel_id);
                if self.registry.leave(connection_id, &room).await
                    && !self.registry.user_has_other_member(&user, &room, connection_id).await
                {
                    if let Some(update) = self.typing.stop(channel_id, &user, now).await {
                        self.announce_typing(update).await;
                    }
                }
                Ok(())
            }
            ClientEvent::TypingStart { channel_id } => {
                self.require_joined(connection_id, channel_id).await?;
                if let Some(update) = self.typing.start(channel_id, &user, now).await {
                    self.announce_typing(update).await;
                }
                Ok(())
            }
            ClientEvent::TypingStop { channel_id } => {
                self.require_joined(connection_id, channel_id).await?;
                if let Some(update) = self.typing.stop(channel_id, &user, now).await {
                    self.announce_typing(update).await;
                }
                Ok(())
            }
            ClientEvent::Heartbeat => {
                self.registry.touch(connection_id, now).await;
                for t in self.presence.heartbeat(connection_id, now).await {
                    self.announce_presence(&t).await;
                }
                Ok(())
            }
            ClientEvent::MarkRead {
                channel_id,
                message_id,
            } => {
                self.require_joined(connection_id, channel_id).await?;
                self.read_markers
                    .mark_read(&user, &channel_id, message_id, now)
                    .await?;
                self.reply(
                    connection_id,
                    ServerEvent::ReadMarked {
                        channel_id,
                        message_id,
                    },
                )
                .await;
                Ok(())
            }
            mutation => {
                let Some((channel_id, mutation)) = mutation.into_mutation() else {
                    return Err(DomainError::internal("Unhandled client event"));
                };
                self.require_joined(connection_id, channel_id).await?;
                mutation.validate(self.config.max_message_length)?;

                let is_create = matches!(mutation, ChannelMutation::Create(_));
                self.sequencer
                    .publish(MutationRequest::new(channel_id, user.clone(), mutation))
                    .await?;

                if is_create {
                    if let Some(update) = self.typing.stop(channel_id, &user, Timestamp::now()).await {
                        self.announce_typing(update).await;
                    }
                }
                Ok(())
            }
        }
    }

    async fn join_workspace(
        &self,
        connection_id: ConnectionId,
        user: &UserId,
        workspace_id: WorkspaceId,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.authorize(user, Capability::JoinWorkspace(workspace_id)).await?;

        self.registry
            .join(connection_id, RoomId::Workspace(workspace_id))
            .await?;
        let join = self.presence.join(connection_id, user, workspace_id, now).await;
        if let Some(t) = &join.transition {
            self.announce_presence(t).await;
        }

        self.reply(
            connection_id,
            ServerEvent::WorkspaceJoined {
                workspace_id,
                online_user_ids: join.online_user_ids,
            },
        )
        .await;
        Ok(())
    }

    async fn join_channel(
        &self,
        connection_id: ConnectionId,
        user: &UserId,
        channel_id: ChannelId,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.authorize(user, Capability::JoinChannel(channel_id)).await?;

        let room = RoomId::Channel(channel_id);
        self.registry.join(connection_id, room).await?;

        let online_user_ids = self
            .registry
            .live_users(&room, &now, self.config.heartbeat_timeout)
            .await;
        let typing_user_ids = self.typing.current_typers(channel_id, now).await;
        self.reply(
            connection_id,
            ServerEvent::ChannelJoined {
                channel_id,
                online_user_ids,
                typing_user_ids,
            },
        )
        .await;
        Ok(())
    }

    async fn require_joined(&self, connection_id: ConnectionId, channel_id: ChannelId) -> Result<(), DomainError> {
        if self
            .registry
            .is_member(connection_id, &RoomId::Channel(channel_id))
            .await
        {
            Ok(())
        } else {
            Err(DomainError::new(ErrorCode::NotJoined, "Join the channel first")
                .with_detail("channel_id", channel_id.to_string()))
        }
    }

    async fn authorize(&self, user: &UserId, capability: Capability) -> Result<(), DomainError> {
        match self.access.check(user, &capability).await {
            Ok(result) => result.into_result(),
            Err(e) => {
                tracing::warn!(user_id = %user, capability = capability.name(), error = %e, "access check failed, denying");
                Err(DomainError::forbidden("Access check unavailable"))
            }
        }
    }

    async fn announce_presence(&self, transition: &PresenceTransition) {
        let room = RoomId::Workspace(transition.workspace_id);
        if let Err(e) = self.broadcaster.broadcast(room, ServerEvent::from(transition)).await {
            tracing::warn!(room = %room, error = %e, "presence update not fully delivered");
        }
    }

    async fn announce_typing(&self, update: TypingUpdate) {
        let room = RoomId::Channel(update.channel_id);
        let event = ServerEvent::TypingUpdate {
            channel_id: update.channel_id,
            user_ids: update.user_ids,
        };
        if let Err(e) = self.broadcaster.broadcast(room, event).await {
            tracing::warn!(room = %room, error = %e, "typing update not fully delivered");
        }
    }

    async fn reply(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Err(e) = self.broadcaster.send_to(connection_id, event).await {
            tracing::debug!(connection_id = %connection_id, error = %e, "reply dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::memory::{InMemoryMessageStore, InMemoryReadMarkerStore, StaticAccessChecker};
    use crate::application::presence::PresencePolicy;
    use crate::application::router::BroadcastRouter;
    use crate::application::sequencer::SequencerConfig;
    use crate::domain::foundation::AuthenticatedUser;
    use crate::domain::protocol::SendMessagePayload;

    fn gateway_with(access: StaticAccessChecker) -> ChatGateway {
        let validator = MockSessionValidator::new()
            .with_user("alice-token", user("alice"))
            .with_user("bob-token", user("bob"));
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(validator), 64));
        let broadcaster: Arc<dyn RoomBroadcaster> =
            Arc::new(BroadcastRouter::new(registry.clone(), Duration::from_millis(50)));
        let access: Arc<dyn AccessChecker> = Arc::new(access);
        let sequencer = ChannelSequencer::new(
            Arc::new(InMemoryMessageStore::new()),
            access.clone(),
            broadcaster.clone(),
            SequencerConfig::default(),
        );
        ChatGateway::new(
            registry,
            Arc::new(PresenceTracker::new(PresencePolicy {
                heartbeat_timeout: Duration::from_secs(45),
                grace: Duration::from_secs(60),
            })),
            Arc::new(TypingAggregator::new(Duration::from_millis(5000))),
            sequencer,
            broadcaster,
            access,
            Arc::new(InMemoryReadMarkerStore::new()),
            GatewayConfig {
                heartbeat_timeout: Duration::from_secs(45),
                sweep_interval: Duration::from_millis(250),
                max_message_length: 4000,
            },
        )
    }

    fn user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new(id).unwrap(), format!("{}@example.com", id), None)
    }

    fn drain(handle: &mut ConnectionHandle) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = handle.outbound.try_recv() {
            events.push(event);
        }
        events
    }

    fn send(channel_id: ChannelId, content: &str) -> ClientEvent {
        ClientEvent::MessageSend(SendMessagePayload {
            channel_id,
            content: content.into(),
            reply_to_id: None,
            mentions: vec![],
            attachments: vec![],
        })
    }

    #[tokio::test]
    async fn connect_greets_with_user() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let mut alice = gateway.connect("alice-token").await.unwrap();

        let events = drain(&mut alice);
        assert!(matches!(&events[..], [ServerEvent::Connected { user, .. }] if user.id.as_str() == "alice"));
    }

    #[tokio::test]
    async fn send_without_joining_is_rejected_to_sender_only() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let mut alice = gateway.connect("alice-token").await.unwrap();
        drain(&mut alice);

        gateway.handle(alice.id, send(ChannelId::new(), "hi")).await;

        let events = drain(&mut alice);
        assert!(matches!(&events[..], [ServerEvent::Error(e)] if e.code == "NOT_JOINED"));
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_sequencer() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let mut alice = gateway.connect("alice-token").await.unwrap();
        let channel = ChannelId::new();
        gateway.handle(alice.id, ClientEvent::ChannelJoin { channel_id: channel }).await;
        drain(&mut alice);

        gateway.handle(alice.id, send(channel, "   ")).await;

        let events = drain(&mut alice);
        assert!(matches!(&events[..], [ServerEvent::Error(e)] if e.code == "EMPTY_FIELD"));
        assert_eq!(gateway.sequencer().last_sequence(channel).await, 0);
    }

    #[tokio::test]
    async fn denied_channel_join_reports_forbidden() {
        let gateway = gateway_with(StaticAccessChecker::allow_all().deny_user(UserId::new("alice").unwrap()));
        let mut alice = gateway.connect("alice-token").await.unwrap();
        drain(&mut alice);

        gateway
            .handle(alice.id, ClientEvent::ChannelJoin { channel_id: ChannelId::new() })
            .await;

        let events = drain(&mut alice);
        assert!(matches!(&events[..], [ServerEvent::Error(e)] if e.code == "FORBIDDEN"));
    }

    #[tokio::test]
    async fn typing_refresh_is_silent_and_send_clears_typing() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let mut alice = gateway.connect("alice-token").await.unwrap();
        let mut bob = gateway.connect("bob-token").await.unwrap();
        let channel = ChannelId::new();
        for handle in [&alice, &bob] {
            gateway.handle(handle.id, ClientEvent::ChannelJoin { channel_id: channel }).await;
        }
        drain(&mut alice);
        drain(&mut bob);

        gateway.handle(alice.id, ClientEvent::TypingStart { channel_id: channel }).await;
        gateway.handle(alice.id, ClientEvent::TypingStart { channel_id: channel }).await;
        let typing: Vec<_> = drain(&mut bob)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::TypingUpdate { .. }))
            .collect();
        assert_eq!(typing.len(), 1);

        gateway.handle(alice.id, send(channel, "done typing")).await;
        let events = drain(&mut bob);
        assert!(matches!(events[0], ServerEvent::MessageNew(_)));
        assert!(matches!(&events[1], ServerEvent::TypingUpdate { user_ids, .. } if user_ids.is_empty()));
    }

    #[tokio::test]
    async fn disconnect_runs_cleanup_once() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let alice = gateway.connect("alice-token").await.unwrap();
        let mut bob = gateway.connect("bob-token").await.unwrap();
        let workspace = WorkspaceId::new();
        for handle in [&alice, &bob] {
            gateway.handle(handle.id, ClientEvent::WorkspaceJoin { workspace_id: workspace }).await;
        }
        drain(&mut bob);

        gateway.disconnect(alice.id).await;
        gateway.disconnect(alice.id).await;

        let offline: Vec<_> = drain(&mut bob)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::UserOffline { .. }))
            .collect();
        assert_eq!(offline.len(), 1);
    }

    #[tokio::test]
    async fn interrupted_workspace_join_cannot_take_other_tab_offline() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let tab1 = gateway.connect("alice-token").await.unwrap();
        let tab2 = gateway.connect("alice-token").await.unwrap();
        let mut bob = gateway.connect("bob-token").await.unwrap();
        let workspace = WorkspaceId::new();
        for handle in [&tab1, &bob] {
            gateway.handle(handle.id, ClientEvent::WorkspaceJoin { workspace_id: workspace }).await;
        }

        // tab2 is in the room but its join was cut short before presence attached.
        gateway
            .registry()
            .join(tab2.id, RoomId::Workspace(workspace))
            .await
            .unwrap();
        drain(&mut bob);

        gateway.disconnect(tab2.id).await;
        gateway.handle(tab1.id, ClientEvent::Heartbeat).await;

        let presence: Vec<_> = drain(&mut bob)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::UserOnline { .. } | ServerEvent::UserOffline { .. }))
            .collect();
        assert!(presence.is_empty(), "unexpected presence events: {:?}", presence);
    }

    #[tokio::test]
    async fn mark_read_acks_sender_without_broadcast() {
        let gateway = gateway_with(StaticAccessChecker::allow_all());
        let mut alice = gateway.connect("alice-token").await.unwrap();
        let mut bob = gateway.connect("bob-token").await.unwrap();
        let channel = ChannelId::new();
        for handle in [&alice, &bob] {
            gateway.handle(handle.id, ClientEvent::ChannelJoin { channel_id: channel }).await;
        }
        drain(&mut alice);
        drain(&mut bob);

        gateway
            .handle(alice.id, ClientEvent::MarkRead { channel_id: channel, message_id: None })
            .await;

        assert!(matches!(&drain(&mut alice)[..], [ServerEvent::ReadMarked { .. }]));
        assert!(drain(&mut bob).is_empty());
    }
}
