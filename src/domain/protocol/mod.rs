//! Real-time event vocabulary exchanged over a connection.
//!
//! Every frame is a JSON object `{ "event": <name>, "data": <payload> }`
//! with camelCase payload fields.
//!
//! ```text
//! Client ──▶ Server                    Server ──▶ Client
//! ─────────────────                    ─────────────────
//! workspace:join / leave               connected
//! channel:join / leave                 workspace:joined, channel:joined
//! message:send / edit / delete         message:new / updated / deleted
//! reaction:toggle                      reaction:updated
//! typing:start / stop                  typing:update
//! presence:heartbeat                   presence:user:online / offline
//! mark:read                            read:marked, error
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::chat::{
    Attachment, ChannelEvent, ChannelMutation, MessageView, NewMessage, Reactions, SequencedEvent,
};
use crate::domain::foundation::{
    AuthenticatedUser, ChannelId, ConnectionId, DomainError, MessageId, Timestamp, UserId,
    WorkspaceId,
};
use crate::domain::presence::{PresenceStatus, PresenceTransition};

// ============ Client → Server ============

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "workspace:join", rename_all = "camelCase")]
    WorkspaceJoin { workspace_id: WorkspaceId },

    #[serde(rename = "workspace:leave", rename_all = "camelCase")]
    WorkspaceLeave { workspace_id: WorkspaceId },

    #[serde(rename = "channel:join", rename_all = "camelCase")]
    ChannelJoin { channel_id: ChannelId },

    #[serde(rename = "channel:leave", rename_all = "camelCase")]
    ChannelLeave { channel_id: ChannelId },

    #[serde(rename = "message:send")]
    MessageSend(SendMessagePayload),

    #[serde(rename = "message:edit", rename_all = "camelCase")]
    MessageEdit {
        channel_id: ChannelId,
        id: MessageId,
        content: String,
    },

    #[serde(rename = "message:delete", rename_all = "camelCase")]
    MessageDelete { channel_id: ChannelId, id: MessageId },

    #[serde(rename = "reaction:toggle", rename_all = "camelCase")]
    ReactionToggle {
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: String,
    },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { channel_id: ChannelId },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { channel_id: ChannelId },

    #[serde(rename = "presence:heartbeat")]
    Heartbeat,

    #[serde(rename = "mark:read", rename_all = "camelCase")]
    MarkRead {
        channel_id: ChannelId,
        #[serde(default)]
        message_id: Option<MessageId>,
    },
}

/// Payload of `message:send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub mentions: Vec<UserId>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ClientEvent {
    /// Wire name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::WorkspaceJoin { .. } => "workspace:join",
            ClientEvent::WorkspaceLeave { .. } => "workspace:leave",
            ClientEvent::ChannelJoin { .. } => "channel:join",
            ClientEvent::ChannelLeave { .. } => "channel:leave",
            ClientEvent::MessageSend(_) => "message:send",
            ClientEvent::MessageEdit { .. } => "message:edit",
            ClientEvent::MessageDelete { .. } => "message:delete",
            ClientEvent::ReactionToggle { .. } => "reaction:toggle",
            ClientEvent::TypingStart { .. } => "typing:start",
            ClientEvent::TypingStop { .. } => "typing:stop",
            ClientEvent::Heartbeat => "presence:heartbeat",
            ClientEvent::MarkRead { .. } => "mark:read",
        }
    }

    /// The channel mutation this event requests, if any.
    pub fn into_mutation(self) -> Option<(ChannelId, ChannelMutation)> {
        match self {
            ClientEvent::MessageSend(payload) => Some((
                payload.channel_id,
                ChannelMutation::Create(NewMessage {
                    content: payload.content,
                    reply_to_id: payload.reply_to_id,
                    mentions: payload.mentions,
                    attachments: payload.attachments,
                }),
            )),
            ClientEvent::MessageEdit {
                channel_id,
                id,
                content,
            } => Some((
                channel_id,
                ChannelMutation::Edit {
                    message_id: id,
                    content,
                },
            )),
            ClientEvent::MessageDelete { channel_id, id } => {
                Some((channel_id, ChannelMutation::Delete { message_id: id }))
            }
            ClientEvent::ReactionToggle {
                channel_id,
                message_id,
                emoji,
            } => Some((
                channel_id,
                ChannelMutation::ToggleReaction { message_id, emoji },
            )),
            _ => None,
        }
    }
}

// ============ Server → Client ============

/// Events the server pushes to connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        connection_id: ConnectionId,
        user: AuthenticatedUser,
    },

    #[serde(rename = "workspace:joined", rename_all = "camelCase")]
    WorkspaceJoined {
        workspace_id: WorkspaceId,
        online_user_ids: Vec<UserId>,
    },

    #[serde(rename = "channel:joined", rename_all = "camelCase")]
    ChannelJoined {
        channel_id: ChannelId,
        online_user_ids: Vec<UserId>,
        typing_user_ids: Vec<UserId>,
    },

    #[serde(rename = "presence:user:online", rename_all = "camelCase")]
    UserOnline {
        user_id: UserId,
        workspace_id: WorkspaceId,
    },

    #[serde(rename = "presence:user:offline", rename_all = "camelCase")]
    UserOffline {
        user_id: UserId,
        workspace_id: WorkspaceId,
    },

    #[serde(rename = "message:new")]
    MessageNew(SequencedMessage),

    #[serde(rename = "message:updated")]
    MessageUpdated(SequencedMessage),

    #[serde(rename = "message:deleted", rename_all = "camelCase")]
    MessageDeleted {
        channel_id: ChannelId,
        sequence: u64,
        actor_id: UserId,
        message_id: MessageId,
        deleted_at: Timestamp,
    },

    #[serde(rename = "reaction:updated", rename_all = "camelCase")]
    ReactionUpdated {
        channel_id: ChannelId,
        sequence: u64,
        actor_id: UserId,
        message_id: MessageId,
        reactions: Reactions,
        updated_at: Timestamp,
    },

    #[serde(rename = "typing:update", rename_all = "camelCase")]
    TypingUpdate {
        channel_id: ChannelId,
        user_ids: Vec<UserId>,
    },

    #[serde(rename = "read:marked", rename_all = "camelCase")]
    ReadMarked {
        channel_id: ChannelId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
    },

    #[serde(rename = "error")]
    Error(ErrorPayload),
}

/// A created or edited message together with its channel position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedMessage {
    pub sequence: u64,
    pub actor_id: UserId,
    pub message: MessageView,
}

/// Error reported to the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

impl ServerEvent {
    /// Error event for a failed client request.
    pub fn error(err: &DomainError, request: Option<&str>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code: err.code.to_string(),
            message: err.message.clone(),
            request: request.map(str::to_string),
        })
    }

    /// Recovers the channel event carried by a message/reaction frame.
    ///
    /// Clients feed the result into their reconciliation window.
    pub fn into_sequenced(self) -> Option<SequencedEvent> {
        match self {
            ServerEvent::MessageNew(m) => Some(SequencedEvent {
                channel_id: m.message.channel_id,
                sequence: m.sequence,
                actor: m.actor_id,
                occurred_at: m.message.created_at,
                event: ChannelEvent::MessageNew(m.message),
            }),
            ServerEvent::MessageUpdated(m) => Some(SequencedEvent {
                channel_id: m.message.channel_id,
                sequence: m.sequence,
                actor: m.actor_id,
                occurred_at: m.message.updated_at,
                event: ChannelEvent::MessageUpdated(m.message),
            }),
            ServerEvent::MessageDeleted {
                channel_id,
                sequence,
                actor_id,
                message_id,
                deleted_at,
            } => Some(SequencedEvent {
                channel_id,
                sequence,
                actor: actor_id,
                occurred_at: deleted_at,
                event: ChannelEvent::MessageDeleted {
                    message_id,
                    deleted_at,
                },
            }),
            ServerEvent::ReactionUpdated {
                channel_id,
                sequence,
                actor_id,
                message_id,
                reactions,
                updated_at,
            } => Some(SequencedEvent {
                channel_id,
                sequence,
                actor: actor_id,
                occurred_at: updated_at,
                event: ChannelEvent::ReactionUpdated {
                    message_id,
                    reactions,
                    updated_at,
                },
            }),
            _ => None,
        }
    }
}

impl From<&SequencedEvent> for ServerEvent {
    fn from(event: &SequencedEvent) -> Self {
        match &event.event {
            ChannelEvent::MessageNew(view) => ServerEvent::MessageNew(SequencedMessage {
                sequence: event.sequence,
                actor_id: event.actor.clone(),
                message: view.clone(),
            }),
            ChannelEvent::MessageUpdated(view) => ServerEvent::MessageUpdated(SequencedMessage {
                sequence: event.sequence,
                actor_id: event.actor.clone(),
                message: view.clone(),
            }),
            ChannelEvent::MessageDeleted {
                message_id,
                deleted_at,
            } => ServerEvent::MessageDeleted {
                channel_id: event.channel_id,
                sequence: event.sequence,
                actor_id: event.actor.clone(),
                message_id: *message_id,
                deleted_at: *deleted_at,
            },
            ChannelEvent::ReactionUpdated {
                message_id,
                reactions,
                updated_at,
            } => ServerEvent::ReactionUpdated {
                channel_id: event.channel_id,
                sequence: event.sequence,
                actor_id: event.actor.clone(),
                message_id: *message_id,
                reactions: reactions.clone(),
                updated_at: *updated_at,
            },
        }
    }
}

impl From<&PresenceTransition> for ServerEvent {
    fn from(t: &PresenceTransition) -> Self {
        match t.status {
            PresenceStatus::Online => ServerEvent::UserOnline {
                user_id: t.user_id.clone(),
                workspace_id: t.workspace_id,
            },
            PresenceStatus::Offline => ServerEvent::UserOffline {
                user_id: t.user_id.clone(),
                workspace_id: t.workspace_id,
            },
        }
    }
}
