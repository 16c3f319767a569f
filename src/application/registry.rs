//! Connection registry: authenticated connections and their room memberships.
//!
//! # Architecture
//!
//! ```text
//! connections (arena)                         rooms (copy-on-write snapshots)
//! ┌──────────────┬─────────────────────┐      ┌──────────────────┬──────────────────┐
//! │ ConnectionId │ user, rooms, queue  │      │ channel:c1       │ Arc{conn-a, b}   │
//! │ conn-a       │ alice, {c1, w1}, tx │◀────▶│ workspace:w1     │ Arc{conn-a, c}   │
//! │ conn-b       │ bob,   {c1},     tx │      └──────────────────┴──────────────────┘
//! └──────────────┴─────────────────────┘
//! ```
//!
//! Membership lives on both sides so closing a connection removes it from
//! every room in one pass, and the router can snapshot a room's members
//! without holding the lock while it delivers.
//!
//! Lock order is always `connections` then `rooms`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use crate::domain::chat::RoomId;
use crate::domain::foundation::{
    AuthError, AuthenticatedUser, ChannelId, ConnectionId, DomainError, ErrorCode, Timestamp,
    UserId, WorkspaceId,
};
use crate::domain::protocol::ServerEvent;
use crate::ports::SessionValidator;

/// Snapshot of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub user: AuthenticatedUser,
    pub channels: HashSet<ChannelId>,
    pub workspaces: HashSet<WorkspaceId>,
    pub connected_at: Timestamp,
    pub last_heartbeat_at: Timestamp,
}

impl Connection {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// Returned to the transport when a connection is registered.
///
/// The transport forwards everything from `outbound` to the socket. The
/// receiver ends when the connection is closed or evicted.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: AuthenticatedUser,
    pub outbound: mpsc::Receiver<ServerEvent>,
}

struct ConnectionRecord {
    user: AuthenticatedUser,
    channels: HashSet<ChannelId>,
    workspaces: HashSet<WorkspaceId>,
    connected_at: Timestamp,
    last_heartbeat_at: Timestamp,
    outbound: Option<mpsc::Sender<ServerEvent>>,
}

impl ConnectionRecord {
    fn snapshot(&self, id: ConnectionId) -> Connection {
        Connection {
            id,
            user: self.user.clone(),
            channels: self.channels.clone(),
            workspaces: self.workspaces.clone(),
            connected_at: self.connected_at,
            last_heartbeat_at: self.last_heartbeat_at,
        }
    }

    fn is_member(&self, room: &RoomId) -> bool {
        match room {
            RoomId::Channel(id) => self.channels.contains(id),
            RoomId::Workspace(id) => self.workspaces.contains(id),
        }
    }

    fn add(&mut self, room: RoomId) -> bool {
        match room {
            RoomId::Channel(id) => self.channels.insert(id),
            RoomId::Workspace(id) => self.workspaces.insert(id),
        }
    }

    fn remove(&mut self, room: &RoomId) -> bool {
        match room {
            RoomId::Channel(id) => self.channels.remove(id),
            RoomId::Workspace(id) => self.workspaces.remove(id),
        }
    }

    fn rooms(&self) -> Vec<RoomId> {
        self.channels
            .iter()
            .copied()
            .map(RoomId::Channel)
            .chain(self.workspaces.iter().copied().map(RoomId::Workspace))
            .collect()
    }
}

/// Tracks authenticated connections and room membership.
pub struct ConnectionRegistry {
    validator: Arc<dyn SessionValidator>,
    connections: RwLock<HashMap<ConnectionId, ConnectionRecord>>,
    rooms: RwLock<HashMap<RoomId, Arc<HashSet<ConnectionId>>>>,
    outbound_capacity: usize,
}

impl ConnectionRegistry {
    /// Create a registry.
    ///
    /// # Arguments
    ///
    /// * `validator` - Validates tokens presented at connect time
    /// * `outbound_capacity` - Per-connection queue size. A connection whose
    ///   queue stays full past the router's retry window is evicted.
    pub fn new(validator: Arc<dyn SessionValidator>, outbound_capacity: usize) -> Self {
        Self {
            validator,
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Validate `token` and register a connection for its user.
    ///
    /// Nothing is registered when validation fails.
    pub async fn authenticate(&self, token: &str) -> Result<ConnectionHandle, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        let user = self.validator.validate(token).await?;
        Ok(self.register(user).await)
    }

    /// Register an already authenticated user.
    pub async fn register(&self, user: AuthenticatedUser) -> ConnectionHandle {
        let id = ConnectionId::new();
        let now = Timestamp::now();
        let (tx, rx) = mpsc::channel(self.outbound_capacity);

        self.connections.write().await.insert(
            id,
            ConnectionRecord {
                user: user.clone(),
                channels: HashSet::new(),
                workspaces: HashSet::new(),
                connected_at: now,
                last_heartbeat_at: now,
                outbound: Some(tx),
            },
        );

        tracing::debug!(connection_id = %id, user_id = %user.id, "connection registered");

        ConnectionHandle {
            id,
            user,
            outbound: rx,
        }
    }

    /// Add a connection to a room.
    ///
    /// Returns `Ok(false)` if it was already a member.
    pub async fn join(&self, connection_id: ConnectionId, room: RoomId) -> Result<bool, DomainError> {
        let mut connections = self.connections.write().await;
        let record = connections
            .get_mut(&connection_id)
            .ok_or_else(|| unknown_connection(connection_id))?;

        if !record.add(room) {
            return Ok(false);
        }

        let mut rooms = self.rooms.write().await;
        Arc::make_mut(rooms.entry(room).or_default()).insert(connection_id);
        Ok(true)
    }

    /// Remove a connection from a room. Returns true if it was a member.
    pub async fn leave(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        let mut connections = self.connections.write().await;
        let Some(record) = connections.get_mut(&connection_id) else {
            return false;
        };
        if !record.remove(room) {
            return false;
        }

        let mut rooms = self.rooms.write().await;
        remove_member(&mut rooms, room, &connection_id);
        true
    }

    /// Remove a connection from the registry and from every room.
    ///
    /// Returns the final snapshot the first time only, so callers run
    /// disconnect cleanup exactly once no matter how many paths reach here.
    pub async fn close(&self, connection_id: ConnectionId) -> Option<Connection> {
        let mut connections = self.connections.write().await;
        let record = connections.remove(&connection_id)?;

        let mut rooms = self.rooms.write().await;
        for room in record.rooms() {
            remove_member(&mut rooms, &room, &connection_id);
        }

        tracing::debug!(connection_id = %connection_id, user_id = %record.user.id, "connection closed");
        Some(record.snapshot(connection_id))
    }

    /// Stop delivering to a connection.
    ///
    /// Dropping the queue's sender ends the transport's forward loop, which
    /// then closes the connection through the normal path.
    pub async fn evict(&self, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&connection_id) {
            Some(record) => record.outbound.take().is_some(),
            None => false,
        }
    }

    /// Record a heartbeat. Returns false for unknown connections.
    pub async fn touch(&self, connection_id: ConnectionId, now: Timestamp) -> bool {
        let mut connections = self.connections.write().await;
        let Some(record) = connections.get_mut(&connection_id) else {
            return false;
        };
        if now.is_after(&record.last_heartbeat_at) {
            record.last_heartbeat_at = now;
        }
        true
    }

    /// Current member set of a room; empty if the room does not exist.
    pub async fn members(&self, room: &RoomId) -> Arc<HashSet<ConnectionId>> {
        self.rooms
            .read()
            .await
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    /// Delivery queues of every member of `room`.
    pub async fn senders(&self, room: &RoomId) -> Vec<(ConnectionId, Option<mpsc::Sender<ServerEvent>>)> {
        let members = self.members(room).await;
        let connections = self.connections.read().await;
        members
            .iter()
            .map(|id| {
                let sender = connections.get(id).and_then(|r| r.outbound.clone());
                (*id, sender)
            })
            .collect()
    }

    /// Delivery queue of one connection.
    pub async fn sender(&self, connection_id: ConnectionId) -> Option<mpsc::Sender<ServerEvent>> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .and_then(|r| r.outbound.clone())
    }

    /// Snapshot of one connection.
    pub async fn connection(&self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|r| r.snapshot(connection_id))
    }

    /// Whether the connection is in `room`.
    pub async fn is_member(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map_or(false, |r| r.is_member(room))
    }

    /// Distinct users in `room` with a heartbeat within `timeout`, sorted.
    pub async fn live_users(&self, room: &RoomId, now: &Timestamp, timeout: Duration) -> Vec<UserId> {
        let members = self.members(room).await;
        let connections = self.connections.read().await;
        let mut users: Vec<UserId> = members
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|r| !r.last_heartbeat_at.is_older_than(timeout, now))
            .map(|r| r.user.id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        users.sort();
        users
    }

    /// Whether `user` has any other connection in `room`.
    pub async fn user_has_other_member(
        &self,
        user: &UserId,
        room: &RoomId,
        except: ConnectionId,
    ) -> bool {
        let members = self.members(room).await;
        let connections = self.connections.read().await;
        members
            .iter()
            .filter(|id| **id != except)
            .filter_map(|id| connections.get(id))
            .any(|r| &r.user.id == user)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

fn remove_member(
    rooms: &mut HashMap<RoomId, Arc<HashSet<ConnectionId>>>,
    room: &RoomId,
    connection_id: &ConnectionId,
) {
    let now_empty = match rooms.get_mut(room) {
        Some(members) => {
            Arc::make_mut(members).remove(connection_id);
            members.is_empty()
        }
        None => false,
    };
    if now_empty {
        rooms.remove(room);
    }
}

fn unknown_connection(connection_id: ConnectionId) -> DomainError {
    DomainError::new(ErrorCode::InternalError, "Connection is not registered")
        .with_detail("connection_id", connection_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockSessionValidator;

    fn user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new(id).unwrap(), format!("{}@example.com", id), None)
    }

    fn registry() -> ConnectionRegistry {
        let validator = MockSessionValidator::new().with_user("alice-token", user("alice"));
        ConnectionRegistry::new(Arc::new(validator), 8)
    }

    #[tokio::test]
    async fn authenticate_registers_on_valid_token() {
        let registry = registry();

        let handle = registry.authenticate("alice-token").await.unwrap();

        assert_eq!(handle.user.id.as_str(), "alice");
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn authenticate_rejects_without_registering() {
        let registry = registry();

        assert!(matches!(
            registry.authenticate("bogus").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            registry.authenticate("").await,
            Err(AuthError::MissingToken)
        ));
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn join_is_idempotent_and_visible_in_members() {
        let registry = registry();
        let handle = registry.register(user("alice")).await;
        let room = RoomId::Channel(ChannelId::new());

        assert!(registry.join(handle.id, room).await.unwrap());
        assert!(!registry.join(handle.id, room).await.unwrap());

        let members = registry.members(&room).await;
        assert_eq!(members.len(), 1);
        assert!(members.contains(&handle.id));
    }

    #[tokio::test]
    async fn join_unknown_connection_fails() {
        let registry = registry();
        let result = registry
            .join(ConnectionId::new(), RoomId::Channel(ChannelId::new()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn member_snapshot_is_unaffected_by_later_joins() {
        let registry = registry();
        let a = registry.register(user("alice")).await;
        let b = registry.register(user("bob")).await;
        let room = RoomId::Channel(ChannelId::new());

        registry.join(a.id, room).await.unwrap();
        let snapshot = registry.members(&room).await;
        registry.join(b.id, room).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.members(&room).await.len(), 2);
    }

    #[tokio::test]
    async fn close_leaves_every_room_exactly_once() {
        let registry = registry();
        let handle = registry.register(user("alice")).await;
        let channel = RoomId::Channel(ChannelId::new());
        let workspace = RoomId::Workspace(WorkspaceId::new());
        registry.join(handle.id, channel).await.unwrap();
        registry.join(handle.id, workspace).await.unwrap();

        let closed = registry.close(handle.id).await.expect("first close");
        assert_eq!(closed.channels.len(), 1);
        assert_eq!(closed.workspaces.len(), 1);
        assert!(registry.close(handle.id).await.is_none());

        assert!(registry.members(&channel).await.is_empty());
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn leave_removes_empty_room() {
        let registry = registry();
        let handle = registry.register(user("alice")).await;
        let room = RoomId::Workspace(WorkspaceId::new());
        registry.join(handle.id, room).await.unwrap();

        assert!(registry.leave(handle.id, &room).await);
        assert!(!registry.leave(handle.id, &room).await);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn evict_ends_outbound_stream() {
        let registry = registry();
        let mut handle = registry.register(user("alice")).await;

        assert!(registry.evict(handle.id).await);
        assert!(handle.outbound.recv().await.is_none());
        // Still registered until the transport closes it.
        assert!(registry.connection(handle.id).await.is_some());
    }

    #[tokio::test]
    async fn live_users_dedupes_and_filters_stale_heartbeats() {
        let registry = registry();
        let room = RoomId::Channel(ChannelId::new());
        let a1 = registry.register(user("alice")).await;
        let a2 = registry.register(user("alice")).await;
        let b = registry.register(user("bob")).await;
        for id in [a1.id, a2.id, b.id] {
            registry.join(id, room).await.unwrap();
        }

        let now = Timestamp::now();
        let timeout = Duration::from_secs(45);
        let users = registry.live_users(&room, &now, timeout).await;
        assert_eq!(users.len(), 2);

        let later = now.plus_secs(60);
        registry.touch(b.id, later).await;
        let users = registry.live_users(&room, &later, timeout).await;
        assert_eq!(users, vec![UserId::new("bob").unwrap()]);
    }

    #[tokio::test]
    async fn other_member_check_excludes_self() {
        let registry = registry();
        let room = RoomId::Channel(ChannelId::new());
        let a1 = registry.register(user("alice")).await;
        let a2 = registry.register(user("alice")).await;
        registry.join(a1.id, room).await.unwrap();

        let alice = UserId::new("alice").unwrap();
        assert!(!registry.user_has_other_member(&alice, &room, a1.id).await);

        registry.join(a2.id, room).await.unwrap();
        assert!(registry.user_has_other_member(&alice, &room, a1.id).await);
    }
}
