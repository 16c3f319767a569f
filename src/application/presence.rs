//! Presence tracker: derives online/offline per (user, workspace).
//!
//! The tracker only computes transitions; the caller broadcasts them to the
//! workspace room. All state changes and the snapshot returned by
//! [`PresenceTracker::join`] happen under one lock, so a joining connection
//! never misses a transition that is not reflected in its snapshot.
//!
//! Connection counts are kept per attached connection, not per call. A
//! connection that never attached to a workspace cannot detach from it, and
//! attaching twice counts once.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::foundation::{ConnectionId, Timestamp, UserId, WorkspaceId};
use crate::domain::presence::{PresenceEntry, PresenceTransition};

/// Tunables for presence.
#[derive(Debug, Clone, Copy)]
pub struct PresencePolicy {
    /// No heartbeat for this long means offline.
    pub heartbeat_timeout: Duration,
    /// Offline entries with no connections are dropped after this long.
    pub grace: Duration,
}

/// Result of a connection joining a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceJoin {
    /// `Some` when this join brought the user online.
    pub transition: Option<PresenceTransition>,
    /// Everyone online in the workspace, including the joining user.
    pub online_user_ids: Vec<UserId>,
}

struct Attachment {
    user: UserId,
    workspaces: HashSet<WorkspaceId>,
}

#[derive(Default)]
struct PresenceState {
    entries: HashMap<(UserId, WorkspaceId), PresenceEntry>,
    attachments: HashMap<ConnectionId, Attachment>,
}

impl PresenceState {
    fn detach(
        &mut self,
        user: &UserId,
        workspace: WorkspaceId,
        now: Timestamp,
        timeout: Duration,
    ) -> Option<PresenceTransition> {
        self.entries
            .get_mut(&(user.clone(), workspace))?
            .detach(now, timeout)
    }
}

/// Connection-counted presence with heartbeat timeout.
pub struct PresenceTracker {
    state: RwLock<PresenceState>,
    policy: PresencePolicy,
}

impl PresenceTracker {
    pub fn new(policy: PresencePolicy) -> Self {
        Self {
            state: RwLock::new(PresenceState::default()),
            policy,
        }
    }

    /// Connection `connection_id` of `user` joined `workspace`.
    ///
    /// Joining a workspace the connection is already attached to only
    /// returns the snapshot.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        user: &UserId,
        workspace: WorkspaceId,
        now: Timestamp,
    ) -> PresenceJoin {
        let mut state = self.state.write().await;
        let newly_attached = state
            .attachments
            .entry(connection_id)
            .or_insert_with(|| Attachment {
                user: user.clone(),
                workspaces: HashSet::new(),
            })
            .workspaces
            .insert(workspace);

        let transition = if newly_attached {
            state
                .entries
                .entry((user.clone(), workspace))
                .or_insert_with(|| PresenceEntry::new(user.clone(), workspace, now))
                .attach(now, self.policy.heartbeat_timeout)
        } else {
            None
        };

        let online_user_ids = online_in(&state.entries, workspace, &now, self.policy.heartbeat_timeout);
        PresenceJoin {
            transition,
            online_user_ids,
        }
    }

    /// Connection `connection_id` left `workspace`. No-op unless it was attached.
    pub async fn leave(
        &self,
        connection_id: ConnectionId,
        workspace: WorkspaceId,
        now: Timestamp,
    ) -> Option<PresenceTransition> {
        let mut state = self.state.write().await;
        let attachment = state.attachments.get_mut(&connection_id)?;
        if !attachment.workspaces.remove(&workspace) {
            return None;
        }
        let user = attachment.user.clone();
        if attachment.workspaces.is_empty() {
            state.attachments.remove(&connection_id);
        }
        state.detach(&user, workspace, now, self.policy.heartbeat_timeout)
    }

    /// Connection `connection_id` closed; detaches it from every workspace it joined.
    pub async fn disconnect(&self, connection_id: ConnectionId, now: Timestamp) -> Vec<PresenceTransition> {
        let mut state = self.state.write().await;
        let Some(attachment) = state.attachments.remove(&connection_id) else {
            return Vec::new();
        };

        let mut transitions = Vec::new();
        for workspace in attachment.workspaces {
            if let Some(t) = state.detach(&attachment.user, workspace, now, self.policy.heartbeat_timeout) {
                transitions.push(t);
            }
        }
        transitions
    }

    /// A heartbeat from `connection_id`, refreshing every workspace it joined.
    pub async fn heartbeat(&self, connection_id: ConnectionId, now: Timestamp) -> Vec<PresenceTransition> {
        let mut state = self.state.write().await;
        let PresenceState {
            entries,
            attachments,
        } = &mut *state;
        let Some(attachment) = attachments.get(&connection_id) else {
            return Vec::new();
        };

        let mut transitions = Vec::new();
        for workspace in &attachment.workspaces {
            let Some(entry) = entries.get_mut(&(attachment.user.clone(), *workspace)) else {
                continue;
            };
            if let Some(t) = entry.heartbeat(now, self.policy.heartbeat_timeout) {
                transitions.push(t);
            }
        }
        transitions
    }

    /// Emits timeout transitions and drops long-offline entries.
    pub async fn sweep(&self, now: Timestamp) -> Vec<PresenceTransition> {
        let mut state = self.state.write().await;
        let mut transitions = Vec::new();
        for entry in state.entries.values_mut() {
            if let Some(t) = entry.expire(now, self.policy.heartbeat_timeout) {
                transitions.push(t);
            }
        }

        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| !entry.is_collectable(&now, self.policy.grace));
        let collected = before - state.entries.len();
        if collected > 0 {
            tracing::trace!(collected, "dropped idle presence entries");
        }
        transitions
    }

    /// Users online in `workspace` at `now`, sorted.
    pub async fn online_users(&self, workspace: WorkspaceId, now: Timestamp) -> Vec<UserId> {
        let state = self.state.read().await;
        online_in(&state.entries, workspace, &now, self.policy.heartbeat_timeout)
    }

    pub async fn is_online(&self, user: &UserId, workspace: WorkspaceId, now: Timestamp) -> bool {
        self.state
            .read()
            .await
            .entries
            .get(&(user.clone(), workspace))
            .map_or(false, |e| e.is_online_at(&now, self.policy.heartbeat_timeout))
    }

    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

fn online_in(
    entries: &HashMap<(UserId, WorkspaceId), PresenceEntry>,
    workspace: WorkspaceId,
    now: &Timestamp,
    timeout: Duration,
) -> Vec<UserId> {
    let mut users: Vec<UserId> = entries
        .values()
        .filter(|e| e.workspace_id() == workspace && e.is_online_at(now, timeout))
        .map(|e| e.user_id().clone())
        .collect();
    users.sort();
    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::presence::PresenceStatus;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(PresencePolicy {
            heartbeat_timeout: Duration::from_secs(45),
            grace: Duration::from_secs(60),
        })
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn many_connections_produce_one_online_and_one_offline() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let now = Timestamp::now();
        let tabs: Vec<ConnectionId> = (0..3).map(|_| ConnectionId::new()).collect();

        let mut transitions = Vec::new();
        for tab in &tabs {
            transitions.extend(tracker.join(*tab, &alice, ws, now).await.transition);
        }
        for tab in &tabs {
            transitions.extend(tracker.leave(*tab, ws, now.plus_secs(1)).await);
        }

        let statuses: Vec<_> = transitions.iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![PresenceStatus::Online, PresenceStatus::Offline]);
    }

    #[tokio::test]
    async fn join_snapshot_includes_joiner_and_peers() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let now = Timestamp::now();
        tracker.join(ConnectionId::new(), &user("bob"), ws, now).await;

        let join = tracker.join(ConnectionId::new(), &user("alice"), ws, now).await;
        assert_eq!(join.online_user_ids, vec![user("alice"), user("bob")]);
    }

    #[tokio::test]
    async fn repeated_join_from_one_connection_counts_once() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let tab = ConnectionId::new();
        let now = Timestamp::now();

        assert!(tracker.join(tab, &alice, ws, now).await.transition.is_some());
        let again = tracker.join(tab, &alice, ws, now).await;
        assert!(again.transition.is_none());
        assert_eq!(again.online_user_ids, vec![alice.clone()]);

        let offline = tracker.leave(tab, ws, now).await.unwrap();
        assert_eq!(offline.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn unattached_connection_cannot_take_user_offline() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let (tab1, tab2) = (ConnectionId::new(), ConnectionId::new());
        let now = Timestamp::now();
        tracker.join(tab1, &alice, ws, now).await;

        // tab2 entered the workspace room but never attached to presence.
        assert!(tracker.leave(tab2, ws, now.plus_secs(1)).await.is_none());
        assert!(tracker.disconnect(tab2, now.plus_secs(1)).await.is_empty());
        assert!(tracker.is_online(&alice, ws, now.plus_secs(1)).await);

        assert!(tracker.heartbeat(tab1, now.plus_secs(40)).await.is_empty());
        assert!(tracker.sweep(now.plus_secs(60)).await.is_empty());
        assert_eq!(tracker.online_users(ws, now.plus_secs(60)).await, vec![alice]);
    }

    #[tokio::test]
    async fn disconnect_detaches_every_workspace_once() {
        let tracker = tracker();
        let (ws1, ws2) = (WorkspaceId::new(), WorkspaceId::new());
        let alice = user("alice");
        let tab = ConnectionId::new();
        let now = Timestamp::now();
        tracker.join(tab, &alice, ws1, now).await;
        tracker.join(tab, &alice, ws2, now).await;

        let offline = tracker.disconnect(tab, now.plus_secs(1)).await;
        assert_eq!(offline.len(), 2);
        assert!(offline.iter().all(|t| t.status == PresenceStatus::Offline));
        assert!(tracker.disconnect(tab, now.plus_secs(2)).await.is_empty());
    }

    #[tokio::test]
    async fn sweep_emits_single_offline_after_timeout() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let now = Timestamp::now();
        tracker.join(ConnectionId::new(), &alice, ws, now).await;

        assert!(tracker.sweep(now.plus_secs(30)).await.is_empty());
        let offline = tracker.sweep(now.plus_secs(46)).await;
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].status, PresenceStatus::Offline);
        assert!(tracker.sweep(now.plus_secs(50)).await.is_empty());
        assert!(!tracker.is_online(&alice, ws, now.plus_secs(50)).await);
    }

    #[tokio::test]
    async fn heartbeat_keeps_user_online() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let tab = ConnectionId::new();
        let now = Timestamp::now();
        tracker.join(tab, &alice, ws, now).await;

        for step in 1..6 {
            let at = now.plus_secs(step * 15);
            assert!(tracker.heartbeat(tab, at).await.is_empty());
            assert!(tracker.sweep(at).await.is_empty());
        }
        assert_eq!(tracker.online_users(ws, now.plus_secs(75)).await, vec![alice]);
    }

    #[tokio::test]
    async fn heartbeat_after_timeout_brings_user_back() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let tab = ConnectionId::new();
        let now = Timestamp::now();
        tracker.join(tab, &alice, ws, now).await;
        tracker.sweep(now.plus_secs(50)).await;

        let back = tracker.heartbeat(tab, now.plus_secs(55)).await;
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn presence_is_scoped_per_workspace() {
        let tracker = tracker();
        let (ws1, ws2) = (WorkspaceId::new(), WorkspaceId::new());
        let alice = user("alice");
        let tab = ConnectionId::new();
        let now = Timestamp::now();
        tracker.join(tab, &alice, ws1, now).await;

        assert!(tracker.is_online(&alice, ws1, now).await);
        assert!(!tracker.is_online(&alice, ws2, now).await);
        assert!(tracker.leave(tab, ws2, now).await.is_none());
    }

    #[tokio::test]
    async fn idle_entries_are_collected_after_grace() {
        let tracker = tracker();
        let ws = WorkspaceId::new();
        let alice = user("alice");
        let tab = ConnectionId::new();
        let now = Timestamp::now();
        tracker.join(tab, &alice, ws, now).await;
        tracker.leave(tab, ws, now).await;

        tracker.sweep(now.plus_secs(30)).await;
        assert_eq!(tracker.entry_count().await, 1);
        tracker.sweep(now.plus_secs(61)).await;
        assert_eq!(tracker.entry_count().await, 0);
    }
}
