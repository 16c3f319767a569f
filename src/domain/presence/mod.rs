//! Presence state machine per (user, workspace).
//!
//! ```text
//!            attach (count 0 → 1, fresh heartbeat)
//!   Offline ───────────────────────────────────────▶ Online
//!      ▲                                              │  heartbeat before timeout
//!      │   count reaches 0  OR  heartbeat timeout     │◀─┘
//!      └──────────────────────────────────────────────┘
//! ```
//!
//! Every mutating method returns `Some(transition)` only when the derived
//! status actually flips, so repeated heartbeats or extra connections never
//! produce duplicate online/offline events.

use std::time::Duration;

use serde::Serialize;

use crate::domain::foundation::{Timestamp, UserId, WorkspaceId};

/// Derived online/offline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// A status flip that must be broadcast to the workspace room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTransition {
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub status: PresenceStatus,
    pub at: Timestamp,
}

/// Liveness bookkeeping for one user in one workspace.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    user_id: UserId,
    workspace_id: WorkspaceId,
    active_connections: u32,
    last_heartbeat_at: Timestamp,
    online: bool,
    changed_at: Timestamp,
}

impl PresenceEntry {
    /// A fresh, offline entry with no connections.
    pub fn new(user_id: UserId, workspace_id: WorkspaceId, now: Timestamp) -> Self {
        Self {
            user_id,
            workspace_id,
            active_connections: 0,
            last_heartbeat_at: now,
            online: false,
            changed_at: now,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections
    }

    pub fn last_heartbeat_at(&self) -> Timestamp {
        self.last_heartbeat_at
    }

    /// Last status emitted for this entry.
    pub fn status(&self) -> PresenceStatus {
        if self.online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }

    /// Online iff at least one connection and the latest heartbeat is within `timeout`.
    pub fn is_online_at(&self, now: &Timestamp, timeout: Duration) -> bool {
        self.active_connections > 0 && !self.last_heartbeat_at.is_older_than(timeout, now)
    }

    /// A connection joined the workspace. Joining counts as a heartbeat.
    pub fn attach(&mut self, now: Timestamp, timeout: Duration) -> Option<PresenceTransition> {
        self.active_connections = self.active_connections.saturating_add(1);
        self.record_heartbeat(now);
        self.reconcile(now, timeout)
    }

    /// A connection left the workspace or closed.
    pub fn detach(&mut self, now: Timestamp, timeout: Duration) -> Option<PresenceTransition> {
        self.active_connections = self.active_connections.saturating_sub(1);
        self.reconcile(now, timeout)
    }

    /// A liveness signal from one of the user's connections.
    ///
    /// Ignored when no connection is attached; heartbeats alone never bring a
    /// user online.
    pub fn heartbeat(&mut self, now: Timestamp, timeout: Duration) -> Option<PresenceTransition> {
        if self.active_connections == 0 {
            return None;
        }
        self.record_heartbeat(now);
        self.reconcile(now, timeout)
    }

    /// Re-evaluates the heartbeat timeout without any new input.
    pub fn expire(&mut self, now: Timestamp, timeout: Duration) -> Option<PresenceTransition> {
        self.reconcile(now, timeout)
    }

    /// Offline with no connections for longer than `grace`.
    pub fn is_collectable(&self, now: &Timestamp, grace: Duration) -> bool {
        self.active_connections == 0 && !self.online && self.changed_at.is_older_than(grace, now)
    }

    fn record_heartbeat(&mut self, now: Timestamp) {
        if now.is_after(&self.last_heartbeat_at) {
            self.last_heartbeat_at = now;
        }
    }

    fn reconcile(&mut self, now: Timestamp, timeout: Duration) -> Option<PresenceTransition> {
        let online = self.is_online_at(&now, timeout);
        if online == self.online {
            return None;
        }
        self.online = online;
        self.changed_at = now;
        Some(PresenceTransition {
            user_id: self.user_id.clone(),
            workspace_id: self.workspace_id,
            status: self.status(),
            at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(45);

    fn entry(now: Timestamp) -> PresenceEntry {
        PresenceEntry::new(UserId::new("alice").unwrap(), WorkspaceId::new(), now)
    }

    #[test]
    fn first_attach_goes_online_once() {
        let now = Timestamp::now();
        let mut e = entry(now);

        let t = e.attach(now, TIMEOUT).expect("transition");
        assert_eq!(t.status, PresenceStatus::Online);

        assert!(e.attach(now.plus_secs(1), TIMEOUT).is_none());
        assert_eq!(e.active_connections(), 2);
    }

    #[test]
    fn goes_offline_only_when_last_connection_detaches() {
        let now = Timestamp::now();
        let mut e = entry(now);
        e.attach(now, TIMEOUT);
        e.attach(now, TIMEOUT);

        assert!(e.detach(now.plus_secs(1), TIMEOUT).is_none());
        let t = e.detach(now.plus_secs(2), TIMEOUT).expect("transition");
        assert_eq!(t.status, PresenceStatus::Offline);
        assert_eq!(e.active_connections(), 0);
    }

    #[test]
    fn repeated_heartbeats_do_not_re_emit_online() {
        let now = Timestamp::now();
        let mut e = entry(now);
        e.attach(now, TIMEOUT);

        for i in 1..10 {
            assert!(e.heartbeat(now.plus_secs(i * 15), TIMEOUT).is_none());
        }
        assert_eq!(e.status(), PresenceStatus::Online);
    }

    #[test]
    fn heartbeat_timeout_goes_offline_exactly_once() {
        let now = Timestamp::now();
        let mut e = entry(now);
        e.attach(now, TIMEOUT);

        assert!(e.expire(now.plus_secs(45), TIMEOUT).is_none());
        let t = e.expire(now.plus_secs(46), TIMEOUT).expect("transition");
        assert_eq!(t.status, PresenceStatus::Offline);

        assert!(e.expire(now.plus_secs(60), TIMEOUT).is_none());
        assert!(e.expire(now.plus_secs(600), TIMEOUT).is_none());
    }

    #[test]
    fn heartbeat_after_timeout_comes_back_online() {
        let now = Timestamp::now();
        let mut e = entry(now);
        e.attach(now, TIMEOUT);
        e.expire(now.plus_secs(50), TIMEOUT);

        let t = e.heartbeat(now.plus_secs(55), TIMEOUT).expect("transition");
        assert_eq!(t.status, PresenceStatus::Online);
    }

    #[test]
    fn heartbeat_without_connections_is_ignored() {
        let now = Timestamp::now();
        let mut e = entry(now);
        assert!(e.heartbeat(now, TIMEOUT).is_none());
        assert_eq!(e.status(), PresenceStatus::Offline);
    }

    #[test]
    fn out_of_order_heartbeat_does_not_rewind() {
        let now = Timestamp::now();
        let mut e = entry(now);
        e.attach(now.plus_secs(10), TIMEOUT);
        e.heartbeat(now, TIMEOUT);
        assert_eq!(e.last_heartbeat_at(), now.plus_secs(10));
    }

    #[test]
    fn collectable_after_grace_with_no_connections() {
        let now = Timestamp::now();
        let grace = Duration::from_secs(60);
        let mut e = entry(now);
        e.attach(now, TIMEOUT);
        e.detach(now, TIMEOUT);

        assert!(!e.is_collectable(&now.plus_secs(30), grace));
        assert!(e.is_collectable(&now.plus_secs(61), grace));
    }
}
