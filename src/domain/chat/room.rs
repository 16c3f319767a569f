//! Broadcast targets.

use std::fmt;

use crate::domain::foundation::{ChannelId, WorkspaceId};

/// A named group of connections subscribed to the same channel or workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomId {
    Channel(ChannelId),
    Workspace(WorkspaceId),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Channel(id) => write!(f, "channel:{}", id),
            RoomId::Workspace(id) => write!(f, "workspace:{}", id),
        }
    }
}

impl From<ChannelId> for RoomId {
    fn from(id: ChannelId) -> Self {
        RoomId::Channel(id)
    }
}

impl From<WorkspaceId> for RoomId {
    fn from(id: WorkspaceId) -> Self {
        RoomId::Workspace(id)
    }
}
