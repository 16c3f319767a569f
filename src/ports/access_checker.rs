//! Capability check port for rooms and channel mutations.
//!
//! The engine does not own channel membership or roles; it asks this port
//! before a connection joins a room and before a mutation is sequenced.
//!
//! # Design
//!
//! Callers treat the check as **fail-secure**: an `Err` from the checker is
//! handled exactly like [`AccessResult::Denied`].
//!
//! # Example
//!
//! ```ignore
//! match access_checker.check(&user_id, &Capability::Post(channel_id)).await {
//!     Ok(AccessResult::Allowed) => { /* sequence the message */ }
//!     Ok(AccessResult::Denied(reason)) => return Err(DomainError::forbidden(reason)),
//!     Err(_) => return Err(DomainError::forbidden("access check failed")),
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{ChannelId, DomainError, UserId, WorkspaceId};

/// Something a user may or may not be allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Subscribe to a workspace room (presence).
    JoinWorkspace(WorkspaceId),
    /// Subscribe to a channel room (messages, typing).
    JoinChannel(ChannelId),
    /// Create a message.
    Post(ChannelId),
    /// Edit a message written by `author`.
    Edit { channel_id: ChannelId, author: UserId },
    /// Delete a message written by `author`.
    Delete { channel_id: ChannelId, author: UserId },
    /// Add or remove a reaction.
    React(ChannelId),
}

impl Capability {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Capability::JoinWorkspace(_) => "join_workspace",
            Capability::JoinChannel(_) => "join_channel",
            Capability::Post(_) => "post",
            Capability::Edit { .. } => "edit",
            Capability::Delete { .. } => "delete",
            Capability::React(_) => "react",
        }
    }
}

/// Result of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    /// Access is granted.
    Allowed,
    /// Access is denied with a human-readable reason.
    Denied(String),
}

impl AccessResult {
    /// Returns true if access is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessResult::Allowed)
    }

    /// Converts the result into a `DomainError::forbidden` on denial.
    pub fn into_result(self) -> Result<(), DomainError> {
        match self {
            AccessResult::Allowed => Ok(()),
            AccessResult::Denied(reason) => Err(DomainError::forbidden(reason)),
        }
    }
}

/// Port for checking whether a user holds a capability.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Check `capability` for `user_id`.
    async fn check(
        &self,
        user_id: &UserId,
        capability: &Capability,
    ) -> Result<AccessResult, DomainError>;
}
