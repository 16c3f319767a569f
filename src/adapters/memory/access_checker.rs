//! Static AccessChecker for development and testing.
//!
//! Grants every capability unless a user is explicitly denied. Optionally
//! restricts edit and delete to the message's author.
//!
//! # Usage
//!
//! ```ignore
//! use huddle::adapters::memory::StaticAccessChecker;
//!
//! let checker = StaticAccessChecker::allow_all().authors_only();
//! ```

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{AccessChecker, AccessResult, Capability};

/// Rule-based checker with no external lookups.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessChecker {
    denied_users: HashSet<UserId>,
    authors_only: bool,
}

impl StaticAccessChecker {
    /// Every user may do everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Deny every capability to `user`.
    pub fn deny_user(mut self, user: UserId) -> Self {
        self.denied_users.insert(user);
        self
    }

    /// Only authors may edit or delete their messages.
    pub fn authors_only(mut self) -> Self {
        self.authors_only = true;
        self
    }
}

#[async_trait]
impl AccessChecker for StaticAccessChecker {
    async fn check(
        &self,
        user_id: &UserId,
        capability: &Capability,
    ) -> Result<AccessResult, DomainError> {
        if self.denied_users.contains(user_id) {
            return Ok(AccessResult::Denied(format!(
                "Not allowed to {}",
                capability.name()
            )));
        }

        if self.authors_only {
            if let Capability::Edit { author, .. } | Capability::Delete { author, .. } = capability {
                if author != user_id {
                    return Ok(AccessResult::Denied(
                        "Only the author can change this message".to_string(),
                    ));
                }
            }
        }

        Ok(AccessResult::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ChannelId;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn allow_all_allows() {
        let checker = StaticAccessChecker::allow_all();
        let result = checker
            .check(&user("a"), &Capability::Post(ChannelId::new()))
            .await
            .unwrap();
        assert!(result.is_allowed());
    }

    #[tokio::test]
    async fn denied_user_is_denied_everything() {
        let checker = StaticAccessChecker::allow_all().deny_user(user("mallory"));
        let result = checker
            .check(&user("mallory"), &Capability::JoinChannel(ChannelId::new()))
            .await
            .unwrap();
        assert_eq!(result, AccessResult::Denied("Not allowed to join_channel".into()));
    }

    #[tokio::test]
    async fn authors_only_guards_edit_and_delete() {
        let checker = StaticAccessChecker::allow_all().authors_only();
        let channel_id = ChannelId::new();
        let edit = Capability::Edit {
            channel_id,
            author: user("alice"),
        };

        assert!(checker.check(&user("alice"), &edit).await.unwrap().is_allowed());
        assert!(!checker.check(&user("bob"), &edit).await.unwrap().is_allowed());
        assert!(checker
            .check(&user("bob"), &Capability::React(channel_id))
            .await
            .unwrap()
            .is_allowed());
    }
}
