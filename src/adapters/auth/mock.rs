//! Mock session validator for tests and local development.
//!
//! # Example
//!
//! ```ignore
//! use huddle::adapters::auth::MockSessionValidator;
//! use huddle::domain::foundation::{AuthenticatedUser, UserId};
//!
//! let validator = MockSessionValidator::new()
//!     .with_user("alice-token", AuthenticatedUser::new(
//!         UserId::new("alice").unwrap(),
//!         "alice@example.com",
//!         None,
//!     ));
//!
//! let result = validator.validate("alice-token").await;
//! assert!(result.is_ok());
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};
use crate::ports::SessionValidator;

/// Token → user map. Unknown tokens return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockSessionValidator {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    force_error: RwLock<Option<AuthError>>,
}

impl MockSessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for `user`.
    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.add_token(token, user);
        self
    }

    /// Fail every validation with `error`.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    pub fn add_token(&self, token: impl Into<String>, user: AuthenticatedUser) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
    }

    /// Revoke a token, e.g. to test reconnect after logout.
    pub fn remove_token(&self, token: &str) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }
}

#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    fn alice() -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new("alice").unwrap(), "alice@example.com", None)
    }

    #[tokio::test]
    async fn known_token_returns_user() {
        let validator = MockSessionValidator::new().with_user("t", alice());
        assert_eq!(validator.validate("t").await.unwrap(), alice());
    }

    #[tokio::test]
    async fn removed_token_is_rejected() {
        let validator = MockSessionValidator::new().with_user("t", alice());
        validator.remove_token("t");
        assert_eq!(validator.validate("t").await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let validator = MockSessionValidator::new()
            .with_user("t", alice())
            .with_error(AuthError::service_unavailable("down"));
        assert!(matches!(
            validator.validate("t").await,
            Err(AuthError::ServiceUnavailable(_))
        ));
    }
}
