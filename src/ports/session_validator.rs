//! Session validation port for access tokens presented at connect time.
//!
//! A connection is registered only after its token validates; the resulting
//! [`AuthenticatedUser`] is bound to the connection for its whole lifetime.
//! Implementations exist for HS256 JWTs and for tests.
//!
//! # Security Requirements
//!
//! Implementations MUST validate:
//! - **Signature**: Token must be signed with the configured secret
//! - **Expiry (exp)**: Token must not be expired
//! - **Issuer / Audience**: when configured, they must match
//!
//! # Example Implementation
//!
//! ```ignore
//! pub struct JwtSessionValidator { ... }
//!
//! #[async_trait]
//! impl SessionValidator for JwtSessionValidator {
//!     async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
//!         // 1. Decode and verify signature
//!         // 2. Validate exp (and iss/aud when configured)
//!         // 3. Map claims to AuthenticatedUser
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{AuthenticatedUser, AuthError};

/// Validates access tokens and extracts user identity.
///
/// The WebSocket upgrade handler calls this before a connection is
/// registered; failure rejects the upgrade.
///
/// # Contract
///
/// Implementations must:
/// - Validate the token signature
/// - Validate issuer, audience, and expiry claims
/// - Return `AuthError::InvalidToken` for malformed/bad signature tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate an access token and return the authenticated user.
    ///
    /// # Arguments
    ///
    /// * `token` - The raw token from the `token` query parameter
    ///
    /// # Returns
    ///
    /// * `Ok(AuthenticatedUser)` - Token is valid, user extracted from claims
    /// * `Err(AuthError::InvalidToken)` - Token is malformed or signature invalid
    /// * `Err(AuthError::TokenExpired)` - Token signature valid but expired
    /// * `Err(AuthError::ServiceUnavailable)` - Validator misconfigured or unreachable
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}
