//! Domain layer containing the messaging engine's pure types and state machines.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, auth)
//! - `chat` - Message views, mutations, sequenced channel events and rooms
//! - `presence` - Per-(user, workspace) online/offline state machine
//! - `typing` - Expiring per-channel typing sets
//! - `protocol` - Client/server real-time event vocabulary
//! - `timeline` - Client-side window reconciliation

pub mod chat;
pub mod foundation;
pub mod presence;
pub mod protocol;
pub mod timeline;
pub mod typing;
