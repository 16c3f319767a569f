//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the engine to external systems:
//! - `auth` - Session validation (JWT, mock)
//! - `history` - REST history client for timelines
//! - `memory` - In-process stores and access checker
//! - `websocket` - Axum WebSocket transport

pub mod auth;
pub mod history;
pub mod memory;
pub mod websocket;
