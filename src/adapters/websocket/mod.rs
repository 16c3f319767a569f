//! WebSocket transport for the chat namespace.
//!
//! # Architecture
//!
//! ```text
//!  client ──text frame──▶ decode_frame ──ClientEvent──▶ ChatGateway
//!                                                           │
//!                                          ConnectionRegistry / BroadcastRouter
//!                                                           │
//!  client ◀──text frame── encode_event ◀──ServerEvent── outbound queue
//! ```
//!
//! # Components
//!
//! - [`messages`] - frame codec over the protocol events
//! - [`handler`] - Axum upgrade handler, socket pump, health endpoint

pub mod handler;
pub mod messages;

pub use handler::{health, websocket_router, ws_handler, HealthStatus, WebSocketState};
pub use messages::{decode_frame, encode_event, MAX_FRAME_BYTES};
