//! WebSocket frame codec.
//!
//! Text frames carry one JSON event each: `{ "event": "...", "data": {...} }`.
//! Decoding failures become `VALIDATION_FAILED` errors for the sender; they
//! never close the connection.

use crate::domain::foundation::DomainError;
use crate::domain::protocol::{ClientEvent, ServerEvent};

/// Largest accepted inbound text frame.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Parses one inbound text frame.
pub fn decode_frame(text: &str) -> Result<ClientEvent, DomainError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(DomainError::validation(
            "frame",
            format!("Frame exceeds {} bytes", MAX_FRAME_BYTES),
        ));
    }

    serde_json::from_str::<ClientEvent>(text).map_err(|e| {
        let event = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(str::to_owned));

        match event {
            Some(name) => DomainError::validation("data", format!("Invalid '{}' payload: {}", name, e))
                .with_detail("event", name),
            None => DomainError::validation("frame", format!("Malformed event frame: {}", e)),
        }
    })
}

/// Serializes one outbound event.
pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
