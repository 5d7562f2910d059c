//! Server-sent-event framing for [`StreamEvent`].
//!
//! Each event is rendered as `data: <compact json>\n\n`, the text
//! event-stream wire format consumed by browsers and SSE clients.

use crate::models::StreamEvent;

/// Frame one event for the wire.
pub fn frame_event(event: &StreamEvent) -> String {
    // StreamEvent serialization cannot fail: all fields are plain data.
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {json}\n\n")
}
