use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::MessageRole;

/// Event types pushed to chat clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Connected,
    Message,
    Typing,
    MessageStart,
    MessageChunk,
    MessageEnd,
    Error,
    Pong,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Message => "message",
            Self::Typing => "typing",
            Self::MessageStart => "message_start",
            Self::MessageChunk => "message_chunk",
            Self::MessageEnd => "message_end",
            Self::Error => "error",
            Self::Pong => "pong",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// Frame sent by a chat client: `{"event": "...", "data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Payload of a `send_message` frame
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessage {
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    pub mode: Option<String>,
    /// Number, numeric string, or null
    #[serde(default)]
    pub profile_id: Value,
}

impl SendMessage {
    pub fn profile_id(&self) -> Option<i64> {
        parse_profile_id(&self.profile_id)
    }
}

/// Accept ids sent as numbers or strings; anything else means "no profile"
pub fn parse_profile_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Server-push event for every socket in a session's room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvent {
    pub event: String,
    pub data: Value,
}

impl ServerEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn connected(session_id: &str) -> Self {
        Self::new(
            EventType::Connected,
            serde_json::json!({ "session_id": session_id }),
        )
    }

    pub fn message(role: MessageRole, content: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            EventType::Message,
            serde_json::json!({
                "role": role,
                "content": content,
                "timestamp": timestamp.to_rfc3339()
            }),
        )
    }

    pub fn typing(typing: bool) -> Self {
        Self::new(EventType::Typing, serde_json::json!({ "typing": typing }))
    }

    pub fn message_start(timestamp: DateTime<Utc>) -> Self {
        Self::new(
            EventType::MessageStart,
            serde_json::json!({
                "role": MessageRole::Assistant,
                "timestamp": timestamp.to_rfc3339()
            }),
        )
    }

    pub fn message_chunk(content: &str) -> Self {
        Self::new(EventType::MessageChunk, serde_json::json!({ "content": content }))
    }

    pub fn message_end() -> Self {
        Self::new(EventType::MessageEnd, serde_json::json!({}))
    }

    pub fn error(message: &str) -> Self {
        Self::new(EventType::Error, serde_json::json!({ "message": message }))
    }

    pub fn pong() -> Self {
        Self::new(EventType::Pong, serde_json::json!({}))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"event":"{}","data":{{}}}}"#, self.event)
        })
    }
}
