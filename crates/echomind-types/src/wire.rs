//! Data-channel wire format.
//!
//! Messages are UTF-8 JSON objects. Readers must tolerate unknown fields and
//! missing optional fields, so every field except `content` is defaulted.

use serde::{Deserialize, Serialize};

/// Value of the `type` field on chat messages.
pub const DATA_MESSAGE_TYPE: &str = "message";

/// Value of the `role` field on messages sent by the local user.
pub const DATA_MESSAGE_ROLE_USER: &str = "user";

/// Profile collected before the session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub goal: String,
}

/// A chat message published on the data channel.
///
/// The profile is carried twice: nested under `metadata` and flattened into
/// `name` / `goal` for agents that only read top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    #[serde(default)]
    pub role: String,
    pub content: String,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub goal: String,
    /// Wall-clock milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

fn default_type() -> String {
    DATA_MESSAGE_TYPE.to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl DataMessage {
    /// Builds an outbound user message.
    pub fn user(content: impl Into<String>, profile: Option<&UserProfile>, timestamp: i64) -> Self {
        let metadata = match profile {
            Some(p) => serde_json::to_value(p).unwrap_or_else(|_| empty_object()),
            None => empty_object(),
        };
        Self {
            kind: DATA_MESSAGE_TYPE.to_string(),
            role: DATA_MESSAGE_ROLE_USER.to_string(),
            content: content.into(),
            metadata,
            name: profile.map(|p| p.name.clone()).unwrap_or_default(),
            goal: profile.map(|p| p.goal.clone()).unwrap_or_default(),
            timestamp,
        }
    }

    /// Serializes to the UTF-8 JSON bytes published on the data channel.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
