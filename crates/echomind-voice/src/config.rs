use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Advisory shown when the host refuses microphone access without a reason.
pub const DEFAULT_PERMISSION_DENIED_MESSAGE: &str =
    "Microphone access denied. Please allow microphone access and try again.";

fn default_reveal_interval_ms() -> u64 {
    15
}

fn default_reveal_restart_delay_ms() -> u64 {
    100
}

fn default_agent_floor_cooldown_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_permission_denied_message() -> String {
    DEFAULT_PERMISSION_DENIED_MESSAGE.to_string()
}

fn default_command_buffer() -> usize {
    64
}

/// Tuning for a single voice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay between revealed characters of a streaming transcription.
    #[serde(default = "default_reveal_interval_ms")]
    pub reveal_interval_ms: u64,
    /// Delay before the first character when a reveal starts from empty.
    #[serde(default = "default_reveal_restart_delay_ms")]
    pub reveal_restart_delay_ms: u64,
    /// How long a data message keeps the agent on the floor without a track event.
    #[serde(default = "default_agent_floor_cooldown_ms")]
    pub agent_floor_cooldown_ms: u64,
    /// Enable the microphone once after connect when permission is granted.
    #[serde(default = "default_true")]
    pub auto_enable_microphone: bool,
    #[serde(default = "default_permission_denied_message")]
    pub permission_denied_message: String,
    /// Capacity of the driver's command mailbox.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reveal_interval_ms: default_reveal_interval_ms(),
            reveal_restart_delay_ms: default_reveal_restart_delay_ms(),
            agent_floor_cooldown_ms: default_agent_floor_cooldown_ms(),
            auto_enable_microphone: true,
            permission_denied_message: default_permission_denied_message(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl SessionConfig {
    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }

    pub fn reveal_restart_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_restart_delay_ms)
    }

    pub fn agent_floor_cooldown(&self) -> Duration {
        Duration::from_millis(self.agent_floor_cooldown_ms)
    }
}

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_room_suffix() -> String {
    "echomind".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Suffix appended to generated room names.
    #[serde(default = "default_room_suffix")]
    pub room_suffix: String,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
            room_suffix: default_room_suffix(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("room_suffix", &self.room_suffix)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    /// True when both credentials needed to sign join tokens are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}
