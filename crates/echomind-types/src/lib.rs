//! Shared types for the EchoMind voice companion.
//!
//! This crate provides the vocabulary used across the workspace: participant
//! roles, microphone/permission/turn state, connection state, track sources,
//! transcript entries, and the data-channel wire message.
//!
//! Nothing here performs I/O. The state machine in `echomind-voice` and the
//! token service in `echomind-server` both build on these definitions.

use serde::{Deserialize, Serialize};

mod transcript;
mod wire;

pub use transcript::{Speaker, TranscriptEntry};
pub use wire::{DataMessage, UserProfile, DATA_MESSAGE_ROLE_USER, DATA_MESSAGE_TYPE};

/// Role of a participant in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantRole {
    /// The human on this device.
    Local,
    /// The automated companion.
    RemoteAgent,
    /// Any other remote participant.
    RemoteOther,
}

impl ParticipantRole {
    /// Returns the string label for this role.
    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::RemoteAgent => "remote-agent",
            Self::RemoteOther => "remote-other",
        }
    }
}

/// Whether the local microphone is publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrophoneState {
    #[default]
    Disabled,
    Enabled,
}

impl MicrophoneState {
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

/// Last known microphone authorization from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Who holds the transmit channel.
///
/// `UserSpeaking` and `AgentSpeaking` are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    UserSpeaking,
    AgentSpeaking,
}

/// Four-phase view of the turn-taking controller.
///
/// `MutedByPermission` is an idle floor whose microphone cannot be enabled
/// because the host refused authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    UserSpeaking,
    AgentSpeaking,
    MutedByPermission,
}

impl TurnPhase {
    /// Derives the phase from the turn and the cached permission.
    pub fn derive(turn: TurnState, permission: PermissionState) -> Self {
        match (turn, permission) {
            (TurnState::UserSpeaking, _) => Self::UserSpeaking,
            (TurnState::AgentSpeaking, _) => Self::AgentSpeaking,
            (TurnState::Idle, PermissionState::Denied) => Self::MutedByPermission,
            (TurnState::Idle, _) => Self::Idle,
        }
    }
}

/// Transport connection state, mirroring the LiveKit room states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Media source of a published track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    ScreenShareAudio,
    Unknown,
}

/// Kind of media the host is asked to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}
