use echomind_types::PermissionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The remote agent holds the floor; the toggle is refused, not queued.
    #[error("agent is speaking")]
    AgentSpeaking,

    #[error("session is not connected")]
    NotConnected,

    #[error("message is empty")]
    EmptyMessage,

    #[error("session is closed")]
    SessionClosed,

    #[error("failed to encode data message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),
}

/// Failure reported by the transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport operation failed: {0}")]
    OperationFailed(String),

    #[error("transport is closed")]
    Closed,
}

/// Result of a host permission prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied { reason: String },
}

impl PermissionOutcome {
    pub fn state(&self) -> PermissionState {
        match self {
            Self::Granted => PermissionState::Granted,
            Self::Denied { .. } => PermissionState::Denied,
        }
    }
}
