//! Voice session core for EchoMind.
//!
//! A human and an automated companion share a real-time room. This crate
//! decides who may transmit audio at any instant (strict half-duplex),
//! tracks whether the companion agent is present, and assembles the
//! transcript from local input, remote data messages and streaming
//! speech-to-text segments.
//!
//! The core is [`Session`], a synchronous state machine fed one
//! [`Input`] at a time. [`SessionDriver`] runs it on tokio against a
//! [`Transport`] and exposes a [`SessionHandle`] to the UI. Join tokens for
//! the room are issued by [`TokenIssuer`].

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod permission;
pub mod presence;
pub mod reveal;
pub mod session;
pub mod token;
pub mod transcript;
pub mod transport;
pub mod turn;

pub use config::{LiveKitConfig, SessionConfig, DEFAULT_PERMISSION_DENIED_MESSAGE};
pub use driver::{SessionDriver, SessionHandle};
pub use error::{PermissionOutcome, SessionError, TransportError};
pub use event::{Effect, Input, OpId, RequestId, SessionNotice, TimerKind, TransportEvent};
pub use permission::{PermissionGate, PermissionIntent};
pub use presence::{classify, ClassificationRule, PresenceChange, PresenceTracker, DEFAULT_RULES};
pub use session::{Session, SessionSnapshot, ToggleOutcome};
pub use token::{JoinToken, TokenIssuer};
pub use transcript::{extract_content, SenderCertainty, TranscriptAssembler};
pub use transport::Transport;
pub use turn::TurnController;
