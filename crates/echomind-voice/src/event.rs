//! Inputs consumed by the session state machine and the effects it emits.

use crate::error::{PermissionOutcome, TransportError};
use echomind_types::{ConnectionState, MediaKind, TrackSource};
use std::time::Duration;

/// Identifier of an outbound transport operation (microphone or publish).
pub type OpId = u64;

/// Identifier of a host permission prompt.
pub type RequestId = u64;

/// Events delivered by the transport collaborator, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ConnectionStateChanged(ConnectionState),
    ParticipantJoined {
        identity: String,
        /// Serialized JSON metadata, if the participant has any.
        metadata: Option<String>,
    },
    ParticipantLeft {
        identity: String,
        metadata: Option<String>,
    },
    TrackPublished {
        participant: String,
        source: TrackSource,
    },
    TrackUnpublished {
        participant: String,
        source: TrackSource,
    },
    DataReceived {
        /// `None` when the transport could not attribute the packet.
        sender: Option<String>,
        payload: Vec<u8>,
    },
    TranscriptionSegment {
        text: String,
        is_final: bool,
    },
}

/// Everything that can advance the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Transport(TransportEvent),
    PermissionResolved {
        request: RequestId,
        outcome: PermissionOutcome,
    },
    MicrophoneSettled {
        op: OpId,
        result: Result<(), TransportError>,
    },
    PublishSettled {
        op: OpId,
        result: Result<(), TransportError>,
    },
    RevealTick {
        generation: u64,
    },
    FloorCooldownElapsed {
        generation: u64,
    },
}

impl From<TransportEvent> for Input {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

/// Timers owned by a session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Reveal,
    FloorCooldown,
}

/// Work the state machine asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestPermission {
        request: RequestId,
        kind: MediaKind,
    },
    SetMicrophoneEnabled {
        op: OpId,
        enabled: bool,
    },
    PublishData {
        op: OpId,
        payload: Vec<u8>,
    },
    /// Replaces any pending reveal timer.
    ScheduleReveal {
        generation: u64,
        delay: Duration,
    },
    /// Replaces any pending cool-down timer.
    ScheduleFloorCooldown {
        generation: u64,
        delay: Duration,
    },
    CancelTimer(TimerKind),
    Notify(SessionNotice),
}

/// Signals surfaced to the surrounding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    AgentJoined { identity: String },
    /// The agent left. The surrounding system ends the session on this.
    AgentDeparted { identity: String },
    PermissionDenied { reason: String },
}
