//! Half-duplex turn-taking.
//!
//! The controller owns the local microphone state and decides who holds the
//! floor. Microphone changes are applied optimistically and confirmed or
//! rolled back when the transport settles the operation. Operations settle
//! in the order they were issued.

use crate::error::{SessionError, TransportError};
use crate::event::OpId;
use echomind_types::{MicrophoneState, TurnState};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// What put the agent on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorCause {
    /// The agent published its microphone track. Cleared by unpublish.
    Track,
    /// The agent sent a data message. Cleared by the cool-down of this generation.
    Message { generation: u64 },
}

/// A microphone operation the transport must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicCommand {
    pub op: OpId,
    pub enabled: bool,
}

/// Result of the agent taking the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloorTaken {
    /// Forced microphone shutdown, if the microphone was on.
    pub mic: Option<MicCommand>,
    /// Cool-down generation to schedule, for message-driven floors.
    pub cooldown: Option<u64>,
}

/// How a settled microphone operation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    RolledBack,
    /// A forced shutdown failed; the state stays disabled.
    ForcedFailed,
    /// A later operation was issued before this one settled, or the
    /// operation is unknown. Only the transport's confirmed state is updated.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct PendingOp {
    op: OpId,
    enabled: bool,
    forced: bool,
}

#[derive(Debug, Default)]
pub struct TurnController {
    turn: TurnState,
    mic: MicrophoneState,
    /// Last microphone state the transport acknowledged.
    confirmed_mic: MicrophoneState,
    next_op: OpId,
    /// Issued and not yet settled, oldest first.
    pending: VecDeque<PendingOp>,
    floor: Option<FloorCause>,
    cooldown_generation: u64,
    auto_enabled: bool,
}

impl TurnController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn microphone(&self) -> MicrophoneState {
        self.mic
    }

    pub fn agent_speaking(&self) -> bool {
        self.turn == TurnState::AgentSpeaking
    }

    /// True once the one-time auto-enable has fired for this session.
    pub fn auto_enable_fired(&self) -> bool {
        self.auto_enabled
    }

    /// Consumes the auto-enable latch. Returns `true` only the first time.
    pub fn take_auto_enable(&mut self) -> bool {
        !std::mem::replace(&mut self.auto_enabled, true)
    }

    fn issue(&mut self, enabled: bool, forced: bool) -> MicCommand {
        self.next_op += 1;
        let op = self.next_op;
        self.pending.push_back(PendingOp {
            op,
            enabled,
            forced,
        });
        self.mic = MicrophoneState::from_enabled(enabled);
        MicCommand { op, enabled }
    }

    /// User takes the floor. Refused while the agent is speaking.
    pub fn enable(&mut self) -> Result<MicCommand, SessionError> {
        if self.agent_speaking() {
            info!("agent is speaking, refusing to enable microphone");
            return Err(SessionError::AgentSpeaking);
        }
        let command = self.issue(true, false);
        self.turn = TurnState::UserSpeaking;
        info!(op = command.op, "microphone enabled, user speaking");
        Ok(command)
    }

    /// User gives up the floor.
    pub fn disable(&mut self) -> MicCommand {
        let command = self.issue(false, false);
        if self.turn == TurnState::UserSpeaking {
            self.turn = TurnState::Idle;
        }
        info!(op = command.op, "microphone disabled");
        command
    }

    /// Forces the microphone off without giving the user a rollback path.
    /// Returns `None` when it is already off.
    pub fn force_disable(&mut self) -> Option<MicCommand> {
        if !self.mic.is_enabled() {
            // A pending disable must not roll back to enabled.
            if let Some(last) = self.pending.back_mut() {
                last.forced = true;
            }
            return None;
        }
        let command = self.issue(false, true);
        if self.turn == TurnState::UserSpeaking {
            self.turn = TurnState::Idle;
        }
        Some(command)
    }

    /// The agent takes the floor, shutting the local microphone.
    pub fn agent_took_floor(&mut self, via_message: bool) -> FloorTaken {
        let mic = self.force_disable();
        if let Some(command) = mic {
            info!(op = command.op, "agent is speaking, microphone forced off");
        }
        self.turn = TurnState::AgentSpeaking;

        let cooldown = if via_message {
            self.cooldown_generation += 1;
            self.floor = Some(FloorCause::Message {
                generation: self.cooldown_generation,
            });
            Some(self.cooldown_generation)
        } else {
            self.floor = Some(FloorCause::Track);
            None
        };

        debug!(floor = ?self.floor, "agent holds the floor");
        FloorTaken { mic, cooldown }
    }

    /// The agent's track went away. The microphone is not re-enabled.
    pub fn agent_released_floor(&mut self) -> bool {
        if !self.agent_speaking() {
            return false;
        }
        info!("agent stopped speaking");
        self.turn = TurnState::Idle;
        self.floor = None;
        true
    }

    /// The message cool-down elapsed. Clears the floor if it is still the
    /// one this generation put there.
    pub fn cooldown_elapsed(&mut self, generation: u64) -> bool {
        if self.floor != Some(FloorCause::Message { generation }) {
            debug!(generation, "stale floor cool-down");
            return false;
        }
        debug!(generation, "agent floor cool-down elapsed");
        self.turn = TurnState::Idle;
        self.floor = None;
        true
    }

    /// Applies the transport's answer to a microphone operation.
    ///
    /// Only the latest operation moves the visible state. A failure rolls
    /// back to the state the transport last confirmed, not to the optimistic
    /// value the operation replaced.
    pub fn settle(&mut self, op: OpId, result: &Result<(), TransportError>) -> Settlement {
        let Some(position) = self.pending.iter().position(|pending| pending.op == op) else {
            debug!(op, "ignoring unknown microphone operation");
            return Settlement::Stale;
        };
        let Some(settled) = self.pending.drain(..=position).last() else {
            return Settlement::Stale;
        };

        if result.is_ok() {
            self.confirmed_mic = MicrophoneState::from_enabled(settled.enabled);
        }
        if !self.pending.is_empty() {
            if let Err(e) = result {
                debug!(op, "superseded microphone operation failed: {}", e);
            }
            return Settlement::Stale;
        }

        match result {
            Ok(()) => Settlement::Confirmed,
            Err(e) if settled.forced || self.agent_speaking() => {
                error!(op, "failed to force microphone off: {}", e);
                Settlement::ForcedFailed
            }
            Err(e) => {
                warn!(
                    op,
                    restored = ?self.confirmed_mic,
                    "microphone operation failed, rolling back: {}",
                    e
                );
                self.mic = self.confirmed_mic;
                if self.mic.is_enabled() {
                    self.turn = TurnState::UserSpeaking;
                } else if self.turn == TurnState::UserSpeaking {
                    self.turn = TurnState::Idle;
                }
                Settlement::RolledBack
            }
        }
    }

    /// Session disconnected: back to idle with the microphone off.
    pub fn reset(&mut self) {
        self.turn = TurnState::Idle;
        self.mic = MicrophoneState::Disabled;
        self.confirmed_mic = MicrophoneState::Disabled;
        self.pending.clear();
        self.floor = None;
        self.auto_enabled = false;
    }

    /// Invariant: the agent never holds the floor while the microphone is on.
    pub fn invariants_hold(&self) -> bool {
        !(self.turn == TurnState::AgentSpeaking && self.mic.is_enabled())
            && (self.turn != TurnState::UserSpeaking || self.mic.is_enabled())
    }
}
