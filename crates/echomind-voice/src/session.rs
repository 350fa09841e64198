//! Session facade.
//!
//! [`Session`] is a synchronous state machine: transport events and
//! completions go in through [`Session::handle`], commands are plain method
//! calls, and all outbound work is queued as [`Effect`]s for the driver to
//! execute. Every asynchronous effect carries an id or generation so that a
//! completion arriving after the state moved on is discarded.

use crate::config::SessionConfig;
use crate::error::{PermissionOutcome, SessionError, TransportError};
use crate::event::{Effect, Input, OpId, RequestId, SessionNotice, TimerKind, TransportEvent};
use crate::permission::{PermissionGate, PermissionIntent};
use crate::presence::{PresenceChange, PresenceTracker};
use crate::transcript::{extract_content, RevealStep, SenderCertainty, TranscriptAssembler};
use crate::turn::{MicCommand, TurnController};
use echomind_types::{
    ConnectionState, DataMessage, MediaKind, MicrophoneState, ParticipantRole, PermissionState,
    Speaker, TrackSource, TranscriptEntry, TurnPhase, TurnState, UserProfile,
    DATA_MESSAGE_ROLE_USER,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

/// What a microphone toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Enabled,
    Disabled,
    /// A permission prompt is in flight; the microphone is enabled if it is granted.
    AwaitingPermission,
}

/// Externally observable session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    pub agent_present: bool,
    pub microphone: MicrophoneState,
    pub permission: PermissionState,
    pub turn: TurnState,
    pub phase: TurnPhase,
    pub transcript: Vec<TranscriptEntry>,
    /// Advisory from the last permission denial.
    pub advisory: Option<String>,
    /// Revision of `transcript`, used to skip rebuilding an unchanged log.
    #[serde(skip)]
    pub transcript_revision: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::default(),
            agent_present: false,
            microphone: MicrophoneState::default(),
            permission: PermissionState::default(),
            turn: TurnState::default(),
            phase: TurnPhase::Idle,
            transcript: Vec::new(),
            advisory: None,
            transcript_revision: 0,
        }
    }
}

pub struct Session {
    config: SessionConfig,
    profile: Option<UserProfile>,
    connection: ConnectionState,
    /// Bumped on every disconnect; intents from an older epoch are stale.
    epoch: u64,
    permission: PermissionGate,
    presence: PresenceTracker,
    turn: TurnController,
    transcript: TranscriptAssembler,
    next_publish: OpId,
    effects: Vec<Effect>,
    closed: bool,
}

impl Session {
    pub fn new(local_identity: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            config,
            profile: None,
            connection: ConnectionState::Disconnected,
            epoch: 0,
            permission: PermissionGate::new(),
            presence: PresenceTracker::new(local_identity),
            turn: TurnController::new(),
            transcript: TranscriptAssembler::new(),
            next_publish: 0,
            effects: Vec::new(),
            closed: false,
        }
    }

    /// Attaches the profile sent along with every outbound message.
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_identity(&self) -> &str {
        self.presence.local_identity()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let turn = self.turn.turn();
        let permission = self.permission.state();
        SessionSnapshot {
            connection_state: self.connection,
            agent_present: self.presence.agent_present(),
            microphone: self.turn.microphone(),
            permission,
            turn,
            phase: TurnPhase::derive(turn, permission),
            transcript: self.transcript.entries().to_vec(),
            advisory: self.permission.advisory().map(str::to_string),
            transcript_revision: self.transcript.revision(),
        }
    }

    /// True when `snapshot` already shows the current state. Compares the
    /// transcript by revision, so nothing is cloned.
    pub fn is_reflected_in(&self, snapshot: &SessionSnapshot) -> bool {
        let turn = self.turn.turn();
        let permission = self.permission.state();
        snapshot.transcript_revision == self.transcript.revision()
            && snapshot.connection_state == self.connection
            && snapshot.agent_present == self.presence.agent_present()
            && snapshot.microphone == self.turn.microphone()
            && snapshot.permission == permission
            && snapshot.turn == turn
            && snapshot.phase == TurnPhase::derive(turn, permission)
            && snapshot.advisory.as_deref() == self.permission.advisory()
    }

    /// Drains the work queued since the last call.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Half-duplex and push-to-talk invariants over the current state.
    pub fn invariants_hold(&self) -> bool {
        self.turn.invariants_hold()
            && (!self.turn.microphone().is_enabled() || self.permission.is_granted())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn push_mic(&mut self, command: MicCommand) {
        self.effects.push(Effect::SetMicrophoneEnabled {
            op: command.op,
            enabled: command.enabled,
        });
    }

    fn push_permission_request(&mut self, request: RequestId) {
        self.effects.push(Effect::RequestPermission {
            request,
            kind: MediaKind::Audio,
        });
    }

    fn append_entry(&mut self, speaker: Speaker, text: &str) {
        // Appending flushes a streaming tail, so its reveal timer is dead.
        let was_streaming = self.transcript.is_streaming();
        if self.transcript.append(speaker, text, true) && was_streaming {
            self.effects.push(Effect::CancelTimer(TimerKind::Reveal));
        }
    }

    fn push_reveal(&mut self, step: RevealStep) {
        let effect = match step {
            RevealStep::Idle => return,
            RevealStep::Tick { generation } => Effect::ScheduleReveal {
                generation,
                delay: self.config.reveal_interval(),
            },
            RevealStep::Restart { generation } => Effect::ScheduleReveal {
                generation,
                delay: self.config.reveal_restart_delay(),
            },
        };
        self.effects.push(effect);
    }

    // Commands

    /// Flips the local microphone.
    ///
    /// Refused while the agent holds the floor. When permission has not been
    /// granted a prompt is issued and the microphone is enabled once the
    /// grant arrives.
    pub fn toggle_microphone(&mut self) -> Result<ToggleOutcome, SessionError> {
        self.ensure_open()?;

        if self.turn.agent_speaking() {
            info!("toggle refused, agent is speaking");
            return Err(SessionError::AgentSpeaking);
        }

        // Muting never depends on the connection.
        if self.turn.microphone().is_enabled() {
            let command = self.turn.disable();
            self.push_mic(command);
            return Ok(ToggleOutcome::Disabled);
        }

        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }

        if !self.permission.is_granted() {
            if let Some(request) = self
                .permission
                .begin(PermissionIntent::EnableMicrophone, self.epoch)
            {
                self.push_permission_request(request);
            }
            return Ok(ToggleOutcome::AwaitingPermission);
        }

        let command = self.turn.enable()?;
        self.push_mic(command);
        Ok(ToggleOutcome::Enabled)
    }

    /// Prompts for microphone access unless it is already granted or a
    /// prompt is in flight. Returns the cached state.
    pub fn request_microphone_access(&mut self) -> Result<PermissionState, SessionError> {
        self.ensure_open()?;
        if let Some(request) = self.permission.begin(PermissionIntent::Probe, self.epoch) {
            self.push_permission_request(request);
        }
        Ok(self.permission.state())
    }

    /// Echoes `text` into the transcript and publishes it to the room.
    pub fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.ensure_open()?;

        if text.trim().is_empty() {
            debug!("refusing to send empty message");
            return Err(SessionError::EmptyMessage);
        }
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = DataMessage::user(text, self.profile.as_ref(), timestamp).to_bytes()?;

        self.append_entry(Speaker::User, text);

        self.next_publish += 1;
        let op = self.next_publish;
        debug!(op, bytes = payload.len(), "publishing user message");
        self.effects.push(Effect::PublishData { op, payload });
        Ok(())
    }

    /// Empties the transcript.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.effects.push(Effect::CancelTimer(TimerKind::Reveal));
    }

    /// Drops all state and cancels every timer. Later inputs are ignored.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        info!(identity = self.local_identity(), "tearing down session");
        self.closed = true;
        self.epoch += 1;
        self.transcript.clear();
        self.turn.reset();
        self.presence.reset();
        self.effects.push(Effect::CancelTimer(TimerKind::Reveal));
        self.effects.push(Effect::CancelTimer(TimerKind::FloorCooldown));
    }

    // Inputs

    /// Advances the state machine by one input.
    pub fn handle(&mut self, input: Input) {
        if self.closed {
            trace!(?input, "session closed, dropping input");
            return;
        }

        match input {
            Input::Transport(event) => self.on_transport_event(event),
            Input::PermissionResolved { request, outcome } => {
                self.on_permission_resolved(request, outcome)
            }
            Input::MicrophoneSettled { op, result } => {
                self.turn.settle(op, &result);
            }
            Input::PublishSettled { op, result } => self.on_publish_settled(op, result),
            Input::RevealTick { generation } => {
                let step = self.transcript.tick(generation);
                self.push_reveal(step);
            }
            Input::FloorCooldownElapsed { generation } => {
                self.turn.cooldown_elapsed(generation);
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStateChanged(state) => self.on_connection_state(state),
            TransportEvent::ParticipantJoined { identity, metadata } => {
                if let Some(PresenceChange::AgentArrived(identity)) =
                    self.presence.joined(&identity, metadata.as_deref())
                {
                    self.effects
                        .push(Effect::Notify(SessionNotice::AgentJoined { identity }));
                }
            }
            TransportEvent::ParticipantLeft { identity, metadata } => {
                if let Some(PresenceChange::AgentDeparted(identity)) =
                    self.presence.left(&identity, metadata.as_deref())
                {
                    if self.turn.agent_released_floor() {
                        self.effects
                            .push(Effect::CancelTimer(TimerKind::FloorCooldown));
                    }
                    self.effects
                        .push(Effect::Notify(SessionNotice::AgentDeparted { identity }));
                }
            }
            TransportEvent::TrackPublished {
                participant,
                source,
            } => {
                if self.is_agent_microphone(&participant, source) {
                    debug!(participant = %participant, "agent microphone track published");
                    self.agent_takes_floor(false);
                }
            }
            TransportEvent::TrackUnpublished {
                participant,
                source,
            } => {
                if self.is_agent_microphone(&participant, source)
                    && self.turn.agent_released_floor()
                {
                    self.effects
                        .push(Effect::CancelTimer(TimerKind::FloorCooldown));
                }
            }
            TransportEvent::DataReceived { sender, payload } => {
                self.on_data_received(sender, &payload)
            }
            TransportEvent::TranscriptionSegment { text, is_final } => {
                let step = self.transcript.replace_streaming_tail(&text, is_final);
                self.push_reveal(step);
            }
        }
    }

    /// Microphone tracks from remote participants not known to be someone
    /// other than the agent.
    fn is_agent_microphone(&self, participant: &str, source: TrackSource) -> bool {
        if source != TrackSource::Microphone {
            trace!(participant, ?source, "ignoring non-microphone track");
            return false;
        }
        match self.presence.role_of(participant) {
            Some(ParticipantRole::Local) | Some(ParticipantRole::RemoteOther) => false,
            Some(ParticipantRole::RemoteAgent) | None => true,
        }
    }

    fn agent_takes_floor(&mut self, via_message: bool) {
        let taken = self.turn.agent_took_floor(via_message);
        if let Some(command) = taken.mic {
            self.push_mic(command);
        }
        match taken.cooldown {
            Some(generation) => self.effects.push(Effect::ScheduleFloorCooldown {
                generation,
                delay: self.config.agent_floor_cooldown(),
            }),
            None => self
                .effects
                .push(Effect::CancelTimer(TimerKind::FloorCooldown)),
        }
    }

    fn on_connection_state(&mut self, state: ConnectionState) {
        let previous = std::mem::replace(&mut self.connection, state);
        if previous == state {
            return;
        }
        info!(?previous, current = ?state, "connection state changed");

        match state {
            ConnectionState::Connected => {
                if self.permission.state() == PermissionState::Unknown {
                    if let Some(request) =
                        self.permission.begin(PermissionIntent::Probe, self.epoch)
                    {
                        self.push_permission_request(request);
                    }
                } else {
                    self.maybe_auto_enable();
                }
            }
            ConnectionState::Disconnected => self.reset_for_disconnect(),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
        }
    }

    fn reset_for_disconnect(&mut self) {
        self.epoch += 1;
        self.turn.reset();
        self.presence.reset();
        self.transcript.flush();
        self.effects.push(Effect::CancelTimer(TimerKind::Reveal));
        self.effects.push(Effect::CancelTimer(TimerKind::FloorCooldown));
        debug!(epoch = self.epoch, "session reset after disconnect");
    }

    /// Enables the microphone once per connected session, after permission
    /// has been granted.
    fn maybe_auto_enable(&mut self) {
        if !self.config.auto_enable_microphone
            || !self.connection.is_connected()
            || !self.permission.is_granted()
            || self.turn.auto_enable_fired()
            || self.turn.agent_speaking()
            || self.turn.microphone().is_enabled()
        {
            return;
        }
        self.turn.take_auto_enable();
        if let Ok(command) = self.turn.enable() {
            info!("auto-enabling microphone");
            self.push_mic(command);
        }
    }

    fn on_permission_resolved(&mut self, request: RequestId, outcome: PermissionOutcome) {
        let Some(pending) =
            self.permission
                .resolve(request, &outcome, &self.config.permission_denied_message)
        else {
            return;
        };

        match outcome {
            PermissionOutcome::Granted => {
                let still_wanted = pending.intent == PermissionIntent::EnableMicrophone
                    && pending.epoch == self.epoch
                    && self.connection.is_connected()
                    && self.turn.turn() == TurnState::Idle
                    && !self.turn.microphone().is_enabled();

                if still_wanted {
                    self.turn.take_auto_enable();
                    if let Ok(command) = self.turn.enable() {
                        self.push_mic(command);
                    }
                } else {
                    if pending.intent == PermissionIntent::EnableMicrophone {
                        debug!(request, "grant arrived after the toggle went stale");
                    }
                    self.maybe_auto_enable();
                }
            }
            PermissionOutcome::Denied { .. } => {
                if let Some(command) = self.turn.force_disable() {
                    self.push_mic(command);
                }
                let reason = self
                    .permission
                    .advisory()
                    .unwrap_or(self.config.permission_denied_message.as_str())
                    .to_string();
                self.effects
                    .push(Effect::Notify(SessionNotice::PermissionDenied { reason }));
            }
        }
    }

    fn on_publish_settled(&mut self, op: OpId, result: Result<(), TransportError>) {
        match result {
            Ok(()) => trace!(op, "message published"),
            // The local echo stays; the log is append-only.
            Err(e) => warn!(op, "failed to publish message: {}", e),
        }
    }

    fn on_data_received(&mut self, sender: Option<String>, payload: &[u8]) {
        if sender.as_deref() == Some(self.local_identity()) {
            trace!("dropping echo of local message");
            return;
        }

        let data: Value = match serde_json::from_slice(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(sender = sender.as_deref(), "failed to parse data message: {}", e);
                return;
            }
        };

        let certainty = match sender {
            Some(ref identity) => {
                debug!(sender = identity.as_str(), "data message from remote participant");
                self.agent_takes_floor(true);
                SenderCertainty::Identified
            }
            None => {
                if data.get("role").and_then(Value::as_str) == Some(DATA_MESSAGE_ROLE_USER) {
                    trace!("dropping unattributed user message");
                    return;
                }
                SenderCertainty::Unidentified
            }
        };

        match extract_content(&data, certainty) {
            Some(content) => self.append_entry(Speaker::Companion, &content),
            None => debug!("discarding data message without content"),
        }
    }
}

#[cfg(test)]
mod tests;
