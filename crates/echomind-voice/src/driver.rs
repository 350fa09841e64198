//! Tokio driver for a [`Session`].
//!
//! The driver is the single event loop that owns the session. Transport
//! events, user commands and completions of its own background work all
//! arrive on channels and are applied in arrival order. Effects emitted by
//! the session are executed on a `JoinSet`, so every timer and in-flight
//! transport call can be aborted when the session ends.

use crate::error::SessionError;
use crate::event::{Effect, Input, OpId, SessionNotice, TimerKind, TransportEvent};
use crate::session::{Session, SessionSnapshot, ToggleOutcome};
use crate::transport::Transport;
use echomind_types::PermissionState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Capacity of the session notice broadcast channel.
const NOTICE_BROADCAST_CAPACITY: usize = 64;

enum Command {
    ToggleMicrophone(oneshot::Sender<Result<ToggleOutcome, SessionError>>),
    SendText {
        text: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    RequestMicrophoneAccess(oneshot::Sender<Result<PermissionState, SessionError>>),
    Clear,
    Shutdown,
}

/// Cloneable command surface of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionSnapshot>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)
    }

    pub async fn toggle_microphone(&self) -> Result<ToggleOutcome, SessionError> {
        self.request(Command::ToggleMicrophone).await?
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendText { text, reply })
            .await?
    }

    pub async fn request_microphone_access(&self) -> Result<PermissionState, SessionError> {
        self.request(Command::RequestMicrophoneAccess).await?
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Clear)
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Latest published state.
    pub fn state(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Asks the driver to tear the session down. A no-op if it already stopped.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct SessionDriver {
    id: Uuid,
    session: Session,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Input>,
    completions_rx: mpsc::UnboundedReceiver<Input>,
    microphone_tx: Option<mpsc::UnboundedSender<(OpId, bool)>>,
    publish_tx: Option<mpsc::UnboundedSender<(OpId, Vec<u8>)>>,
    tasks: JoinSet<()>,
    timers: HashMap<TimerKind, AbortHandle>,
    state_tx: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionDriver {
    pub fn new(
        session: Session,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, SessionHandle) {
        let id = Uuid::new_v4();
        let (commands_tx, commands) = mpsc::channel(session.config().command_buffer.max(1));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(session.snapshot());
        let (notices, _) = broadcast::channel(NOTICE_BROADCAST_CAPACITY);

        let handle = SessionHandle {
            id,
            commands: commands_tx,
            state: state_rx,
            notices: notices.clone(),
        };

        let driver = Self {
            id,
            session,
            transport,
            events,
            commands,
            completions_tx,
            completions_rx,
            microphone_tx: None,
            publish_tx: None,
            tasks: JoinSet::new(),
            timers: HashMap::new(),
            state_tx,
            notices,
        };

        (driver, handle)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Runs the driver on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let span = info_span!(
            "voice_session",
            session_id = %self.id,
            identity = %self.session.local_identity(),
        );
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) {
        info!("voice session started");
        self.start_workers();
        // Effects queued before the loop started, e.g. by a pre-connected session.
        let mut flow = self.apply_effects();
        self.publish_state();

        while flow == Flow::Continue {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                event = self.events.recv() => match event {
                    Some(event) => self.session.handle(event.into()),
                    None => {
                        info!("transport event stream closed");
                        break;
                    }
                },
                Some(input) = self.completions_rx.recv() => self.session.handle(input),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if !e.is_cancelled() {
                            error!("session task failed: {}", e);
                        }
                    }
                }
            }

            flow = self.apply_effects();
            self.publish_state();
        }

        self.teardown();
    }

    /// Starts the workers that perform microphone and publish calls one at
    /// a time, in the order the session issued them.
    fn start_workers(&mut self) {
        let (microphone_tx, mut microphone_rx) = mpsc::unbounded_channel::<(OpId, bool)>();
        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        self.tasks.spawn(async move {
            while let Some((op, enabled)) = microphone_rx.recv().await {
                let result = transport.set_local_microphone_enabled(enabled).await;
                if completions
                    .send(Input::MicrophoneSettled { op, result })
                    .is_err()
                {
                    break;
                }
            }
        });
        self.microphone_tx = Some(microphone_tx);

        let (publish_tx, mut publish_rx) = mpsc::unbounded_channel::<(OpId, Vec<u8>)>();
        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        self.tasks.spawn(async move {
            while let Some((op, payload)) = publish_rx.recv().await {
                let result = transport.publish_data(payload).await;
                if completions
                    .send(Input::PublishSettled { op, result })
                    .is_err()
                {
                    break;
                }
            }
        });
        self.publish_tx = Some(publish_tx);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ToggleMicrophone(reply) => {
                let _ = reply.send(self.session.toggle_microphone());
            }
            Command::SendText { text, reply } => {
                let _ = reply.send(self.session.send_text(&text));
            }
            Command::RequestMicrophoneAccess(reply) => {
                let _ = reply.send(self.session.request_microphone_access());
            }
            Command::Clear => self.session.clear(),
            Command::Shutdown => {}
        }
    }

    fn apply_effects(&mut self) -> Flow {
        let mut flow = Flow::Continue;

        for effect in self.session.take_effects() {
            match effect {
                Effect::RequestPermission { request, kind } => {
                    let transport = Arc::clone(&self.transport);
                    let completions = self.completions_tx.clone();
                    self.tasks.spawn(async move {
                        let outcome = transport.request_media_permission(kind).await;
                        let _ = completions.send(Input::PermissionResolved { request, outcome });
                    });
                }
                Effect::SetMicrophoneEnabled { op, enabled } => {
                    if let Some(tx) = &self.microphone_tx {
                        if tx.send((op, enabled)).is_err() {
                            warn!(op, "microphone worker is gone");
                        }
                    }
                }
                Effect::PublishData { op, payload } => {
                    if let Some(tx) = &self.publish_tx {
                        if tx.send((op, payload)).is_err() {
                            warn!(op, "publish worker is gone");
                        }
                    }
                }
                Effect::ScheduleReveal { generation, delay } => {
                    self.schedule(TimerKind::Reveal, delay, Input::RevealTick { generation });
                }
                Effect::ScheduleFloorCooldown { generation, delay } => {
                    self.schedule(
                        TimerKind::FloorCooldown,
                        delay,
                        Input::FloorCooldownElapsed { generation },
                    );
                }
                Effect::CancelTimer(kind) => self.cancel(kind),
                Effect::Notify(notice) => {
                    if let SessionNotice::AgentDeparted { identity } = &notice {
                        info!(identity = identity.as_str(), "agent departed, ending session");
                        flow = Flow::Stop;
                    }
                    // No subscribers is fine.
                    let _ = self.notices.send(notice);
                }
            }
        }

        flow
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration, input: Input) {
        self.cancel(kind);
        let completions = self.completions_tx.clone();
        let handle = self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = completions.send(input);
        });
        self.timers.insert(kind, handle);
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.timers.remove(&kind) {
            handle.abort();
        }
    }

    fn publish_state(&self) {
        let session = &self.session;
        self.state_tx.send_if_modified(|current| {
            if session.is_reflected_in(current) {
                false
            } else {
                *current = session.snapshot();
                true
            }
        });
    }

    fn teardown(&mut self) {
        self.session.teardown();
        self.session.take_effects();
        self.timers.clear();
        self.microphone_tx = None;
        self.publish_tx = None;
        self.tasks.abort_all();
        self.commands.close();
        self.publish_state();
        debug!(aborted = self.tasks.len(), "session tasks aborted");
        info!("voice session ended");
    }
}
