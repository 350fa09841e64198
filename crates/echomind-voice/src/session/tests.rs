use super::*;
use crate::config::DEFAULT_PERMISSION_DENIED_MESSAGE;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const LOCAL: &str = "identity-me01";
const AGENT: &str = "agent-AJ_1";

fn connected_session(config: SessionConfig) -> Session {
    let mut session = Session::new(LOCAL, config);
    session.handle(TransportEvent::ConnectionStateChanged(ConnectionState::Connected).into());
    session
}

/// Connected, with microphone permission granted and no auto-enable.
fn ready_session() -> Session {
    let config = SessionConfig {
        auto_enable_microphone: false,
        ..SessionConfig::default()
    };
    let mut session = connected_session(config);
    let request = permission_request(&session.take_effects()).unwrap();
    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });
    session.take_effects();
    session
}

fn permission_request(effects: &[Effect]) -> Option<RequestId> {
    effects.iter().find_map(|e| match e {
        Effect::RequestPermission { request, .. } => Some(*request),
        _ => None,
    })
}

fn mic_commands(effects: &[Effect]) -> Vec<(OpId, bool)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::SetMicrophoneEnabled { op, enabled } => Some((*op, *enabled)),
            _ => None,
        })
        .collect()
}

fn publishes(effects: &[Effect]) -> Vec<&[u8]> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::PublishData { payload, .. } => Some(payload.as_slice()),
            _ => None,
        })
        .collect()
}

fn data_from(sender: Option<&str>, payload: Value) -> Input {
    TransportEvent::DataReceived {
        sender: sender.map(str::to_string),
        payload: serde_json::to_vec(&payload).unwrap(),
    }
    .into()
}

fn agent_mic_published() -> Input {
    TransportEvent::TrackPublished {
        participant: AGENT.to_string(),
        source: TrackSource::Microphone,
    }
    .into()
}

fn agent_mic_unpublished() -> Input {
    TransportEvent::TrackUnpublished {
        participant: AGENT.to_string(),
        source: TrackSource::Microphone,
    }
    .into()
}

fn reveal_generation(effects: &[Effect]) -> Option<u64> {
    effects.iter().rev().find_map(|e| match e {
        Effect::ScheduleReveal { generation, .. } => Some(*generation),
        _ => None,
    })
}

fn run_reveal(session: &mut Session, mut effects: Vec<Effect>) {
    while let Some(generation) = reveal_generation(&effects) {
        session.handle(Input::RevealTick { generation });
        effects = session.take_effects();
    }
}

fn transcript_pairs(session: &Session) -> Vec<(Speaker, String)> {
    session
        .transcript()
        .iter()
        .map(|e| (e.speaker, e.text.clone()))
        .collect()
}

#[test]
fn toggle_with_unknown_permission_requests_then_enables() {
    let config = SessionConfig {
        auto_enable_microphone: false,
        ..SessionConfig::default()
    };
    let mut session = Session::new(LOCAL, config);
    session.connection = ConnectionState::Connected;

    let outcome = session.toggle_microphone().unwrap();
    assert_eq!(outcome, ToggleOutcome::AwaitingPermission);

    let effects = session.take_effects();
    let request = permission_request(&effects).expect("permission prompt");
    assert!(mic_commands(&effects).is_empty());
    assert_eq!(session.snapshot().microphone, MicrophoneState::Disabled);

    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });
    let effects = session.take_effects();
    assert_eq!(mic_commands(&effects).len(), 1);
    assert!(mic_commands(&effects)[0].1);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.microphone, MicrophoneState::Enabled);
    assert_eq!(snapshot.turn, TurnState::UserSpeaking);
    assert_eq!(snapshot.phase, TurnPhase::UserSpeaking);
}

#[test]
fn agent_track_forces_microphone_off() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    session.take_effects();

    session.handle(agent_mic_published());
    let effects = session.take_effects();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.turn, TurnState::AgentSpeaking);
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert_eq!(
        mic_commands(&effects).iter().map(|c| c.1).collect::<Vec<_>>(),
        vec![false]
    );
}

#[test]
fn toggle_is_refused_while_agent_speaks() {
    let mut session = ready_session();
    session.handle(agent_mic_published());
    session.take_effects();
    let before = session.snapshot();

    let err = session.toggle_microphone().unwrap_err();
    assert!(matches!(err, SessionError::AgentSpeaking));
    assert_eq!(err.to_string(), "agent is speaking");
    assert_eq!(session.snapshot(), before);
    assert!(session.take_effects().is_empty());
}

#[test]
fn agent_track_unpublish_does_not_re_enable() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    session.handle(agent_mic_published());
    session.handle(agent_mic_unpublished());
    session.take_effects();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.turn, TurnState::Idle);
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert_eq!(
        session.toggle_microphone().unwrap(),
        ToggleOutcome::Enabled
    );
}

#[test]
fn camera_tracks_do_not_affect_turns() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    session.handle(
        TransportEvent::TrackPublished {
            participant: AGENT.to_string(),
            source: TrackSource::Camera,
        }
        .into(),
    );
    assert_eq!(session.snapshot().turn, TurnState::UserSpeaking);
}

#[test]
fn tracks_from_non_agent_participants_are_ignored() {
    let mut session = ready_session();
    session.handle(
        TransportEvent::ParticipantJoined {
            identity: "guest".to_string(),
            metadata: Some(r#"{"role":"viewer"}"#.to_string()),
        }
        .into(),
    );
    session.toggle_microphone().unwrap();
    session.handle(
        TransportEvent::TrackPublished {
            participant: "guest".to_string(),
            source: TrackSource::Microphone,
        }
        .into(),
    );
    assert_eq!(session.snapshot().turn, TurnState::UserSpeaking);
}

#[test]
fn remote_data_appends_companion_entry_and_local_echo_is_dropped() {
    let mut session = ready_session();
    session.handle(data_from(Some(AGENT), json!({"content": "Hi"})));
    assert_eq!(
        transcript_pairs(&session),
        vec![(Speaker::Companion, "Hi".to_string())]
    );

    session.handle(data_from(Some(LOCAL), json!({"content": "Hi"})));
    assert_eq!(session.transcript().len(), 1);
}

#[test]
fn streaming_segments_animate_only_the_suffix() {
    let mut session = ready_session();

    session.handle(
        TransportEvent::TranscriptionSegment {
            text: "Hel".to_string(),
            is_final: false,
        }
        .into(),
    );
    let effects = session.take_effects();
    assert!(matches!(
        effects.last(),
        Some(Effect::ScheduleReveal { delay, .. }) if *delay == session.config().reveal_restart_delay()
    ));
    run_reveal(&mut session, effects);
    assert_eq!(session.transcript()[0].text, "Hel");

    session.handle(
        TransportEvent::TranscriptionSegment {
            text: "Hello".to_string(),
            is_final: false,
        }
        .into(),
    );
    let mut effects = session.take_effects();
    assert!(matches!(
        effects.last(),
        Some(Effect::ScheduleReveal { delay, .. }) if *delay == session.config().reveal_interval()
    ));

    let mut frames = Vec::new();
    while let Some(generation) = reveal_generation(&effects) {
        session.handle(Input::RevealTick { generation });
        frames.push(session.transcript()[0].text.clone());
        effects = session.take_effects();
    }
    assert_eq!(frames, vec!["Hell", "Hello"]);
    assert_eq!(session.transcript().len(), 1);
}

#[test]
fn send_text_echoes_once_and_ignores_round_trip() {
    let mut session = ready_session();
    session.send_text("hello").unwrap();

    let effects = session.take_effects();
    let sent = publishes(&effects);
    assert_eq!(sent.len(), 1);

    let echoed: Value = serde_json::from_slice(sent[0]).unwrap();
    assert_eq!(echoed["type"], "message");
    assert_eq!(echoed["role"], "user");
    assert_eq!(echoed["content"], "hello");

    session.handle(TransportEvent::DataReceived {
        sender: Some(LOCAL.to_string()),
        payload: sent[0].to_vec(),
    }
    .into());

    assert_eq!(
        transcript_pairs(&session),
        vec![(Speaker::User, "hello".to_string())]
    );
    assert!(session.transcript()[0].is_final);
}

#[test]
fn send_text_carries_profile() {
    let mut session = ready_session().with_profile(UserProfile {
        name: "Ada".to_string(),
        goal: "practice".to_string(),
    });
    session.send_text("hi").unwrap();
    let effects = session.take_effects();
    let message: Value = serde_json::from_slice(publishes(&effects)[0]).unwrap();

    assert_eq!(message["name"], "Ada");
    assert_eq!(message["goal"], "practice");
    assert_eq!(message["metadata"]["name"], "Ada");
    assert!(message["timestamp"].as_i64().unwrap() > 0);
}

#[test]
fn empty_send_text_does_nothing() {
    let mut session = ready_session();
    for text in ["", "   "] {
        assert!(matches!(
            session.send_text(text),
            Err(SessionError::EmptyMessage)
        ));
    }
    assert!(session.transcript().is_empty());
    assert!(session.take_effects().is_empty());
}

#[test]
fn send_text_requires_connection() {
    let mut session = Session::new(LOCAL, SessionConfig::default());
    assert!(matches!(
        session.send_text("hello"),
        Err(SessionError::NotConnected)
    ));
    assert!(session.transcript().is_empty());
}

#[test]
fn unattributed_messages_fail_open() {
    let mut session = ready_session();
    session.handle(data_from(None, json!({"kind": "note"})));
    session.handle(data_from(None, json!({"text": "from nowhere"})));
    session.handle(data_from(None, json!({"role": "user", "content": "echo"})));

    assert_eq!(
        transcript_pairs(&session),
        vec![
            (Speaker::Companion, r#"{"kind":"note"}"#.to_string()),
            (Speaker::Companion, "from nowhere".to_string()),
        ]
    );
    assert_eq!(session.snapshot().turn, TurnState::Idle);
}

#[test]
fn malformed_payload_is_dropped() {
    let mut session = ready_session();
    session.handle(
        TransportEvent::DataReceived {
            sender: Some(AGENT.to_string()),
            payload: b"not json".to_vec(),
        }
        .into(),
    );
    assert!(session.transcript().is_empty());
    assert_eq!(session.snapshot().turn, TurnState::Idle);
}

#[test]
fn agent_message_takes_floor_until_cooldown() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    session.take_effects();

    session.handle(data_from(Some(AGENT), json!({"content": "Let me answer"})));
    let effects = session.take_effects();
    let generation = effects
        .iter()
        .find_map(|e| match e {
            Effect::ScheduleFloorCooldown { generation, delay } => {
                assert_eq!(*delay, session.config().agent_floor_cooldown());
                Some(*generation)
            }
            _ => None,
        })
        .expect("cool-down scheduled");
    assert_eq!(session.snapshot().turn, TurnState::AgentSpeaking);
    assert_eq!(session.snapshot().microphone, MicrophoneState::Disabled);

    session.handle(Input::FloorCooldownElapsed { generation });
    assert_eq!(session.snapshot().turn, TurnState::Idle);
    assert_eq!(session.snapshot().microphone, MicrophoneState::Disabled);
}

#[test]
fn empty_agent_message_still_takes_the_floor() {
    let mut session = ready_session();
    session.handle(data_from(Some(AGENT), json!({"type": "status"})));
    assert!(session.transcript().is_empty());
    assert_eq!(session.snapshot().turn, TurnState::AgentSpeaking);
}

#[test]
fn auto_enable_fires_once_per_session() {
    let mut session = connected_session(SessionConfig::default());
    let request = permission_request(&session.take_effects()).unwrap();
    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });
    let effects = session.take_effects();
    assert_eq!(mic_commands(&effects).len(), 1);
    assert_eq!(session.snapshot().microphone, MicrophoneState::Enabled);

    session.toggle_microphone().unwrap();
    assert_eq!(session.request_microphone_access().unwrap(), PermissionState::Granted);
    let effects = session.take_effects();
    assert!(permission_request(&effects).is_none());
    assert_eq!(mic_commands(&effects), vec![(2, false)]);
    assert_eq!(session.snapshot().microphone, MicrophoneState::Disabled);
}

#[test]
fn auto_enable_fires_again_after_reconnect() {
    let mut session = connected_session(SessionConfig::default());
    let request = permission_request(&session.take_effects()).unwrap();
    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });

    session.handle(TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected).into());
    session.handle(TransportEvent::ConnectionStateChanged(ConnectionState::Connected).into());
    let effects = session.take_effects();
    assert!(permission_request(&effects).is_none());
    assert_eq!(session.snapshot().microphone, MicrophoneState::Enabled);
}

#[test]
fn requesting_access_twice_when_granted_is_a_no_op() {
    let mut session = ready_session();
    let before = session.snapshot();
    session.request_microphone_access().unwrap();
    session.request_microphone_access().unwrap();
    assert!(session.take_effects().is_empty());
    assert_eq!(session.snapshot(), before);
}

#[test]
fn toggle_during_probe_upgrades_instead_of_prompting_again() {
    let config = SessionConfig {
        auto_enable_microphone: false,
        ..SessionConfig::default()
    };
    let mut session = connected_session(config);
    let request = permission_request(&session.take_effects()).unwrap();

    assert_eq!(
        session.toggle_microphone().unwrap(),
        ToggleOutcome::AwaitingPermission
    );
    assert!(permission_request(&session.take_effects()).is_none());

    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });
    assert_eq!(session.snapshot().turn, TurnState::UserSpeaking);
}

#[test]
fn denial_surfaces_advisory_and_mutes() {
    let mut session = connected_session(SessionConfig::default());
    let request = permission_request(&session.take_effects()).unwrap();
    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Denied {
            reason: String::new(),
        },
    });

    let effects = session.take_effects();
    assert!(effects.contains(&Effect::Notify(SessionNotice::PermissionDenied {
        reason: DEFAULT_PERMISSION_DENIED_MESSAGE.to_string(),
    })));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert_eq!(snapshot.phase, TurnPhase::MutedByPermission);
    assert_eq!(
        snapshot.advisory.as_deref(),
        Some(DEFAULT_PERMISSION_DENIED_MESSAGE)
    );

    // Retrying prompts again, and a grant clears the advisory.
    assert_eq!(
        session.toggle_microphone().unwrap(),
        ToggleOutcome::AwaitingPermission
    );
    let retry = permission_request(&session.take_effects()).unwrap();
    session.handle(Input::PermissionResolved {
        request: retry,
        outcome: PermissionOutcome::Granted,
    });
    let snapshot = session.snapshot();
    assert_eq!(snapshot.advisory, None);
    assert_eq!(snapshot.turn, TurnState::UserSpeaking);
}

#[test]
fn grant_after_disconnect_does_not_enable() {
    let config = SessionConfig {
        auto_enable_microphone: false,
        ..SessionConfig::default()
    };
    let mut session = Session::new(LOCAL, config);
    session.connection = ConnectionState::Connected;
    session.toggle_microphone().unwrap();
    let request = permission_request(&session.take_effects()).unwrap();

    session.handle(TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected).into());
    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });

    assert!(mic_commands(&session.take_effects()).is_empty());
    let snapshot = session.snapshot();
    assert_eq!(snapshot.permission, PermissionState::Granted);
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
}

#[test]
fn grant_while_agent_speaks_does_not_enable() {
    let config = SessionConfig {
        auto_enable_microphone: false,
        ..SessionConfig::default()
    };
    let mut session = connected_session(config);
    let request = permission_request(&session.take_effects()).unwrap();
    session.toggle_microphone().unwrap();
    session.handle(agent_mic_published());

    session.handle(Input::PermissionResolved {
        request,
        outcome: PermissionOutcome::Granted,
    });
    assert_eq!(session.snapshot().turn, TurnState::AgentSpeaking);
    assert_eq!(session.snapshot().microphone, MicrophoneState::Disabled);
}

#[test]
fn failed_enable_rolls_back() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    let (op, _) = mic_commands(&session.take_effects())[0];

    session.handle(Input::MicrophoneSettled {
        op,
        result: Err(TransportError::OperationFailed("device busy".to_string())),
    });
    let snapshot = session.snapshot();
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert_eq!(snapshot.turn, TurnState::Idle);
}

#[test]
fn enable_and_disable_both_failing_leave_microphone_off() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    session.toggle_microphone().unwrap();
    let commands = mic_commands(&session.take_effects());
    assert_eq!(commands.len(), 2);

    for (op, _) in commands {
        session.handle(Input::MicrophoneSettled {
            op,
            result: Err(TransportError::OperationFailed("device busy".to_string())),
        });
    }

    let snapshot = session.snapshot();
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert_eq!(snapshot.turn, TurnState::Idle);
    assert!(session.invariants_hold());
}

#[test]
fn microphone_can_be_muted_while_reconnecting() {
    let mut session = ready_session();
    session.toggle_microphone().unwrap();
    session.take_effects();

    session.handle(TransportEvent::ConnectionStateChanged(ConnectionState::Reconnecting).into());
    assert_eq!(session.snapshot().microphone, MicrophoneState::Enabled);

    assert_eq!(session.toggle_microphone().unwrap(), ToggleOutcome::Disabled);
    let commands = mic_commands(&session.take_effects());
    assert_eq!(commands.len(), 1);
    assert!(!commands[0].1);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert_eq!(snapshot.turn, TurnState::Idle);

    // Turning it back on still needs a live connection.
    assert!(matches!(
        session.toggle_microphone(),
        Err(SessionError::NotConnected)
    ));
}

#[test]
fn snapshot_is_reflected_until_state_changes() {
    let mut session = ready_session();
    let snapshot = session.snapshot();
    assert!(session.is_reflected_in(&snapshot));

    session.handle(Input::PublishSettled {
        op: 42,
        result: Ok(()),
    });
    assert!(session.is_reflected_in(&snapshot));

    session.handle(
        TransportEvent::TranscriptionSegment {
            text: "Hi".to_string(),
            is_final: false,
        }
        .into(),
    );
    assert!(!session.is_reflected_in(&snapshot));

    let effects = session.take_effects();
    let refreshed = session.snapshot();
    assert!(session.is_reflected_in(&refreshed));

    let generation = reveal_generation(&effects).unwrap();
    session.handle(Input::RevealTick { generation });
    assert!(!session.is_reflected_in(&refreshed));
    assert_eq!(session.snapshot().transcript[0].text, "H");
}

#[test]
fn failed_publish_keeps_local_echo() {
    let mut session = ready_session();
    session.send_text("still here").unwrap();
    session.handle(Input::PublishSettled {
        op: 1,
        result: Err(TransportError::Closed),
    });
    assert_eq!(session.transcript().len(), 1);
}

#[test]
fn disconnect_resets_turn_but_keeps_permission_and_transcript() {
    let mut session = ready_session();
    session.handle(
        TransportEvent::ParticipantJoined {
            identity: AGENT.to_string(),
            metadata: None,
        }
        .into(),
    );
    session.send_text("hello").unwrap();
    session.handle(agent_mic_published());

    session.handle(TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected).into());
    let effects = session.take_effects();
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::Reveal)));
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::FloorCooldown)));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.turn, TurnState::Idle);
    assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
    assert!(!snapshot.agent_present);
    assert_eq!(snapshot.permission, PermissionState::Granted);
    assert_eq!(snapshot.transcript.len(), 1);
}

#[test]
fn agent_presence_notices() {
    let mut session = ready_session();
    session.handle(
        TransportEvent::ParticipantJoined {
            identity: "companion".to_string(),
            metadata: Some(r#"{"userType":"agent"}"#.to_string()),
        }
        .into(),
    );
    assert!(session.snapshot().agent_present);
    assert!(session
        .take_effects()
        .contains(&Effect::Notify(SessionNotice::AgentJoined {
            identity: "companion".to_string()
        })));

    session.handle(
        TransportEvent::ParticipantLeft {
            identity: "companion".to_string(),
            metadata: None,
        }
        .into(),
    );
    assert!(!session.snapshot().agent_present);
    assert!(session
        .take_effects()
        .contains(&Effect::Notify(SessionNotice::AgentDeparted {
            identity: "companion".to_string()
        })));
}

#[test]
fn clear_and_teardown() {
    let mut session = ready_session();
    session.send_text("one").unwrap();
    session.clear();
    assert!(session.transcript().is_empty());

    session.send_text("two").unwrap();
    session.teardown();
    assert!(session.is_closed());
    assert!(session.transcript().is_empty());
    assert!(session
        .take_effects()
        .contains(&Effect::CancelTimer(TimerKind::FloorCooldown)));

    session.handle(data_from(Some(AGENT), json!({"content": "late"})));
    assert!(session.transcript().is_empty());
    assert!(matches!(
        session.toggle_microphone(),
        Err(SessionError::SessionClosed)
    ));
}

/// Random event sequences never break the half-duplex invariants.
#[test]
fn invariants_hold_under_random_inputs() {
    for seed in 0..64u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut session = connected_session(SessionConfig::default());
        let mut pending_mic: Vec<OpId> = Vec::new();
        let mut pending_permission: Vec<RequestId> = Vec::new();
        let mut cooldowns: Vec<u64> = Vec::new();

        for _ in 0..200 {
            match rng.gen_range(0..12) {
                0 => {
                    let _ = session.toggle_microphone();
                }
                1 => session.handle(agent_mic_published()),
                2 => session.handle(agent_mic_unpublished()),
                3 => session.handle(data_from(Some(AGENT), json!({"content": "hi"}))),
                4 => {
                    let _ = session.send_text("hey");
                }
                5 => {
                    if let Some(op) = pending_mic.pop() {
                        let result = if rng.gen_bool(0.3) {
                            Err(TransportError::OperationFailed("flaky".to_string()))
                        } else {
                            Ok(())
                        };
                        session.handle(Input::MicrophoneSettled { op, result });
                    }
                }
                6 => {
                    if let Some(request) = pending_permission.pop() {
                        let outcome = if rng.gen_bool(0.7) {
                            PermissionOutcome::Granted
                        } else {
                            PermissionOutcome::Denied {
                                reason: "no".to_string(),
                            }
                        };
                        session.handle(Input::PermissionResolved { request, outcome });
                    }
                }
                7 => {
                    if let Some(generation) = cooldowns.pop() {
                        session.handle(Input::FloorCooldownElapsed { generation });
                    }
                }
                8 => {
                    let state = if rng.gen_bool(0.5) {
                        ConnectionState::Connected
                    } else {
                        ConnectionState::Disconnected
                    };
                    session.handle(TransportEvent::ConnectionStateChanged(state).into());
                }
                9 => session.handle(
                    TransportEvent::TranscriptionSegment {
                        text: "partial".to_string(),
                        is_final: rng.gen_bool(0.5),
                    }
                    .into(),
                ),
                10 => session.handle(Input::RevealTick {
                    generation: rng.gen_range(0..8),
                }),
                _ => {
                    let _ = session.request_microphone_access();
                }
            }

            for effect in session.take_effects() {
                match effect {
                    Effect::SetMicrophoneEnabled { op, .. } => pending_mic.push(op),
                    Effect::RequestPermission { request, .. } => pending_permission.push(request),
                    Effect::ScheduleFloorCooldown { generation, .. } => cooldowns.push(generation),
                    _ => {}
                }
            }

            assert!(session.invariants_hold(), "seed {seed}: {:?}", session.snapshot());
            let snapshot = session.snapshot();
            if snapshot.turn == TurnState::AgentSpeaking {
                assert_eq!(snapshot.microphone, MicrophoneState::Disabled);
            }
        }
    }
}
