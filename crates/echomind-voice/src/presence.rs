//! Agent presence tracking.
//!
//! Remote participants are classified from their join/leave metadata using an
//! ordered list of rules. Metadata-based rules come first; the identity
//! substring rule is a best-effort heuristic for agents that publish no
//! metadata.

use echomind_types::ParticipantRole;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Marker value that identifies an agent.
pub const AGENT_MARKER: &str = "agent";

/// A single classification rule. Rules are applied in order; the first
/// match classifies the participant as an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationRule {
    /// Metadata field `role` equals `"agent"`.
    MetadataRole,
    /// Metadata field `userType` equals `"agent"`.
    MetadataUserType,
    /// Identity string contains `"agent"`.
    IdentityContains,
}

/// Metadata rules first, identity heuristic last.
pub const DEFAULT_RULES: [ClassificationRule; 3] = [
    ClassificationRule::MetadataRole,
    ClassificationRule::MetadataUserType,
    ClassificationRule::IdentityContains,
];

impl ClassificationRule {
    fn matches(self, identity: &str, metadata: Option<&Value>) -> bool {
        match self {
            Self::MetadataRole => metadata_field_is(metadata, "role"),
            Self::MetadataUserType => metadata_field_is(metadata, "userType"),
            Self::IdentityContains => identity.contains(AGENT_MARKER),
        }
    }
}

fn metadata_field_is(metadata: Option<&Value>, field: &str) -> bool {
    metadata
        .and_then(|m| m.get(field))
        .and_then(Value::as_str)
        == Some(AGENT_MARKER)
}

/// Classifies a remote participant.
///
/// Metadata that fails to parse makes the whole event a non-match: the
/// participant is `RemoteOther` and no further rule is consulted.
pub fn classify(
    identity: &str,
    metadata: Option<&str>,
    rules: &[ClassificationRule],
) -> ParticipantRole {
    let parsed = match metadata.filter(|m| !m.trim().is_empty()) {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(identity, "failed to parse participant metadata: {}", e);
                return ParticipantRole::RemoteOther;
            }
        },
        None => None,
    };

    if rules
        .iter()
        .any(|rule| rule.matches(identity, parsed.as_ref()))
    {
        ParticipantRole::RemoteAgent
    } else {
        ParticipantRole::RemoteOther
    }
}

/// Presence transitions reported to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    AgentArrived(String),
    AgentDeparted(String),
}

/// Tracks remote participants and the single agent-present flag.
///
/// Several agents are not tracked as a set: any agent joining raises the
/// flag and any agent leaving lowers it.
#[derive(Debug)]
pub struct PresenceTracker {
    local_identity: String,
    rules: Vec<ClassificationRule>,
    roster: HashMap<String, ParticipantRole>,
    agent_present: bool,
}

impl PresenceTracker {
    pub fn new(local_identity: impl Into<String>) -> Self {
        Self::with_rules(local_identity, DEFAULT_RULES.to_vec())
    }

    pub fn with_rules(local_identity: impl Into<String>, rules: Vec<ClassificationRule>) -> Self {
        Self {
            local_identity: local_identity.into(),
            rules,
            roster: HashMap::new(),
            agent_present: false,
        }
    }

    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    pub fn agent_present(&self) -> bool {
        self.agent_present
    }

    /// Role of a known participant. The local identity is always `Local`.
    pub fn role_of(&self, identity: &str) -> Option<ParticipantRole> {
        if identity == self.local_identity {
            return Some(ParticipantRole::Local);
        }
        self.roster.get(identity).copied()
    }

    pub fn joined(&mut self, identity: &str, metadata: Option<&str>) -> Option<PresenceChange> {
        if identity == self.local_identity {
            return None;
        }

        let role = classify(identity, metadata, &self.rules);
        debug!(identity, role = role.label(), "participant joined");
        self.roster.insert(identity.to_string(), role);

        if role == ParticipantRole::RemoteAgent {
            info!(identity, "agent joined");
            self.agent_present = true;
            Some(PresenceChange::AgentArrived(identity.to_string()))
        } else {
            None
        }
    }

    pub fn left(&mut self, identity: &str, metadata: Option<&str>) -> Option<PresenceChange> {
        if identity == self.local_identity {
            return None;
        }

        let known = self.roster.remove(identity);
        let role = classify(identity, metadata, &self.rules);
        debug!(identity, role = role.label(), "participant left");

        if role == ParticipantRole::RemoteAgent || known == Some(ParticipantRole::RemoteAgent) {
            info!(identity, "agent left");
            self.agent_present = false;
            Some(PresenceChange::AgentDeparted(identity.to_string()))
        } else {
            None
        }
    }

    /// Forgets every remote participant (session disconnected).
    pub fn reset(&mut self) {
        self.roster.clear();
        self.agent_present = false;
    }
}
