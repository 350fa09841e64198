//! Transcript entry definitions.

use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local human.
    User,
    /// The remote agent.
    Companion,
}

impl Speaker {
    /// Display name used when rendering the transcript.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Companion => "Companion",
        }
    }
}

/// One line of the conversation log.
///
/// `timestamp` is an arrival-order key assigned by the assembler, not a
/// wall-clock time. Entries are ordered by it and it is never reused within
/// one log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: u64,
    pub is_final: bool,
}
