//! Transcript assembly.
//!
//! The log is append-only and ordered by arrival. The one exception is the
//! streaming tail: the most recent companion entry created from
//! transcription segments, whose text is revealed a character at a time
//! until it catches up with the latest segment.

use crate::reveal::{Retarget, StreamingReveal};
use echomind_types::{Speaker, TranscriptEntry};
use serde_json::Value;
use tracing::{debug, trace};

/// Payload fields that may carry message text, in lookup order.
const CONTENT_FIELDS: [&str; 3] = ["content", "text", "message"];

/// How sure we are about who sent an inbound data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderCertainty {
    /// The transport attributed the packet to a remote participant.
    Identified,
    /// The transport could not attribute the packet.
    Unidentified,
}

/// Pulls displayable text out of an inbound data message.
///
/// Unidentified senders fall back to the whole payload so that content is
/// shown rather than silently dropped. Blank results yield `None`.
pub fn extract_content(payload: &Value, certainty: SenderCertainty) -> Option<String> {
    let field = CONTENT_FIELDS.iter().find_map(|name| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    });

    let content = match (field, certainty) {
        (Some(content), _) => content,
        (None, SenderCertainty::Identified) => return None,
        (None, SenderCertainty::Unidentified) => payload.to_string(),
    };

    if content.trim().is_empty() {
        None
    } else {
        Some(content)
    }
}

/// What the reveal timer should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStep {
    /// Nothing to schedule.
    Idle,
    /// Reveal the next character after the regular cadence.
    Tick { generation: u64 },
    /// The display was cleared; start revealing after the restart delay.
    Restart { generation: u64 },
}

#[derive(Debug)]
struct StreamingTail {
    index: usize,
    reveal: StreamingReveal,
    /// A final segment arrived; the entry is finalized once fully revealed.
    final_pending: bool,
}

#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    entries: Vec<TranscriptEntry>,
    next_timestamp: u64,
    streaming: Option<StreamingTail>,
    reveal_generation: u64,
    /// Bumped on every change to `entries`.
    revision: u64,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Changes whenever the visible log changes, so observers can skip
    /// copying an unchanged log.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn push(&mut self, speaker: Speaker, text: String, is_final: bool) -> usize {
        self.revision += 1;
        self.next_timestamp += 1;
        self.entries.push(TranscriptEntry {
            speaker,
            text,
            timestamp: self.next_timestamp,
            is_final,
        });
        self.entries.len() - 1
    }

    /// Appends a complete entry at the end of the log.
    ///
    /// A streaming tail is flushed first so that it stays in its arrival
    /// position and is no longer updated. Returns `false` for blank text.
    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>, is_final: bool) -> bool {
        let text = text.into();
        if text.trim().is_empty() {
            debug!(speaker = speaker.display_name(), "discarding empty transcript entry");
            return false;
        }
        self.flush();
        let index = self.push(speaker, text, is_final);
        trace!(index, speaker = speaker.display_name(), "transcript entry appended");
        true
    }

    /// Makes `text` the full target of the streaming companion entry.
    ///
    /// A new entry is started when there is no tail or the tail already
    /// received its final segment.
    pub fn replace_streaming_tail(&mut self, text: &str, is_final: bool) -> RevealStep {
        if text.trim().is_empty() {
            trace!("ignoring blank transcription segment");
            return RevealStep::Idle;
        }

        if self.streaming.as_ref().is_some_and(|tail| tail.final_pending) {
            self.flush();
        }

        if self.streaming.is_none() {
            let index = self.push(Speaker::Companion, String::new(), false);
            self.streaming = Some(StreamingTail {
                index,
                reveal: StreamingReveal::new(),
                final_pending: false,
            });
        }

        let Some(tail) = self.streaming.as_mut() else {
            return RevealStep::Idle;
        };
        tail.final_pending = is_final;

        match tail.reveal.retarget(text) {
            Retarget::Unchanged => {
                if is_final && tail.reveal.is_complete() {
                    self.finalize_tail();
                }
                RevealStep::Idle
            }
            Retarget::Extended => {
                self.reveal_generation += 1;
                RevealStep::Tick {
                    generation: self.reveal_generation,
                }
            }
            Retarget::Restarted => {
                let index = tail.index;
                self.entries[index].text.clear();
                self.revision += 1;
                self.reveal_generation += 1;
                debug!(index, "transcription diverged, restarting reveal");
                RevealStep::Restart {
                    generation: self.reveal_generation,
                }
            }
        }
    }

    /// Reveals one more character of the streaming tail.
    pub fn tick(&mut self, generation: u64) -> RevealStep {
        if generation != self.reveal_generation {
            trace!(generation, "stale reveal tick");
            return RevealStep::Idle;
        }
        let Some(tail) = self.streaming.as_mut() else {
            return RevealStep::Idle;
        };

        let more = tail.reveal.step();
        self.entries[tail.index].text = tail.reveal.displayed().to_string();
        self.revision += 1;

        if more {
            RevealStep::Tick { generation }
        } else {
            if tail.final_pending {
                self.finalize_tail();
            }
            RevealStep::Idle
        }
    }

    fn finalize_tail(&mut self) {
        if let Some(mut tail) = self.streaming.take() {
            tail.reveal.finish();
            let entry = &mut self.entries[tail.index];
            entry.text = tail.reveal.displayed().to_string();
            entry.is_final = true;
            self.revision += 1;
            debug!(index = tail.index, "streaming entry finalized");
        }
    }

    /// Completes the streaming tail immediately and detaches it.
    /// Returns `true` when there was a tail to flush.
    pub fn flush(&mut self) -> bool {
        if self.streaming.is_none() {
            return false;
        }
        self.reveal_generation += 1;
        self.finalize_tail();
        true
    }

    /// Empties the log. Pending reveal ticks become stale.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.streaming = None;
        self.reveal_generation += 1;
        self.revision += 1;
    }
}
