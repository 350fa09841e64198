//! Prefix-aware incremental reveal of a growing string.

/// How a new target relates to what is already shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retarget {
    /// Same target as before.
    Unchanged,
    /// The shown text is a prefix of the new target; only the suffix is left to reveal.
    Extended,
    /// The shown text was cleared and the reveal starts from empty.
    Restarted,
}

/// Reveals `target` one character at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingReveal {
    target: String,
    /// Byte length of the revealed prefix, always on a char boundary.
    shown: usize,
}

impl StreamingReveal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn displayed(&self) -> &str {
        &self.target[..self.shown]
    }

    pub fn is_complete(&self) -> bool {
        self.shown == self.target.len()
    }

    pub fn retarget(&mut self, full: &str) -> Retarget {
        if full == self.target {
            return Retarget::Unchanged;
        }

        let shown = self.displayed();
        if !shown.is_empty() && full.starts_with(shown) {
            self.target = full.to_string();
            Retarget::Extended
        } else {
            self.target = full.to_string();
            self.shown = 0;
            Retarget::Restarted
        }
    }

    /// Reveals the next character. Returns `true` while more remain.
    pub fn step(&mut self) -> bool {
        if let Some(c) = self.target[self.shown..].chars().next() {
            self.shown += c.len_utf8();
        }
        !self.is_complete()
    }

    /// Reveals everything at once.
    pub fn finish(&mut self) {
        self.shown = self.target.len();
    }
}
