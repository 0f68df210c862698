use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::QuestionId;

/// A learner-supplied answer to a single question.
///
/// Tagged so one snapshot shape serves every module: free text for writing
/// tasks, a single choice for multiple-choice items, a set of choices for
/// multi-select items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AnswerValue {
    Text(String),
    Choice(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    /// An empty value stands for "no answer" and removes the entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(s) | AnswerValue::Choice(s) => s.is_empty(),
            AnswerValue::Choices(items) => items.is_empty(),
        }
    }
}

/// Structured position of the learner within the exam content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Section index (passage, recording part, task number).
    pub section: u32,
    /// Item index within the section.
    pub item: u32,
}

impl CursorPosition {
    #[must_use]
    pub fn new(section: u32, item: u32) -> Self {
        Self { section, item }
    }

    /// True while the learner is still on the very first item.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        self.section == 0 && self.item == 0
    }
}

/// In-memory representation of current attempt progress.
///
/// Replaced atomically as a whole on every mutation; the engine never merges
/// two snapshots field by field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    #[serde(default)]
    pub cursor: CursorPosition,
    /// Countdown value, `None` for untimed attempts. Display-only between
    /// saves; recomputed from elapsed/total at every hydration.
    pub seconds_remaining: Option<u32>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an answer, returning whether the snapshot changed.
    ///
    /// Empty values remove the entry; re-writing an identical value is a
    /// no-op so callers can skip scheduling a save.
    pub fn set_answer(&mut self, question_id: QuestionId, value: AnswerValue) -> bool {
        if value.is_empty() {
            return self.answers.remove(&question_id).is_some();
        }
        match self.answers.get(&question_id) {
            Some(existing) if *existing == value => false,
            _ => {
                self.answers.insert(question_id, value);
                true
            }
        }
    }

    /// Moves the cursor, returning whether the snapshot changed.
    pub fn set_cursor(&mut self, position: CursorPosition) -> bool {
        if self.cursor == position {
            return false;
        }
        self.cursor = position;
        true
    }

    /// Updates the countdown, returning whether the snapshot changed.
    pub fn set_seconds_remaining(&mut self, value: Option<u32>) -> bool {
        if self.seconds_remaining == value {
            return false;
        }
        self.seconds_remaining = value;
        true
    }

    /// True once the attempt has anything worth persisting: an answer, a
    /// cursor away from the origin, or a running countdown.
    #[must_use]
    pub fn has_progress(&self) -> bool {
        !self.answers.is_empty() || !self.cursor.is_origin() || self.seconds_remaining.is_some()
    }
}

/// Local-cache form of a snapshot: the snapshot plus the wall-clock moment it
/// was saved. `saved_at` is directly comparable with `Checkpoint::saved_at`,
/// which is all reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub snapshot: Snapshot,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSnapshot {
    #[must_use]
    pub fn new(snapshot: Snapshot, saved_at: DateTime<Utc>) -> Self {
        Self { snapshot, saved_at }
    }
}
