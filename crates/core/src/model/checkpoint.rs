use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AttemptId, ExamInstanceRef, ExamModule};
use super::snapshot::Snapshot;

/// Durable save-point for an attempt's progress.
///
/// `saved_at` is the sole ordering key for reconciliation: the strictly
/// greater timestamp wins wholesale, and exact ties favor the remote copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub attempt_id: AttemptId,
    pub module: ExamModule,
    pub instance_id: String,
    pub snapshot: Snapshot,
    pub elapsed_seconds: u32,
    pub total_duration_seconds: Option<u32>,
    pub completed: bool,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// True when this checkpoint belongs to the given exam instance.
    ///
    /// A checkpoint fetched for the right attempt but a different instance is
    /// stale and must be ignored during reconciliation.
    #[must_use]
    pub fn matches_instance(&self, instance: &ExamInstanceRef) -> bool {
        self.module == instance.module && self.instance_id == instance.instance_id
    }

    /// Recomputes the countdown from elapsed/total duration.
    ///
    /// This is the only trusted way to restore a countdown across a reload
    /// gap; the raw stored `seconds_remaining` drifts while the page is
    /// closed or suspended. Returns `None` for untimed attempts.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.total_duration_seconds
            .map(|total| total.saturating_sub(self.elapsed_seconds))
    }
}

/// Converts a displayed countdown back into elapsed time for persistence,
/// clamped to `[0, total]`.
#[must_use]
pub fn elapsed_from_remaining(total_duration: u32, seconds_remaining: u32) -> u32 {
    total_duration.saturating_sub(seconds_remaining.min(total_duration))
}
