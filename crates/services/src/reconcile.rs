use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use exam_core::model::{Checkpoint, ExamInstanceRef, PersistedSnapshot, Snapshot};

/// Which stored copy won the reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    /// No usable copy anywhere; the attempt starts from a default snapshot.
    Fresh,
    Local,
    Remote,
}

/// The resolved session state: the winning snapshot, where it came from, and
/// the timestamp it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hydration {
    pub snapshot: Snapshot,
    pub source: HydrationSource,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Selects the authoritative state between the local cache and the remote
/// store. Runs once at session start, before any new persistence is
/// permitted.
///
/// Whole-snapshot last-write-wins: the strictly greater `saved_at` takes
/// everything, an exact tie favors the remote copy (confirmed durability),
/// and the loser is fully discarded. The winner's countdown is never trusted
/// raw across the reload gap; see `resolve`.
pub struct ReconciliationResolver;

impl ReconciliationResolver {
    /// Resolves local vs remote state and normalizes the countdown.
    ///
    /// A remote checkpoint for a different exam instance, or one already
    /// marked completed, is ignored. For a remote winner the countdown is
    /// recomputed from elapsed/total duration; for a local winner the stored
    /// countdown is clamped into `[0, total]` (the local form carries no
    /// elapsed field). Untimed sessions carry no countdown at all.
    #[must_use]
    pub fn resolve(
        local: Option<PersistedSnapshot>,
        remote: Option<Checkpoint>,
        instance: &ExamInstanceRef,
        total_duration: Option<u32>,
    ) -> Hydration {
        let remote = remote.filter(|checkpoint| {
            if !checkpoint.matches_instance(instance) {
                warn!(
                    instance = %instance,
                    checkpoint_instance = %checkpoint.instance_id,
                    "ignoring checkpoint for a different exam instance"
                );
                return false;
            }
            if checkpoint.completed {
                debug!(instance = %instance, "ignoring checkpoint of a completed attempt");
                return false;
            }
            true
        });

        let mut hydration = match (local, remote) {
            (None, None) => Hydration {
                snapshot: Snapshot::new(),
                source: HydrationSource::Fresh,
                saved_at: None,
            },
            (Some(local), None) => Self::from_local(local),
            (None, Some(remote)) => Self::from_remote(remote, total_duration),
            (Some(local), Some(remote)) => {
                // ties favor the remote copy: its durability is confirmed
                if remote.saved_at >= local.saved_at {
                    Self::from_remote(remote, total_duration)
                } else {
                    Self::from_local(local)
                }
            }
        };

        hydration.snapshot.seconds_remaining = match total_duration {
            None => None,
            Some(total) => Some(
                hydration
                    .snapshot
                    .seconds_remaining
                    .unwrap_or(total)
                    .min(total),
            ),
        };

        hydration
    }

    fn from_local(local: PersistedSnapshot) -> Hydration {
        Hydration {
            snapshot: local.snapshot,
            source: HydrationSource::Local,
            saved_at: Some(local.saved_at),
        }
    }

    fn from_remote(remote: Checkpoint, total_duration: Option<u32>) -> Hydration {
        let saved_at = remote.saved_at;
        let mut snapshot = remote.snapshot;
        // recompute the countdown from elapsed/total, correcting for drift
        // across reload or background-suspend gaps
        let total = remote.total_duration_seconds.or(total_duration);
        snapshot.seconds_remaining = total.map(|t| t.saturating_sub(remote.elapsed_seconds));
        Hydration {
            snapshot,
            source: HydrationSource::Remote,
            saved_at: Some(saved_at),
        }
    }
}
