use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use exam_core::model::{
    AttemptId, Checkpoint, ExamInstanceRef, PersistedSnapshot, Snapshot, elapsed_from_remaining,
};
use storage::repository::CheckpointRepository;

use crate::debounce::{DebouncePolicy, DebounceState};
use crate::snapshot_cache::LocalSnapshotCache;

/// Everything a single checkpoint write needs, borrowed from the session at
/// the moment the flush fires. Overlapping triggers coalesce naturally: the
/// writer always persists whatever snapshot it is handed, which is the
/// latest one.
pub struct WriteRequest<'a> {
    pub instance: &'a ExamInstanceRef,
    pub attempt_id: &'a AttemptId,
    pub snapshot: &'a Snapshot,
    pub total_duration: Option<u32>,
    pub completed: bool,
}

/// Debounced + heartbeat + forced-flush persistence pipeline.
///
/// Every mutation calls `schedule`; the host polls `due` (typically from its
/// 1 Hz tick) and calls `write` when it fires. The local cache is written
/// synchronously first, then the remote upsert is attempted; a failed remote
/// write only logs, leaving the local cache authoritative until the next
/// successful one.
pub struct CheckpointWriter {
    cache: LocalSnapshotCache,
    remote: Arc<dyn CheckpointRepository>,
    debounce: DebounceState,
    heartbeat: Duration,
    last_write_at: Option<DateTime<Utc>>,
}

impl CheckpointWriter {
    #[must_use]
    pub fn new(
        cache: LocalSnapshotCache,
        remote: Arc<dyn CheckpointRepository>,
        policy: DebouncePolicy,
        heartbeat: Duration,
    ) -> Self {
        Self {
            cache,
            remote,
            debounce: DebounceState::new(policy),
            heartbeat,
            last_write_at: None,
        }
    }

    /// Arms the heartbeat. Called once hydration completes; before that the
    /// writer must stay silent so it cannot clobber not-yet-seen remote
    /// progress.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.last_write_at = Some(now);
    }

    /// Registers a mutation with the debounce state machine.
    pub fn schedule(&mut self, now: DateTime<Utc>) {
        self.debounce.schedule(now);
    }

    /// Cancels any pending flush outright (abandon/clear).
    pub fn cancel(&mut self) {
        self.debounce.cancel();
        self.last_write_at = None;
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    fn heartbeat_due(&self, now: DateTime<Utc>) -> bool {
        self.last_write_at
            .is_some_and(|last| now - last >= self.heartbeat)
    }

    /// True when the debounce deadline has passed or the heartbeat safety net
    /// fires. The heartbeat only triggers once there is progress worth
    /// saving.
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>, has_progress: bool) -> bool {
        self.debounce.due(now) || (has_progress && self.heartbeat_due(now))
    }

    /// The next instant `due` could become true, for hosts that sleep.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let heartbeat_at = self.last_write_at.map(|last| last + self.heartbeat);
        match (self.debounce.next_deadline(), heartbeat_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Performs one checkpoint write: local cache synchronously, then the
    /// remote upsert. `now` becomes the checkpoint's `saved_at`, the sole
    /// ordering key for reconciliation.
    pub async fn write(&mut self, request: WriteRequest<'_>, now: DateTime<Utc>) {
        let elapsed_seconds = match (request.total_duration, request.snapshot.seconds_remaining) {
            (Some(total), Some(remaining)) => elapsed_from_remaining(total, remaining),
            (Some(total), None) => total,
            (None, _) => 0,
        };

        let persisted = PersistedSnapshot::new(request.snapshot.clone(), now);
        self.cache.write(request.instance, &persisted);

        self.debounce.acknowledge();
        self.last_write_at = Some(now);

        let checkpoint = Checkpoint {
            attempt_id: request.attempt_id.clone(),
            module: request.instance.module,
            instance_id: request.instance.instance_id.clone(),
            snapshot: request.snapshot.clone(),
            elapsed_seconds,
            total_duration_seconds: request.total_duration,
            completed: request.completed,
            saved_at: now,
        };
        if let Err(e) = self.remote.upsert(&checkpoint).await {
            // local cache stays authoritative until the next successful write
            warn!(
                instance = %request.instance,
                attempt = %request.attempt_id,
                error = %e,
                "remote checkpoint write failed"
            );
        }
    }
}
