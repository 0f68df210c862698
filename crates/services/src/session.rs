use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use exam_core::Clock;
use exam_core::model::{
    AnswerValue, AttemptId, CursorPosition, ExamInstanceRef, PersistedSnapshot, QuestionId,
    Snapshot,
};
use storage::blob::BlobStore;
use storage::repository::CheckpointRepository;

use crate::attempt_identity::AttemptIdentityManager;
use crate::checkpoint_writer::{CheckpointWriter, WriteRequest};
use crate::config::SyncConfig;
use crate::error::SessionError;
use crate::reconcile::{Hydration, HydrationSource, ReconciliationResolver};
use crate::snapshot_cache::LocalSnapshotCache;
use crate::timer::{TimerCoordinator, TimerEvent};

/// Host lifecycle signals that drive forced flushes.
///
/// The engine owns no UI lifecycle of its own; the host forwards these when
/// the page mounts, goes hidden, or is about to be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Mounted,
    Visible,
    Hidden,
    Unmount,
    Unload,
}

/// Entry point for exam session synchronization.
///
/// Holds the two stores and the cadence configuration; sessions are opened
/// per exam instance. Cheap to clone.
#[derive(Clone)]
pub struct ExamSyncService {
    clock: Clock,
    blobs: Arc<dyn BlobStore>,
    remote: Arc<dyn CheckpointRepository>,
    config: SyncConfig,
    identity: AttemptIdentityManager,
}

impl ExamSyncService {
    #[must_use]
    pub fn new(
        clock: Clock,
        blobs: Arc<dyn BlobStore>,
        remote: Arc<dyn CheckpointRepository>,
        config: SyncConfig,
    ) -> Self {
        let identity = AttemptIdentityManager::new(blobs.clone());
        Self {
            clock,
            blobs,
            remote,
            config,
            identity,
        }
    }

    /// Returns the stable attempt id for an instance, creating one if absent.
    #[must_use]
    pub fn get_or_create_attempt(&self, instance: &ExamInstanceRef) -> AttemptId {
        self.identity.get_or_create(instance)
    }

    /// Opens a session handle without touching the network.
    ///
    /// The local cache is applied immediately for an optimistic paint, but
    /// the handle is not hydrated: nothing persists until `hydrate` has
    /// reconciled against the remote store.
    #[must_use]
    pub fn open_session(
        &self,
        instance: ExamInstanceRef,
        total_duration: Option<u32>,
    ) -> ExamSessionService {
        let attempt_id = self.identity.get_or_create(&instance);
        let cache = LocalSnapshotCache::new(self.blobs.clone());

        let local = cache.read(&instance);
        let mut snapshot = local
            .as_ref()
            .map(|persisted| persisted.snapshot.clone())
            .unwrap_or_default();
        snapshot.seconds_remaining = match total_duration {
            None => None,
            Some(total) => Some(snapshot.seconds_remaining.unwrap_or(total).min(total)),
        };

        let writer = CheckpointWriter::new(
            cache.clone(),
            self.remote.clone(),
            self.config.debounce,
            self.config.heartbeat,
        );

        ExamSessionService {
            instance,
            attempt_id,
            snapshot,
            local_copy: local,
            total_duration,
            hydrated: false,
            completed: false,
            cache,
            writer,
            remote: self.remote.clone(),
            identity: self.identity.clone(),
            timer: TimerCoordinator::new(),
        }
    }

    /// Opens and fully hydrates a session in one step.
    pub async fn start_session(
        &self,
        instance: ExamInstanceRef,
        total_duration: Option<u32>,
    ) -> ExamSessionService {
        let mut session = self.open_session(instance, total_duration);
        session.hydrate(self.clock.now()).await;
        session
    }
}

/// One learner's live session against one exam instance.
///
/// The session is the sole writer of both stores for its attempt id; all
/// snapshot mutation goes through this API. A second device writing the same
/// attempt id concurrently is unsupported: reconciliation resolves such
/// conflicts deterministically by the literal greater `saved_at`, which may
/// discard the other device's unsynced edits.
pub struct ExamSessionService {
    instance: ExamInstanceRef,
    attempt_id: AttemptId,
    snapshot: Snapshot,
    local_copy: Option<PersistedSnapshot>,
    total_duration: Option<u32>,
    hydrated: bool,
    completed: bool,
    cache: LocalSnapshotCache,
    writer: CheckpointWriter,
    remote: Arc<dyn CheckpointRepository>,
    identity: AttemptIdentityManager,
    timer: TimerCoordinator,
}

impl ExamSessionService {
    #[must_use]
    pub fn instance(&self) -> &ExamInstanceRef {
        &self.instance
    }

    #[must_use]
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn hydrated(&self) -> bool {
        self.hydrated
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn seconds_remaining(&self) -> Option<u32> {
        self.snapshot.seconds_remaining
    }

    /// Reconciles local vs remote state and arms the persistence pipeline.
    ///
    /// Idempotent. The session counts as hydrated even when the remote fetch
    /// fails: local-only state is accepted and the failure logged, because
    /// blocking the exam on the network would be worse than reduced
    /// durability.
    pub async fn hydrate(&mut self, now: DateTime<Utc>) {
        if self.hydrated {
            return;
        }

        let remote = match self
            .remote
            .fetch_latest(&self.attempt_id, self.instance.module)
            .await
        {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(
                    instance = %self.instance,
                    attempt = %self.attempt_id,
                    error = %e,
                    "checkpoint fetch failed, hydrating from local state only"
                );
                None
            }
        };

        let Hydration {
            snapshot,
            source,
            saved_at,
        } = ReconciliationResolver::resolve(
            self.local_copy.take(),
            remote,
            &self.instance,
            self.total_duration,
        );
        debug!(
            instance = %self.instance,
            attempt = %self.attempt_id,
            source = ?source,
            saved_at = ?saved_at,
            "session hydrated"
        );

        match source {
            HydrationSource::Remote => {
                self.snapshot = snapshot;
            }
            // the in-memory snapshot is the cached copy plus any edits made
            // since open_session; replacing it would roll those edits back
            HydrationSource::Local | HydrationSource::Fresh => {
                self.snapshot.seconds_remaining = match self.total_duration {
                    None => None,
                    Some(total) => {
                        Some(self.snapshot.seconds_remaining.unwrap_or(total).min(total))
                    }
                };
            }
        }

        self.timer.hydrate(self.snapshot.seconds_remaining);
        self.writer.activate(now);
        self.hydrated = true;
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.completed {
            return Err(SessionError::Completed);
        }
        Ok(())
    }

    fn mutated(&mut self, now: DateTime<Utc>) {
        // pre-hydration edits stay in memory; scheduling starts only after
        // reconciliation so a default snapshot can never clobber unseen
        // remote progress
        if self.hydrated {
            self.writer.schedule(now);
        }
    }

    /// Records an answer. Empty values remove the entry; re-writing an
    /// identical value schedules nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is completed.
    pub fn set_answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.ensure_active()?;
        let changed = self.snapshot.set_answer(question_id, value);
        if changed {
            self.mutated(now);
        }
        Ok(changed)
    }

    /// Moves the learner's cursor.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is completed.
    pub fn set_cursor(
        &mut self,
        position: CursorPosition,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.ensure_active()?;
        let changed = self.snapshot.set_cursor(position);
        if changed {
            self.mutated(now);
        }
        Ok(changed)
    }

    /// Overwrites the countdown (e.g. granted extra time).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is completed.
    pub fn set_seconds_remaining(
        &mut self,
        value: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.ensure_active()?;
        let changed = self.snapshot.set_seconds_remaining(value);
        if changed {
            self.timer.set_remaining(value);
            self.mutated(now);
        }
        Ok(changed)
    }

    /// Applies an updater to the current countdown value.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is completed.
    pub fn update_seconds_remaining(
        &mut self,
        update: impl FnOnce(Option<u32>) -> Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let next = update(self.snapshot.seconds_remaining);
        self.set_seconds_remaining(next, now)
    }

    /// One-second host tick: advances the countdown and services the
    /// debounce/heartbeat cadence.
    ///
    /// Timer updates never schedule a debounce of their own; a due flush
    /// picks the fresh value up. The returned event tells the exam controller
    /// when time ran out.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TimerEvent {
        let event = if self.completed {
            TimerEvent::Idle
        } else {
            let event = self.timer.tick();
            match event {
                TimerEvent::Ticked(remaining) => {
                    self.snapshot.seconds_remaining = Some(remaining);
                }
                TimerEvent::Expired => {
                    self.snapshot.seconds_remaining = Some(0);
                }
                TimerEvent::Idle => {}
            }
            event
        };

        if self.hydrated
            && !self.completed
            && self.writer.due(now, self.snapshot.has_progress())
        {
            self.write_now(now).await;
        }
        event
    }

    /// Forces an immediate write if there is anything worth saving.
    ///
    /// No-op before hydration and after completion (the completing write has
    /// already happened).
    pub async fn flush(&mut self, now: DateTime<Utc>) {
        if !self.hydrated || self.completed || !self.snapshot.has_progress() {
            return;
        }
        self.write_now(now).await;
    }

    /// Routes a host lifecycle signal: anything that can end or suspend the
    /// page forces a flush.
    pub async fn on_lifecycle(&mut self, signal: LifecycleSignal, now: DateTime<Utc>) {
        match signal {
            LifecycleSignal::Hidden | LifecycleSignal::Unmount | LifecycleSignal::Unload => {
                self.flush(now).await;
            }
            LifecycleSignal::Mounted | LifecycleSignal::Visible => {}
        }
    }

    /// Marks the attempt completed and persists the final checkpoint.
    ///
    /// The flag is one-way: afterwards every mutation returns
    /// `SessionError::Completed` and persistence calls become no-ops.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` if already completed.
    pub async fn complete(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.completed = true;
        self.timer.stop();
        // unconditional: the completed flag itself must reach the store
        self.write_now(now).await;
        Ok(())
    }

    /// Clears all local state for this instance and issues a fresh attempt.
    ///
    /// Pending flushes are canceled outright; remote checkpoint history is
    /// kept for audit. The handle is immediately usable for a new attempt,
    /// with the heartbeat re-armed at `now`.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.writer.cancel();
        self.writer.activate(now);
        self.cache.remove(&self.instance);
        self.identity.clear(&self.instance);

        self.attempt_id = self.identity.get_or_create(&self.instance);
        self.snapshot = Snapshot::new();
        self.snapshot.seconds_remaining = self.total_duration;
        self.local_copy = None;
        self.completed = false;
        self.timer.hydrate(self.total_duration);
        // stays hydrated: there is nothing older left to reconcile against
        self.hydrated = true;
    }

    async fn write_now(&mut self, now: DateTime<Utc>) {
        let request = WriteRequest {
            instance: &self.instance,
            attempt_id: &self.attempt_id,
            snapshot: &self.snapshot,
            total_duration: self.total_duration,
            completed: self.completed,
        };
        self.writer.write(request, now).await;
    }
}
