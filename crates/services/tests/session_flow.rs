use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use exam_core::model::{
    AnswerValue, AttemptId, Checkpoint, CursorPosition, ExamInstanceRef, ExamModule, QuestionId,
    Snapshot,
};
use exam_core::time::{fixed_clock, fixed_now};
use services::{ExamSyncService, LifecycleSignal, SyncConfig};
use storage::blob::InMemoryBlobStore;
use storage::repository::{CheckpointRepository, InMemoryCheckpointRepository, StorageError};

fn instance() -> ExamInstanceRef {
    ExamInstanceRef::new(ExamModule::Reading, "cambridge-18-t1")
}

fn qid(id: &str) -> QuestionId {
    QuestionId::new(id)
}

fn choice(value: &str) -> AnswerValue {
    AnswerValue::Choice(value.into())
}

fn service(
    blobs: Arc<InMemoryBlobStore>,
    remote: Arc<InMemoryCheckpointRepository>,
) -> ExamSyncService {
    ExamSyncService::new(fixed_clock(), blobs, remote, SyncConfig::default())
}

#[tokio::test]
async fn local_cache_tracks_the_last_applied_snapshot() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs.clone(), remote);

    let mut session = sync.start_session(instance(), Some(3600)).await;
    let now = fixed_now();
    session.set_answer(qid("q1"), choice("A"), now).unwrap();
    session.set_answer(qid("q2"), choice("B"), now).unwrap();
    session.set_answer(qid("q1"), choice("C"), now).unwrap();
    session.flush(now + Duration::seconds(1)).await;

    let cached = services::LocalSnapshotCache::new(blobs)
        .read(&instance())
        .expect("cache written");
    assert_eq!(cached.snapshot.answers, session.snapshot().answers);
    assert_eq!(
        cached.snapshot.answers.get(&qid("q1")),
        Some(&choice("C"))
    );
}

#[tokio::test]
async fn attempt_id_is_stable_across_sessions() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs, remote);

    let first = sync.get_or_create_attempt(&instance());
    let second = sync.get_or_create_attempt(&instance());
    assert_eq!(first, second);

    let session = sync.start_session(instance(), Some(3600)).await;
    assert_eq!(*session.attempt_id(), first);
}

#[tokio::test]
async fn tab_close_scenario_survives_a_reload() {
    // total 600 s; answer at t=0; debounce 800 ms, max_wait 3 s;
    // the tab closes at t=12 s.
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs.clone(), remote.clone());

    let mut session = sync.start_session(instance(), Some(600)).await;
    let t0 = fixed_now();
    session.set_answer(qid("q1"), choice("A"), t0).unwrap();

    let mut flushed_by = None;
    for second in 1..=12 {
        let now = t0 + Duration::seconds(second);
        session.tick(now).await;
        if flushed_by.is_none() {
            let attempt = session.attempt_id();
            if remote
                .fetch_latest(attempt, ExamModule::Reading)
                .await
                .unwrap()
                .is_some()
            {
                flushed_by = Some(second);
            }
        }
    }

    // 12 s > max_wait: the write happened long before the close
    let flushed_by = flushed_by.expect("a flush occurred before the close");
    assert!(flushed_by <= 3, "flush fired at {flushed_by} s");

    session
        .on_lifecycle(LifecycleSignal::Unload, t0 + Duration::seconds(12))
        .await;

    // reopen: a fresh service over the same stores
    let reopened = service(blobs, remote)
        .start_session(instance(), Some(600))
        .await;
    assert_eq!(
        reopened.snapshot().answers.get(&qid("q1")),
        Some(&choice("A"))
    );
    assert_eq!(reopened.seconds_remaining(), Some(588));
}

#[tokio::test]
async fn burst_of_mutations_yields_one_bounded_write() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs, remote.clone());

    let mut session = sync.start_session(instance(), Some(3600)).await;
    let t0 = fixed_now();

    // continuous typing: a mutation every 500 ms keeps the quiet period
    // from ever elapsing
    for i in 0..6 {
        let at = t0 + Duration::milliseconds(i * 500);
        session
            .set_answer(qid("q1"), AnswerValue::Text(format!("draft {i}")), at)
            .unwrap();
    }

    for second in 1..=4 {
        session.tick(t0 + Duration::seconds(second)).await;
    }

    let history = remote
        .history(session.attempt_id(), ExamModule::Reading, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1, "coalesced into a single write");
    assert!(history[0].saved_at <= t0 + Duration::seconds(3));
    assert_eq!(
        history[0].snapshot.answers.get(&qid("q1")),
        Some(&AnswerValue::Text("draft 5".into()))
    );
}

#[tokio::test]
async fn remote_progress_from_another_device_wins_when_newer() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs.clone(), remote.clone());

    // first session saves some progress locally and remotely
    let mut session = sync.start_session(instance(), Some(3600)).await;
    let t0 = fixed_now();
    session.set_answer(qid("q1"), choice("A"), t0).unwrap();
    session.flush(t0 + Duration::seconds(1)).await;
    let attempt = session.attempt_id().clone();
    drop(session);

    // another device pushed a newer checkpoint for the same attempt
    let mut newer_snapshot = Snapshot::new();
    newer_snapshot.set_answer(qid("q1"), choice("B"));
    newer_snapshot.set_cursor(CursorPosition::new(2, 7));
    remote
        .upsert(&Checkpoint {
            attempt_id: attempt.clone(),
            module: ExamModule::Reading,
            instance_id: "cambridge-18-t1".into(),
            snapshot: newer_snapshot,
            elapsed_seconds: 600,
            total_duration_seconds: Some(3600),
            completed: false,
            saved_at: t0 + Duration::seconds(120),
        })
        .await
        .unwrap();

    let resumed = sync.start_session(instance(), Some(3600)).await;
    assert_eq!(
        resumed.snapshot().answers.get(&qid("q1")),
        Some(&choice("B"))
    );
    assert_eq!(resumed.snapshot().cursor, CursorPosition::new(2, 7));
    // countdown recomputed from the winner's elapsed time, not any cached
    // raw value
    assert_eq!(resumed.seconds_remaining(), Some(3000));
}

#[tokio::test]
async fn older_remote_checkpoint_does_not_override_local_progress() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs.clone(), remote.clone());

    let mut session = sync.start_session(instance(), Some(3600)).await;
    let t0 = fixed_now();
    // seed the remote with an early save, then keep working locally while
    // the network is effectively behind
    session.set_answer(qid("q1"), choice("A"), t0).unwrap();
    session.flush(t0 + Duration::seconds(1)).await;

    session
        .set_answer(qid("q1"), choice("C"), t0 + Duration::seconds(30))
        .unwrap();
    // only the local cache sees this one
    let cache = services::LocalSnapshotCache::new(blobs.clone());
    let mut local = cache.read(&instance()).unwrap();
    local.snapshot.set_answer(qid("q1"), choice("C"));
    local.saved_at = t0 + Duration::seconds(30);
    cache.write(&instance(), &local);
    drop(session);

    let resumed = sync.start_session(instance(), Some(3600)).await;
    assert_eq!(
        resumed.snapshot().answers.get(&qid("q1")),
        Some(&choice("C"))
    );
}

/// Repository that fails every call, standing in for a dead network.
#[derive(Clone, Default)]
struct OfflineCheckpointRepository;

#[async_trait]
impl CheckpointRepository for OfflineCheckpointRepository {
    async fn upsert(&self, _checkpoint: &Checkpoint) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn fetch_latest(
        &self,
        _attempt_id: &AttemptId,
        _module: ExamModule,
    ) -> Result<Option<Checkpoint>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn history(
        &self,
        _attempt_id: &AttemptId,
        _module: ExamModule,
        _limit: usize,
    ) -> Result<Vec<Checkpoint>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

#[tokio::test]
async fn network_failure_degrades_to_local_durability() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let sync = ExamSyncService::new(
        fixed_clock(),
        blobs.clone(),
        Arc::new(OfflineCheckpointRepository),
        SyncConfig::default(),
    );

    let mut session = sync.start_session(instance(), Some(3600)).await;
    // hydration succeeded despite the dead network
    assert!(session.hydrated());

    let t0 = fixed_now();
    session.set_answer(qid("q1"), choice("A"), t0).unwrap();
    session.flush(t0 + Duration::seconds(1)).await;

    // the local cache carried the save; a resume over the same blobs
    // recovers it
    let resumed = sync.start_session(instance(), Some(3600)).await;
    assert_eq!(
        resumed.snapshot().answers.get(&qid("q1")),
        Some(&choice("A"))
    );
}

#[tokio::test]
async fn cleared_attempt_leaves_remote_history_for_audit() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs, remote.clone());

    let mut session = sync.start_session(instance(), Some(3600)).await;
    let t0 = fixed_now();
    session.set_answer(qid("q1"), choice("A"), t0).unwrap();
    session.flush(t0 + Duration::seconds(1)).await;
    session.complete(t0 + Duration::seconds(2)).await.unwrap();
    let old_attempt = session.attempt_id().clone();

    session.clear(t0 + Duration::seconds(3));
    assert_ne!(*session.attempt_id(), old_attempt);

    let history = remote
        .history(&old_attempt, ExamModule::Reading, 10)
        .await
        .unwrap();
    assert!(!history.is_empty(), "remote history kept after clear");
    assert!(history.iter().any(|c| c.completed));
}

#[tokio::test]
async fn completed_attempt_does_not_rehydrate() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let remote = Arc::new(InMemoryCheckpointRepository::new());
    let sync = service(blobs, remote);

    let mut session = sync.start_session(instance(), Some(3600)).await;
    let t0 = fixed_now();
    session.set_answer(qid("q1"), choice("A"), t0).unwrap();
    session.complete(t0 + Duration::seconds(2)).await.unwrap();
    session.clear(t0 + Duration::seconds(3));
    drop(session);

    // the submitted checkpoint must not resurrect as in-progress state
    let fresh = sync.start_session(instance(), Some(3600)).await;
    assert!(fresh.snapshot().answers.is_empty());
    assert_eq!(fresh.seconds_remaining(), Some(3600));
}
