use async_trait::async_trait;
use exam_core::model::{AttemptId, Checkpoint, ExamModule};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Remote checkpoint store contract.
///
/// The transport behind it is opaque to the engine; saves are keyed appends
/// and the latest checkpoint per (attempt, module) is selected by `saved_at`.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Persist a checkpoint. Saves for the same key accumulate; readers see
    /// the one with the greatest `saved_at`, so replaying a write is
    /// harmless.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the checkpoint cannot be stored.
    async fn upsert(&self, checkpoint: &Checkpoint) -> Result<(), StorageError>;

    /// Fetch the most recent checkpoint for an attempt and module, by
    /// `saved_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decode failures. A missing
    /// checkpoint is `Ok(None)`, not an error.
    async fn fetch_latest(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
    ) -> Result<Option<Checkpoint>, StorageError>;

    /// Fetch up to `limit` checkpoints for an attempt and module, newest
    /// first. Audit trail only; reconciliation never consults history.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decode failures.
    async fn history(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
        limit: usize,
    ) -> Result<Vec<Checkpoint>, StorageError>;
}

/// Simple in-memory checkpoint repository for testing and prototyping.
///
/// Append-only per key, mirroring the durable adapter's row-per-save model.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointRepository {
    checkpoints: Arc<Mutex<HashMap<(AttemptId, ExamModule), Vec<Checkpoint>>>>,
}

impl InMemoryCheckpointRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryCheckpointRepository {
    async fn upsert(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let mut guard = self
            .checkpoints
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .entry((checkpoint.attempt_id.clone(), checkpoint.module))
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn fetch_latest(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
    ) -> Result<Option<Checkpoint>, StorageError> {
        let guard = self
            .checkpoints
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let latest = guard
            .get(&(attempt_id.clone(), module))
            .and_then(|saves| saves.iter().max_by_key(|c| c.saved_at))
            .cloned();
        Ok(latest)
    }

    async fn history(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
        limit: usize,
    ) -> Result<Vec<Checkpoint>, StorageError> {
        let guard = self
            .checkpoints
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut saves = guard
            .get(&(attempt_id.clone(), module))
            .cloned()
            .unwrap_or_default();
        saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        saves.truncate(limit);
        Ok(saves)
    }
}
