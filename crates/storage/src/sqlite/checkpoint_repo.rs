use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{AttemptId, Checkpoint, ExamModule, Snapshot};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteCheckpointStore;
use crate::repository::{CheckpointRepository, StorageError};

fn map_checkpoint_row(row: &SqliteRow) -> Result<Checkpoint, StorageError> {
    let attempt_id: String = row
        .try_get("attempt_id")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let module: String = row
        .try_get("module")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let module: ExamModule = module
        .parse()
        .map_err(|_| StorageError::Serialization(format!("unknown module: {module}")))?;
    let instance_id: String = row
        .try_get("instance_id")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let snapshot_json: String = row
        .try_get("snapshot")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let snapshot: Snapshot = serde_json::from_str(&snapshot_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let elapsed_sec: i64 = row
        .try_get("elapsed_sec")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let duration_sec: Option<i64> = row
        .try_get("duration_sec")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let completed: bool = row
        .try_get("completed")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let saved_at: DateTime<Utc> = row
        .try_get("saved_at")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(Checkpoint {
        attempt_id: AttemptId::new(attempt_id),
        module,
        instance_id,
        snapshot,
        elapsed_seconds: u32::try_from(elapsed_sec)
            .map_err(|_| StorageError::Serialization("elapsed_sec out of range".into()))?,
        total_duration_seconds: duration_sec
            .map(|d| {
                u32::try_from(d)
                    .map_err(|_| StorageError::Serialization("duration_sec out of range".into()))
            })
            .transpose()?,
        completed,
        saved_at,
    })
}

#[async_trait]
impl CheckpointRepository for SqliteCheckpointStore {
    async fn upsert(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let snapshot_json = serde_json::to_string(&checkpoint.snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO checkpoints (
                attempt_id, module, instance_id, snapshot,
                elapsed_sec, duration_sec, completed, saved_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(checkpoint.attempt_id.as_str())
        .bind(checkpoint.module.as_str())
        .bind(&checkpoint.instance_id)
        .bind(snapshot_json)
        .bind(i64::from(checkpoint.elapsed_seconds))
        .bind(checkpoint.total_duration_seconds.map(i64::from))
        .bind(checkpoint.completed)
        .bind(checkpoint.saved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn fetch_latest(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
    ) -> Result<Option<Checkpoint>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT attempt_id, module, instance_id, snapshot,
                   elapsed_sec, duration_sec, completed, saved_at
            FROM checkpoints
            WHERE attempt_id = ?1 AND module = ?2
            ORDER BY saved_at DESC
            LIMIT 1
            ",
        )
        .bind(attempt_id.as_str())
        .bind(module.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_checkpoint_row).transpose()
    }

    async fn history(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
        limit: usize,
    ) -> Result<Vec<Checkpoint>, StorageError> {
        let limit = i64::try_from(limit)
            .map_err(|_| StorageError::Serialization("limit out of range".into()))?;

        let rows = sqlx::query(
            r"
            SELECT attempt_id, module, instance_id, snapshot,
                   elapsed_sec, duration_sec, completed, saved_at
            FROM checkpoints
            WHERE attempt_id = ?1 AND module = ?2
            ORDER BY saved_at DESC
            LIMIT ?3
            ",
        )
        .bind(attempt_id.as_str())
        .bind(module.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_checkpoint_row).collect()
    }
}
