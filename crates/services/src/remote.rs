use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use exam_core::model::{AttemptId, Checkpoint, ExamModule, Snapshot};
use storage::repository::{CheckpointRepository, StorageError};

/// Connection settings for the checkpoint API.
#[derive(Clone, Debug)]
pub struct HttpCheckpointConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
}

impl HttpCheckpointConfig {
    /// Reads `EXAM_SYNC_API_URL` (required) and `EXAM_SYNC_API_TOKEN`
    /// (optional) from the environment.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("EXAM_SYNC_API_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let bearer_token = env::var("EXAM_SYNC_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Some(Self {
            base_url,
            bearer_token,
        })
    }
}

/// HTTP adapter for the remote checkpoint store.
///
/// Speaks the checkpoint API's JSON envelope; the engine itself never sees
/// the transport. All failures map to `StorageError::Connection`, which the
/// writer and resolver already treat as survivable.
#[derive(Clone)]
pub struct HttpCheckpointClient {
    client: Client,
    config: HttpCheckpointConfig,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCheckpoint {
    attempt_id: String,
    module: ExamModule,
    instance_id: String,
    snapshot: Snapshot,
    elapsed_seconds: u32,
    duration_seconds: Option<u32>,
    completed: bool,
    saved_at: DateTime<Utc>,
}

impl From<&Checkpoint> for WireCheckpoint {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            attempt_id: checkpoint.attempt_id.to_string(),
            module: checkpoint.module,
            instance_id: checkpoint.instance_id.clone(),
            snapshot: checkpoint.snapshot.clone(),
            elapsed_seconds: checkpoint.elapsed_seconds,
            duration_seconds: checkpoint.total_duration_seconds,
            completed: checkpoint.completed,
            saved_at: checkpoint.saved_at,
        }
    }
}

impl From<WireCheckpoint> for Checkpoint {
    fn from(wire: WireCheckpoint) -> Self {
        Self {
            attempt_id: AttemptId::new(wire.attempt_id),
            module: wire.module,
            instance_id: wire.instance_id,
            snapshot: wire.snapshot,
            elapsed_seconds: wire.elapsed_seconds,
            total_duration_seconds: wire.duration_seconds,
            completed: wire.completed,
            saved_at: wire.saved_at,
        }
    }
}

#[derive(Deserialize)]
struct CheckpointEnvelope {
    ok: bool,
    checkpoint: Option<WireCheckpoint>,
}

#[derive(Deserialize)]
struct HistoryEnvelope {
    ok: bool,
    #[serde(default)]
    checkpoints: Vec<WireCheckpoint>,
}

impl HttpCheckpointClient {
    #[must_use]
    pub fn new(config: HttpCheckpointConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Builds a client from the environment, if configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        HttpCheckpointConfig::from_env().map(Self::new)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/checkpoints",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn connection_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl CheckpointRepository for HttpCheckpointClient {
    async fn upsert(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.post(self.endpoint()))
            .json(&WireCheckpoint::from(checkpoint))
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(StorageError::Connection(format!(
                "checkpoint upsert failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch_latest(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
    ) -> Result<Option<Checkpoint>, StorageError> {
        let response = self
            .authorize(self.client.get(self.endpoint()))
            .query(&[
                ("attemptId", attempt_id.as_str()),
                ("module", module.as_str()),
                ("latest", "true"),
            ])
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(StorageError::Connection(format!(
                "checkpoint fetch failed with status {}",
                response.status()
            )));
        }

        let envelope: CheckpointEnvelope = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if !envelope.ok {
            return Err(StorageError::Connection(
                "checkpoint API reported failure".into(),
            ));
        }
        Ok(envelope.checkpoint.map(Checkpoint::from))
    }

    async fn history(
        &self,
        attempt_id: &AttemptId,
        module: ExamModule,
        limit: usize,
    ) -> Result<Vec<Checkpoint>, StorageError> {
        let limit = limit.to_string();
        let response = self
            .authorize(self.client.get(self.endpoint()))
            .query(&[
                ("attemptId", attempt_id.as_str()),
                ("module", module.as_str()),
                ("latest", "false"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(StorageError::Connection(format!(
                "checkpoint history failed with status {}",
                response.status()
            )));
        }

        let envelope: HistoryEnvelope = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if !envelope.ok {
            return Err(StorageError::Connection(
                "checkpoint API reported failure".into(),
            ));
        }
        Ok(envelope.checkpoints.into_iter().map(Checkpoint::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::fixed_now;

    #[test]
    fn wire_checkpoint_round_trips() {
        let checkpoint = Checkpoint {
            attempt_id: AttemptId::new("attempt-1"),
            module: ExamModule::Listening,
            instance_id: "inst-9".into(),
            snapshot: Snapshot::new(),
            elapsed_seconds: 42,
            total_duration_seconds: Some(1800),
            completed: false,
            saved_at: fixed_now(),
        };

        let json = serde_json::to_string(&WireCheckpoint::from(&checkpoint)).unwrap();
        assert!(json.contains("\"attemptId\""));
        assert!(json.contains("\"listening\""));

        let back: Checkpoint = serde_json::from_str::<WireCheckpoint>(&json).unwrap().into();
        assert_eq!(back, checkpoint);
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = HttpCheckpointClient::new(HttpCheckpointConfig {
            base_url: "https://api.example.test/exam/".into(),
            bearer_token: None,
        });
        assert_eq!(client.endpoint(), "https://api.example.test/exam/checkpoints");
    }
}
