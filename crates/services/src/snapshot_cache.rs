use std::sync::Arc;

use tracing::warn;

use exam_core::model::{ExamInstanceRef, PersistedSnapshot};
use storage::blob::BlobStore;

/// Synchronous, best-effort local mirror of the latest known progress.
///
/// Serves the optimistic paint on load and the fast half of every save.
/// Storage failures shift durability responsibility entirely to the remote
/// store; a corrupt cached payload is discarded and treated as absent. Both
/// are logged, neither is surfaced.
#[derive(Clone)]
pub struct LocalSnapshotCache {
    blobs: Arc<dyn BlobStore>,
}

fn snapshot_key(instance: &ExamInstanceRef) -> String {
    format!("exam:{}:{}:snapshot", instance.module, instance.instance_id)
}

impl LocalSnapshotCache {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Reads the cached snapshot for this instance, if one survives.
    #[must_use]
    pub fn read(&self, instance: &ExamInstanceRef) -> Option<PersistedSnapshot> {
        let raw = match self.blobs.get(&snapshot_key(instance)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(instance = %instance, error = %e, "snapshot cache unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(persisted) => Some(persisted),
            Err(e) => {
                warn!(instance = %instance, error = %e, "discarding corrupt cached snapshot");
                None
            }
        }
    }

    /// Writes the snapshot synchronously; failures are swallowed.
    pub fn write(&self, instance: &ExamInstanceRef, persisted: &PersistedSnapshot) {
        let raw = match serde_json::to_string(persisted) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(instance = %instance, error = %e, "snapshot not serializable");
                return;
            }
        };
        if let Err(e) = self.blobs.set(&snapshot_key(instance), &raw) {
            warn!(instance = %instance, error = %e, "snapshot cache write failed");
        }
    }

    /// Removes the cached snapshot; failures are swallowed.
    pub fn remove(&self, instance: &ExamInstanceRef) {
        if let Err(e) = self.blobs.remove(&snapshot_key(instance)) {
            warn!(instance = %instance, error = %e, "snapshot cache remove failed");
        }
    }
}
