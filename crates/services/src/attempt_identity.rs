use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use exam_core::model::{AttemptId, ExamInstanceRef};
use storage::blob::BlobStore;

/// Issues and recovers the stable attempt id for each exam instance.
///
/// The id is created on first engagement, persisted in durable local storage
/// and never regenerated while progress exists. When local storage is
/// unavailable the manager degrades to an in-memory mapping scoped to its own
/// lifetime, so `get_or_create` stays idempotent for the current session and
/// never returns an error.
#[derive(Clone)]
pub struct AttemptIdentityManager {
    blobs: Arc<dyn BlobStore>,
    fallback: Arc<Mutex<HashMap<ExamInstanceRef, AttemptId>>>,
}

fn attempt_key(instance: &ExamInstanceRef) -> String {
    format!("exam:{}:{}:attempt", instance.module, instance.instance_id)
}

impl AttemptIdentityManager {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            fallback: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn fallback_guard(&self) -> MutexGuard<'_, HashMap<ExamInstanceRef, AttemptId>> {
        match self.fallback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the attempt id for this instance, creating one if absent.
    #[must_use]
    pub fn get_or_create(&self, instance: &ExamInstanceRef) -> AttemptId {
        let key = attempt_key(instance);

        match self.blobs.get(&key) {
            Ok(Some(raw)) => return AttemptId::new(raw),
            Ok(None) => {}
            Err(e) => {
                warn!(instance = %instance, error = %e, "attempt storage unreadable, using session-scoped id");
                return self
                    .fallback_guard()
                    .entry(instance.clone())
                    .or_insert_with(AttemptId::random)
                    .clone();
            }
        }

        // A previous write may already have degraded to the fallback map.
        if let Some(existing) = self.fallback_guard().get(instance) {
            return existing.clone();
        }

        let fresh = AttemptId::random();
        if let Err(e) = self.blobs.set(&key, fresh.as_str()) {
            warn!(instance = %instance, error = %e, "attempt id not persisted, scoped to this session");
            self.fallback_guard()
                .insert(instance.clone(), fresh.clone());
        }
        fresh
    }

    /// Drops the local mapping after submission or abandonment.
    ///
    /// Remote checkpoint history is untouched; it stays available for audit.
    /// A later `get_or_create` for the same instance issues a fresh id.
    pub fn clear(&self, instance: &ExamInstanceRef) {
        if let Err(e) = self.blobs.remove(&attempt_key(instance)) {
            warn!(instance = %instance, error = %e, "could not remove attempt mapping");
        }
        self.fallback_guard().remove(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::ExamModule;
    use storage::blob::{InMemoryBlobStore, UnavailableBlobStore};

    fn instance() -> ExamInstanceRef {
        ExamInstanceRef::new(ExamModule::Reading, "inst-1")
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let manager = AttemptIdentityManager::new(Arc::new(InMemoryBlobStore::new()));
        let first = manager.get_or_create(&instance());
        let second = manager.get_or_create(&instance());
        assert_eq!(first, second);
    }

    #[test]
    fn instances_get_distinct_ids() {
        let manager = AttemptIdentityManager::new(Arc::new(InMemoryBlobStore::new()));
        let reading = manager.get_or_create(&instance());
        let listening =
            manager.get_or_create(&ExamInstanceRef::new(ExamModule::Listening, "inst-1"));
        assert_ne!(reading, listening);
    }

    #[test]
    fn survives_through_a_second_manager_on_shared_storage() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let first = AttemptIdentityManager::new(blobs.clone()).get_or_create(&instance());
        let second = AttemptIdentityManager::new(blobs).get_or_create(&instance());
        assert_eq!(first, second);
    }

    #[test]
    fn degraded_storage_still_yields_a_stable_id() {
        let manager = AttemptIdentityManager::new(Arc::new(UnavailableBlobStore));
        let first = manager.get_or_create(&instance());
        let second = manager.get_or_create(&instance());
        assert_eq!(first, second);
    }

    #[test]
    fn clear_issues_a_fresh_id_next_time() {
        let manager = AttemptIdentityManager::new(Arc::new(InMemoryBlobStore::new()));
        let before = manager.get_or_create(&instance());
        manager.clear(&instance());
        let after = manager.get_or_create(&instance());
        assert_ne!(before, after);
    }

    #[test]
    fn clear_works_in_degraded_mode_too() {
        let manager = AttemptIdentityManager::new(Arc::new(UnavailableBlobStore));
        let before = manager.get_or_create(&instance());
        manager.clear(&instance());
        let after = manager.get_or_create(&instance());
        assert_ne!(before, after);
    }
}
