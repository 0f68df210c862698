#![forbid(unsafe_code)]

pub mod attempt_identity;
pub mod checkpoint_writer;
pub mod config;
pub mod debounce;
pub mod error;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod snapshot_cache;
pub mod timer;

pub use exam_core::Clock;

pub use attempt_identity::AttemptIdentityManager;
pub use checkpoint_writer::CheckpointWriter;
pub use config::SyncConfig;
pub use debounce::{DebouncePolicy, DebounceState};
pub use error::SessionError;
pub use reconcile::{Hydration, HydrationSource, ReconciliationResolver};
pub use remote::{HttpCheckpointClient, HttpCheckpointConfig};
pub use session::{ExamSessionService, ExamSyncService, LifecycleSignal};
pub use snapshot_cache::LocalSnapshotCache;
pub use timer::{TimerCoordinator, TimerEvent};
