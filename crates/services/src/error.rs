//! Shared error types for the services crate.
//!
//! Most failure modes in this engine are deliberately not errors to the
//! caller: unavailable local storage, failed remote writes, corrupt cached
//! payloads and stale-instance checkpoints are all logged and degraded so the
//! learner never sees a dialog. What remains is the small set of states the
//! exam controller genuinely must handle.

use thiserror::Error;

/// Errors emitted by `ExamSessionService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// The attempt was completed; the flag is one-way and further mutation or
    /// persistence calls are rejected.
    #[error("attempt already completed")]
    Completed,
}
