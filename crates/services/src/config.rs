use std::env;

use chrono::Duration;

use crate::debounce::DebouncePolicy;

/// Persistence cadence for a session: debounce policy plus the heartbeat
/// interval that acts as a debounce-starvation safety net.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub debounce: DebouncePolicy,
    pub heartbeat: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DebouncePolicy::default(),
            heartbeat: Duration::seconds(15),
        }
    }
}

impl SyncConfig {
    /// Reads overrides from `EXAM_SYNC_DEBOUNCE_MS`, `EXAM_SYNC_MAX_WAIT_MS`
    /// and `EXAM_SYNC_HEARTBEAT_SECS`, falling back to the defaults for
    /// anything absent or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_millis("EXAM_SYNC_DEBOUNCE_MS") {
            config.debounce.delay = ms;
        }
        if let Some(ms) = env_millis("EXAM_SYNC_MAX_WAIT_MS") {
            config.debounce.max_wait = ms;
        }
        if let Some(secs) = env_var_i64("EXAM_SYNC_HEARTBEAT_SECS") {
            config.heartbeat = Duration::seconds(secs);
        }
        config
    }
}

fn env_var_i64(name: &str) -> Option<i64> {
    env::var(name).ok()?.trim().parse().ok().filter(|v| *v > 0)
}

fn env_millis(name: &str) -> Option<Duration> {
    env_var_i64(name).map(Duration::milliseconds)
}
