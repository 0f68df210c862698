use chrono::{DateTime, Duration, Utc};

/// Quiet-period and staleness-ceiling settings for debounced persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Quiet period after the latest mutation before a flush fires.
    pub delay: Duration,
    /// Absolute ceiling on staleness: a flush fires no later than this long
    /// after the first unflushed mutation, even under continuous input.
    pub max_wait: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::milliseconds(800),
            max_wait: Duration::milliseconds(3000),
        }
    }
}

/// Debounce state machine, decoupled from any host timer facility.
///
/// The host supplies time explicitly: `schedule` on every mutation, `due` (or
/// `next_deadline`) whenever it wants to know if a flush should fire. A newer
/// mutation replaces the pending quiet-period deadline, but the `max_wait`
/// ceiling is pinned to the first unflushed mutation and cannot be pushed
/// back.
#[derive(Debug, Clone)]
pub struct DebounceState {
    policy: DebouncePolicy,
    first_pending: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
}

impl DebounceState {
    #[must_use]
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            first_pending: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn policy(&self) -> DebouncePolicy {
        self.policy
    }

    /// Starts or refreshes the quiet-period timer.
    pub fn schedule(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(now + self.policy.delay);
        if self.first_pending.is_none() {
            self.first_pending = Some(now);
        }
    }

    /// Drops any pending flush outright.
    pub fn cancel(&mut self) {
        self.first_pending = None;
        self.deadline = None;
    }

    /// Marks the pending mutations as flushed.
    pub fn acknowledge(&mut self) {
        self.cancel();
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.first_pending.is_some()
    }

    /// True when a flush should fire now: either the quiet period elapsed or
    /// the first unflushed mutation has waited `max_wait`.
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        self.next_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// The instant the pending flush will become due, if one is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let first = self.first_pending?;
        let deadline = self.deadline?;
        Some(deadline.min(first + self.policy.max_wait))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::fixed_now;

    fn state() -> DebounceState {
        DebounceState::new(DebouncePolicy::default())
    }

    #[test]
    fn nothing_is_due_without_a_schedule() {
        let state = state();
        assert!(!state.is_pending());
        assert!(!state.due(fixed_now()));
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn quiet_period_elapses() {
        let mut state = state();
        let t0 = fixed_now();
        state.schedule(t0);

        assert!(!state.due(t0 + Duration::milliseconds(799)));
        assert!(state.due(t0 + Duration::milliseconds(800)));
    }

    #[test]
    fn newer_mutation_replaces_the_quiet_period() {
        let mut state = state();
        let t0 = fixed_now();
        state.schedule(t0);
        state.schedule(t0 + Duration::milliseconds(600));

        // the original deadline has passed but was replaced
        assert!(!state.due(t0 + Duration::milliseconds(900)));
        assert!(state.due(t0 + Duration::milliseconds(1400)));
    }

    #[test]
    fn max_wait_bounds_continuous_input() {
        let mut state = state();
        let t0 = fixed_now();
        // mutations every 500 ms keep the quiet period from ever elapsing
        for i in 0..6 {
            state.schedule(t0 + Duration::milliseconds(i * 500));
        }
        assert!(state.due(t0 + Duration::milliseconds(3000)));
    }

    #[test]
    fn acknowledge_resets_the_ceiling() {
        let mut state = state();
        let t0 = fixed_now();
        state.schedule(t0);
        state.acknowledge();
        assert!(!state.is_pending());

        // a new burst gets its own max_wait window
        let t1 = t0 + Duration::seconds(10);
        state.schedule(t1);
        assert!(!state.due(t1 + Duration::milliseconds(500)));
        assert!(state.due(t1 + Duration::milliseconds(800)));
    }

    #[test]
    fn cancel_drops_the_pending_flush() {
        let mut state = state();
        state.schedule(fixed_now());
        state.cancel();
        assert!(!state.due(fixed_now() + Duration::seconds(60)));
    }
}
