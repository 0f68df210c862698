/// Outcome of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Untimed attempt, stopped timer, or already expired.
    Idle,
    /// Countdown decremented; carries the new remaining value.
    Ticked(u32),
    /// The countdown hit zero on this tick. Signaled exactly once; the exam
    /// controller decides what a timeout means.
    Expired,
}

/// Per-second countdown for a timed attempt.
///
/// The coordinator never persists anything itself: the session picks the
/// tick-updated value up on the writer's own debounce/heartbeat cadence, so
/// write volume stays independent of tick rate. The host drives `tick` at
/// 1 Hz.
#[derive(Debug, Clone, Default)]
pub struct TimerCoordinator {
    remaining: Option<u32>,
    running: bool,
    expired: bool,
}

impl TimerCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the countdown from the resolver's recomputed value.
    ///
    /// This is the only entry point for the countdown across a reload gap; a
    /// raw stored value is never fed in directly. `None` means untimed.
    pub fn hydrate(&mut self, remaining: Option<u32>) {
        self.remaining = remaining;
        self.expired = false;
        self.running = remaining.is_some();
    }

    /// Overwrites the countdown mid-session (e.g. granted extra time).
    pub fn set_remaining(&mut self, remaining: Option<u32>) {
        self.remaining = remaining;
        match remaining {
            Some(value) => {
                self.running = true;
                if value > 0 {
                    self.expired = false;
                }
            }
            None => self.running = false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running && !self.expired
    }

    /// Stops ticking without touching the remaining value.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TimerEvent {
        if !self.running || self.expired {
            return TimerEvent::Idle;
        }
        match self.remaining {
            None => TimerEvent::Idle,
            Some(0) => {
                // hydrated at zero: the time ran out while the page was away
                self.expired = true;
                self.running = false;
                TimerEvent::Expired
            }
            Some(value) => {
                let next = value - 1;
                self.remaining = Some(next);
                if next == 0 {
                    self.expired = true;
                    self.running = false;
                    TimerEvent::Expired
                } else {
                    TimerEvent::Ticked(next)
                }
            }
        }
    }
}
