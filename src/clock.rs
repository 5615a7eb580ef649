//! Wall-clock source and per-phase time budget
//!
//! The patch phase checks its budget only between packages; a single slow
//! install can overrun it. That is accepted: the check never preempts a
//! running command.

#[cfg(any(test, feature = "test-util"))]
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock that only moves when told to, or by a fixed step per reading.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    state: Arc<Mutex<(Duration, Duration)>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Arc::new(Mutex::new((Duration::ZERO, Duration::ZERO))),
        }
    }

    /// A clock that advances by `step` after every reading.
    pub fn stepping(step: Duration) -> Self {
        let clock = Self::new();
        clock.set_step(step);
        clock
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += by;
        }
    }

    pub fn set_step(&self, step: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.1 = step;
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.state.lock() {
            Ok(mut state) => {
                let reading = self.base + state.0;
                let step = state.1;
                state.0 += step;
                reading
            }
            Err(_) => self.base,
        }
    }
}

/// Maximum wall-clock time a phase may spend before deferring the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleBudget {
    limit: Duration,
    started: Instant,
}

impl CycleBudget {
    pub fn start(limit: Duration, clock: &dyn Clock) -> Self {
        Self {
            limit,
            started: clock.now(),
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_duration_since(self.started)
    }

    /// Strictly more than `limit` has passed since the phase began.
    pub fn exceeded(&self, clock: &dyn Clock) -> bool {
        self.elapsed(clock) > self.limit
    }
}
