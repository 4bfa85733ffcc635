//! Time source for execution budgets, cache TTL and timing stats.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. With an auto step, every reading
/// advances the clock afterwards, so each instruction boundary observes
/// a later time.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    auto_step: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.state.lock().offset += by;
    }

    pub fn set_auto_step(&self, step: Duration) {
        self.state.lock().auto_step = step;
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().offset
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let mut state = self.state.lock();
        let now = self.base + state.offset;
        let step = state.auto_step;
        state.offset += step;
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new();
        let a = clock.now();
        assert_eq!(clock.now(), a);
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - a, Duration::from_secs(5));
    }

    #[test]
    fn auto_step_advances_after_each_reading() {
        let clock = ManualClock::new();
        clock.set_auto_step(Duration::from_millis(2));
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert_eq!(b - a, Duration::from_millis(2));
        assert_eq!(c - a, Duration::from_millis(4));
        assert_eq!(clock.elapsed(), Duration::from_millis(6));
    }
}
