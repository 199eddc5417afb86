use std::time;

mod exponential;
mod same;

pub use exponential::*;
pub use same::*;

pub const DEFAULT_MIN_DURATION: time::Duration = time::Duration::from_millis(100);

/// `RetryState` tracks how many attempts an operation already had and how
/// long to wait before the next one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryState {
    pub wait: Option<time::Duration>,
    pub total_allowed: u32,
    pub attempt: u32,
}

impl RetryState {
    #[must_use]
    pub fn new(attempt: u32, total_allowed: u32, wait: Option<time::Duration>) -> Self {
        Self {
            wait,
            total_allowed,
            attempt,
        }
    }

    /// A fresh state allowing `total_allowed` retries after the first attempt.
    #[must_use]
    pub fn first(total_allowed: u32) -> Self {
        Self::new(0, total_allowed, None)
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.attempt < self.total_allowed
    }
}

/// `RetryDecider` decides whether another attempt happens and how long to
/// wait before it, returning `None` to stop.
pub trait RetryDecider {
    fn decide(&self, state: RetryState) -> Option<RetryState>;
}

/// Never retries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetryDecider;

impl RetryDecider for NoRetryDecider {
    fn decide(&self, _state: RetryState) -> Option<RetryState> {
        None
    }
}

#[cfg(test)]
mod retry_state_test {
    use super::{NoRetryDecider, RetryDecider, RetryState};

    #[test]
    fn can_retry_until_attempts_run_out() {
        assert!(RetryState::first(1).can_retry());
        assert!(!RetryState::new(1, 1, None).can_retry());
        assert!(!RetryState::first(0).can_retry());
    }

    #[test]
    fn no_retry_decider_always_stops() {
        assert_eq!(NoRetryDecider.decide(RetryState::first(5)), None);
    }
}
