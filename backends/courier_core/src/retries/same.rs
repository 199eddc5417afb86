use std::time;

use super::{RetryDecider, RetryState, DEFAULT_MIN_DURATION};

/// Waits the same duration between every attempt.
#[derive(Clone, Debug)]
pub struct SameBackoffDecider(time::Duration);

impl Default for SameBackoffDecider {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DURATION)
    }
}

impl SameBackoffDecider {
    pub fn new(duration: impl Into<time::Duration>) -> Self {
        Self(duration.into())
    }
}

impl RetryDecider for SameBackoffDecider {
    fn decide(&self, state: RetryState) -> Option<RetryState> {
        if !state.can_retry() {
            return None;
        }

        Some(RetryState {
            wait: Some(self.0),
            attempt: state.attempt.saturating_add(1),
            total_allowed: state.total_allowed,
        })
    }
}
