use std::sync::{Arc, Mutex};
use std::time;

use crate::synca::recover_lock;

use super::{RetryDecider, RetryState, DEFAULT_MIN_DURATION};

const DEFAULT_JITTER: f32 = 0.6;
const DEFAULT_FACTOR: u32 = 3;

/// Grows the wait by `factor` on every attempt with random jitter applied,
/// kept between `min_duration` and `max_duration`.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffDecider {
    pub factor: u32,
    pub jitter: f32,
    pub min_duration: time::Duration,
    pub max_duration: time::Duration,
    rng: Arc<Mutex<fastrand::Rng>>,
}

impl Default for ExponentialBackoffDecider {
    fn default() -> Self {
        Self::new(DEFAULT_FACTOR, DEFAULT_JITTER, DEFAULT_MIN_DURATION, None)
    }
}

impl ExponentialBackoffDecider {
    /// `jitter` is clamped into `0.01..=0.99`.
    pub fn new(
        factor: u32,
        jitter: f32,
        min_duration: time::Duration,
        max_duration: impl Into<Option<time::Duration>>,
    ) -> Self {
        Self {
            factor: factor.max(1),
            jitter: jitter.clamp(0.01, 0.99),
            min_duration,
            rng: Arc::new(Mutex::new(fastrand::Rng::new())),
            max_duration: max_duration.into().unwrap_or(time::Duration::MAX),
        }
    }

    pub fn from_duration(
        min_duration: time::Duration,
        max_duration: impl Into<Option<time::Duration>>,
    ) -> Self {
        Self::new(DEFAULT_FACTOR, DEFAULT_JITTER, min_duration, max_duration)
    }

    /// Fixes the random source, mostly so tests are repeatable.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(fastrand::Rng::with_seed(seed))),
            ..self
        }
    }
}

impl RetryDecider for ExponentialBackoffDecider {
    fn decide(&self, state: RetryState) -> Option<RetryState> {
        if !state.can_retry() {
            return None;
        }

        let next_attempt = state.attempt.saturating_add(1);
        let exponent = self.factor.saturating_pow(next_attempt);
        let duration = self.min_duration.saturating_mul(exponent);

        // jitter in whole percents, keeps floats out of the duration maths
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jitter_percent = ((self.jitter * 100f32) as u32).max(1);
        let random = recover_lock(&self.rng).u32(0..jitter_percent * 2);

        let scaled = duration.saturating_mul(100);
        let scaled = if random < jitter_percent {
            scaled.saturating_sub(duration.saturating_mul(random))
        } else {
            scaled.saturating_add(duration.saturating_mul(random / 2))
        };

        let wait = (scaled / 100).clamp(self.min_duration, self.max_duration);
        Some(RetryState {
            wait: Some(wait),
            attempt: next_attempt,
            total_allowed: state.total_allowed,
        })
    }
}
