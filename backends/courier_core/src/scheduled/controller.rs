use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::synca::OnSignal;

/// Milliseconds since the Unix epoch, zero if the clock is set before it.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// What the caller of a scheduled invocation may supply, anything left out
/// is defaulted when the invocation starts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    #[serde(
        rename = "scheduledTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scheduled_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

impl ScheduledTrigger {
    #[must_use]
    pub fn at(scheduled_time: u64) -> Self {
        Self {
            scheduled_time: Some(scheduled_time),
            cron: None,
        }
    }

    #[must_use]
    pub fn with_cron<S: Into<String>>(mut self, cron: S) -> Self {
        self.cron = Some(cron.into());
        self
    }

    /// Fills in the current time and an empty label where unset.
    #[must_use]
    pub fn resolve(self) -> Self {
        Self {
            scheduled_time: Some(self.scheduled_time.unwrap_or_else(now_millis)),
            cron: Some(self.cron.unwrap_or_default()),
        }
    }
}

/// The view of an invocation a handler serialises back, e.g. in a test echo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(rename = "scheduledTime")]
    pub scheduled_time: u64,
    pub cron: String,
}

/// `ScheduledController` is lent to a scheduled handler for the duration of
/// one invocation.
#[derive(Debug)]
pub struct ScheduledController {
    scheduled_time: u64,
    cron: String,
    no_retry: OnSignal,
    finalized: AtomicBool,
}

impl ScheduledController {
    #[must_use]
    pub fn new(trigger: Option<ScheduledTrigger>) -> Self {
        let trigger = trigger.unwrap_or_default().resolve();
        Self {
            scheduled_time: trigger.scheduled_time.unwrap_or_default(),
            cron: trigger.cron.unwrap_or_default(),
            no_retry: OnSignal::new(),
            finalized: AtomicBool::new(false),
        }
    }

    /// Milliseconds since the Unix epoch this invocation was scheduled for.
    #[must_use]
    pub fn scheduled_time(&self) -> u64 {
        self.scheduled_time
    }

    #[must_use]
    pub fn cron(&self) -> &str {
        &self.cron
    }

    #[must_use]
    pub fn event(&self) -> ScheduledEvent {
        ScheduledEvent {
            scheduled_time: self.scheduled_time,
            cron: self.cron.clone(),
        }
    }

    /// Asks for this invocation not to be retried should it fail. Calling it
    /// more than once changes nothing, calls after the outcome was recorded
    /// are ignored.
    pub fn no_retry(&self) {
        if self.finalized.load(Ordering::SeqCst) {
            debug!("ignoring no_retry on a finished invocation");
            return;
        }
        if self.no_retry.turn_on() {
            debug!("scheduled invocation for {} opted out of retries", self.scheduled_time);
        }
    }

    #[must_use]
    pub fn retry_suppressed(&self) -> bool {
        self.no_retry.probe()
    }

    /// True if the scheduled time lies within `skew` of the current clock.
    #[must_use]
    pub fn is_current(&self, skew: Duration) -> bool {
        let skew = u64::try_from(skew.as_millis()).unwrap_or(u64::MAX);
        now_millis().abs_diff(self.scheduled_time) <= skew
    }

    pub(crate) fn finalize(&self) {
        self.finalized.store(true, Ordering::SeqCst);
    }
}
