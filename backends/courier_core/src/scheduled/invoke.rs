use std::panic::{self, AssertUnwindSafe};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::extensions::result_ext::{describe_panic, BoxedError};
use crate::retries::{RetryDecider, RetryState};

use super::{ScheduledController, ScheduledTrigger};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Exception,
}

/// Serialised as `{"outcome":"ok","noRetry":false}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOutcome {
    pub outcome: Outcome,
    #[serde(rename = "noRetry")]
    pub no_retry: bool,
}

impl ScheduledOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }

    /// Whether a failed invocation may be attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.outcome == Outcome::Exception && !self.no_retry
    }
}

/// Runs `handler` once for `trigger`. Errors returned by the handler and
/// panics raised inside it are both recorded as [`Outcome::Exception`] rather
/// than propagated.
pub fn invoke<F>(trigger: Option<ScheduledTrigger>, handler: F) -> ScheduledOutcome
where
    F: FnOnce(&ScheduledController) -> Result<(), BoxedError>,
{
    let controller = ScheduledController::new(trigger);
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler(&controller))) {
        Ok(Ok(())) => Outcome::Ok,
        Ok(Err(err)) => {
            warn!(
                "scheduled handler for {} failed: {}",
                controller.scheduled_time(),
                err
            );
            Outcome::Exception
        }
        Err(payload) => {
            error!(
                "scheduled handler for {} panicked: {}",
                controller.scheduled_time(),
                describe_panic(payload.as_ref())
            );
            Outcome::Exception
        }
    };
    controller.finalize();

    let result = ScheduledOutcome {
        outcome,
        no_retry: controller.retry_suppressed(),
    };
    info!(
        "scheduled invocation {:?} at {} finished with {:?}",
        controller.cron(),
        controller.scheduled_time(),
        result
    );
    result
}

/// Result of [`run_with_retries`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledRun {
    pub outcome: ScheduledOutcome,
    /// Invocations made, the first one included.
    pub attempts: u32,
}

/// Invokes `handler` and re-invokes it after failures until it succeeds, it
/// asks for no retries or `decider` gives up. Every attempt sees the same
/// scheduled time and label.
pub fn run_with_retries<F>(
    trigger: Option<ScheduledTrigger>,
    decider: &dyn RetryDecider,
    total_allowed: u32,
    mut handler: F,
) -> ScheduledRun
where
    F: FnMut(&ScheduledController) -> Result<(), BoxedError>,
{
    let trigger = trigger.unwrap_or_default().resolve();
    let mut state = RetryState::first(total_allowed);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let outcome = invoke(Some(trigger.clone()), &mut handler);
        if !outcome.is_retryable() {
            return ScheduledRun { outcome, attempts };
        }

        match decider.decide(state) {
            Some(next) => {
                debug!(
                    "retrying scheduled invocation, attempt {} of {}",
                    next.attempt, next.total_allowed
                );
                if let Some(wait) = next.wait {
                    thread::sleep(wait);
                }
                state = next;
            }
            None => return ScheduledRun { outcome, attempts },
        }
    }
}
