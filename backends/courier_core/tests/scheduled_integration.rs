//! Integration tests for scheduled invocations through a service binding.
//!
//! WHY: The scheduled entry point is what a timer or trigger drives, it must
//! default its inputs and contain every failure of the handler.
//!
//! WHAT: Tests defaults, explicit triggers, retry suppression and failures.
//!
//! HOW: Binds services with scheduled handlers and calls
//! `ServiceBinding::scheduled`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::extensions::result_ext::{BoxedError, BoxedResult};
use courier_core::http::{Request, Response, Service, ServiceBinding, Status};
use courier_core::retries::SameBackoffDecider;
use courier_core::scheduled::{now_millis, Outcome, ScheduledController, ScheduledEvent, ScheduledTrigger};

/// Records what its handler saw and suppresses retries for one cron label.
#[derive(Default)]
struct RecordingService {
    seen: Mutex<Vec<ScheduledEvent>>,
}

impl Service for RecordingService {
    fn fetch(&self, _request: Request) -> Result<Response, BoxedError> {
        Ok(Response::with_status(Status::NotFound))
    }

    fn scheduled(&self, controller: &ScheduledController) -> Result<(), BoxedError> {
        self.seen.lock().unwrap().push(controller.event());
        if controller.cron() == "* * * * 30" {
            controller.no_retry();
            controller.no_retry();
        }
        Ok(())
    }
}

struct FailingService {
    attempts: AtomicU32,
    panic: bool,
}

impl Service for FailingService {
    fn fetch(&self, _request: Request) -> Result<Response, BoxedError> {
        Ok(Response::with_status(Status::NotFound))
    }

    fn scheduled(&self, controller: &ScheduledController) -> Result<(), BoxedError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic {
            controller.no_retry();
            panic!("scheduled handler panicked on attempt {attempt}");
        }
        if attempt < 3 {
            return Err(std::io::Error::other("not ready yet").into_boxed_error());
        }
        Ok(())
    }
}

// ========================================================================
// Entry point
// ========================================================================

/// WHY: An untriggered invocation must look like one happening now
/// WHAT: Tests default time, empty label and an ok outcome without noRetry
#[test]
fn test_default_invocation() {
    let service = Arc::new(RecordingService::default());
    let binding = ServiceBinding::from_arc(service.clone());

    let before = now_millis();
    let outcome = binding.scheduled(None);

    assert_eq!(outcome.outcome, Outcome::Ok);
    assert!(!outcome.no_retry);

    let seen = service.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].cron, "");
    assert!(seen[0].scheduled_time.abs_diff(before) < 3000);
}

/// WHY: Explicit triggers pass through and retry suppression is idempotent
/// WHAT: Tests time 1000 and a cron label reach the handler, noRetry is set
#[test]
fn test_explicit_invocation_with_no_retry() {
    let service = Arc::new(RecordingService::default());
    let binding = ServiceBinding::from_arc(service.clone());

    let outcome = binding.scheduled(Some(ScheduledTrigger::at(1000).with_cron("* * * * 30")));

    assert!(outcome.is_ok());
    assert!(outcome.no_retry);
    assert_eq!(
        serde_json::to_value(outcome).unwrap(),
        serde_json::json!({"outcome": "ok", "noRetry": true})
    );

    let seen = service.seen.lock().unwrap();
    assert_eq!(seen[0].scheduled_time, 1000);
    assert_eq!(seen[0].cron, "* * * * 30");
}

/// WHY: Triggers arrive as JSON from whatever drives the timer
/// WHAT: Tests a decoded `{scheduledTime, cron}` record drives the handler
#[test]
fn test_trigger_decoded_from_json() {
    let service = Arc::new(RecordingService::default());
    let binding = ServiceBinding::from_arc(service.clone());

    let trigger: ScheduledTrigger =
        serde_json::from_str(r#"{"scheduledTime": 1000, "cron": "* * * * 30"}"#).unwrap();
    assert!(binding.scheduled(Some(trigger)).no_retry);

    let partial: ScheduledTrigger = serde_json::from_str(r#"{"cron": "hourly"}"#).unwrap();
    let outcome = binding.scheduled(Some(partial));
    assert!(!outcome.no_retry);
    assert_eq!(service.seen.lock().unwrap()[1].cron, "hourly");
}

/// WHY: Services without scheduled work still answer the entry point
/// WHAT: Tests the default scheduled handler reports ok
#[test]
fn test_service_without_scheduled_handler() {
    let binding = ServiceBinding::new(courier_core::http::service_fn(|_| {
        Ok(Response::with_status(Status::NoContent))
    }));
    let outcome = binding.scheduled(None);
    assert!(outcome.is_ok());
    assert!(!outcome.no_retry);
}

// ========================================================================
// Failures
// ========================================================================

/// WHY: A panicking handler must not take the caller down
/// WHAT: Tests a panic is an exception with noRetry as set before it
#[test]
fn test_panic_is_contained() {
    let binding = ServiceBinding::new(FailingService {
        attempts: AtomicU32::new(0),
        panic: true,
    });

    let outcome = binding.scheduled(None);
    assert_eq!(outcome.outcome, Outcome::Exception);
    assert!(outcome.no_retry);
    assert!(!outcome.is_retryable());
}

/// WHY: Retryable failures are retried until the handler succeeds
/// WHAT: Tests the retry driver re-invokes after returned errors
#[test]
fn test_failures_are_retried() {
    let binding = ServiceBinding::new(FailingService {
        attempts: AtomicU32::new(0),
        panic: false,
    });

    let first = binding.scheduled(None);
    assert_eq!(first.outcome, Outcome::Exception);
    assert!(first.is_retryable());

    let run = binding.scheduled_with_retries(
        Some(ScheduledTrigger::at(5000)),
        &SameBackoffDecider::new(Duration::from_millis(1)),
        5,
    );
    assert!(run.outcome.is_ok());
    assert_eq!(run.attempts, 2);
}
