//! Failure notification seam
//!
//! On FAIL finalization the runner hands (subject, error detail) to a
//! notifier. Delivery is an external concern; the engine only guarantees
//! that a failing notifier can never fail or block an operation.

use tracing::warn;

/// Sink for operation failures.
pub trait FailureNotifier: Send + Sync {
    /// Must not block; any internal failure stays internal.
    fn notify_failure(&self, subject: &str, detail: &str);
}

/// Default notifier: records the failure in the service log.
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn notify_failure(&self, subject: &str, detail: &str) {
        warn!("Operation failed for {}: {}", subject, detail);
    }
}
