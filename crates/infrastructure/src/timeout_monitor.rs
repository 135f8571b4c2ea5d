//! Timed operation monitoring.
//!
//! [`TimeoutOperationMonitor`] keeps counters per outcome and flags operations
//! that finished after their timeout budget.

use dispatch_domain::{OperationMonitor, OperationOutcome, OperationToken};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Completed operations whose elapsed time exceeded their timeout.
    pub slow: u64,
}

impl MonitorStats {
    pub fn active(&self) -> u64 {
        self.started
            .saturating_sub(self.succeeded + self.failed + self.timed_out)
    }
}

#[derive(Debug, Default)]
pub struct TimeoutOperationMonitor {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    slow: AtomicU64,
}

impl TimeoutOperationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            slow: self.slow.load(Ordering::Relaxed),
        }
    }
}

impl OperationMonitor for TimeoutOperationMonitor {
    fn start_operation(&self, operation_name: &str, timeout: Duration) -> OperationToken {
        self.started.fetch_add(1, Ordering::Relaxed);
        let token = OperationToken::new(operation_name, timeout);
        debug!(
            operation.id = %token.id,
            operation.name = operation_name,
            operation.timeout_ms = timeout.as_millis() as u64,
            "Operation started"
        );
        token
    }

    fn complete_operation(&self, token: OperationToken, outcome: OperationOutcome) {
        let elapsed = token.elapsed();
        let counter = match outcome {
            OperationOutcome::Succeeded => &self.succeeded,
            OperationOutcome::Failed => &self.failed,
            OperationOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if outcome != OperationOutcome::TimedOut && elapsed > token.timeout {
            self.slow.fetch_add(1, Ordering::Relaxed);
            warn!(
                operation.id = %token.id,
                operation.name = %token.operation_name,
                operation.elapsed_ms = elapsed.as_millis() as u64,
                operation.timeout_ms = token.timeout.as_millis() as u64,
                "Operation exceeded its timeout"
            );
        }

        debug!(
            operation.id = %token.id,
            operation.name = %token.operation_name,
            operation.outcome = ?outcome,
            operation.elapsed_ms = elapsed.as_millis() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_outcomes() {
        let monitor = TimeoutOperationMonitor::new();
        let a = monitor.start_operation("schedule:a", Duration::from_secs(5));
        let b = monitor.start_operation("schedule:b", Duration::from_secs(5));
        let _c = monitor.start_operation("schedule:c", Duration::from_secs(5));

        monitor.complete_operation(a, OperationOutcome::Succeeded);
        monitor.complete_operation(b, OperationOutcome::Failed);

        let stats = monitor.stats();
        assert_eq!(stats.started, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 0);
        assert_eq!(stats.active(), 1);
    }

    #[test]
    fn test_flags_slow_operations() {
        let monitor = TimeoutOperationMonitor::new();
        let token = monitor.start_operation("slow", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        monitor.complete_operation(token, OperationOutcome::Succeeded);
        assert_eq!(monitor.stats().slow, 1);
    }
}
