//! Observability for delivery operations.
//!
//! Counters and timing. Structured logging itself rides the optional
//! `tracing` feature at the call sites that have something to say.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Delivery metrics collector.
#[derive(Debug, Default)]
pub struct MailerMetrics {
    /// Messages composed from session state.
    pub messages_composed: AtomicU64,
    /// Messages sent successfully (both delivery paths).
    pub messages_sent: AtomicU64,
    /// Messages that failed to send.
    pub messages_failed: AtomicU64,
    /// Artifacts deposited in the pickup directory.
    pub pickup_deposits: AtomicU64,
    /// Submissions accepted by the network relay.
    pub relay_submissions: AtomicU64,
}

impl MailerMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message composition.
    pub fn record_compose(&self) {
        self.messages_composed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful pickup deposit.
    pub fn record_pickup_deposit(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.pickup_deposits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful relay submission.
    pub fn record_relay_submission(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.relay_submissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed send.
    pub fn record_send_failure(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_composed: self.messages_composed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            pickup_deposits: self.pickup_deposits.load(Ordering::Relaxed),
            relay_submissions: self.relay_submissions.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters.
    pub fn reset(&self) {
        self.messages_composed.store(0, Ordering::Relaxed);
        self.messages_sent.store(0, Ordering::Relaxed);
        self.messages_failed.store(0, Ordering::Relaxed);
        self.pickup_deposits.store(0, Ordering::Relaxed);
        self.relay_submissions.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Messages composed from session state.
    pub messages_composed: u64,
    /// Messages sent successfully.
    pub messages_sent: u64,
    /// Messages that failed to send.
    pub messages_failed: u64,
    /// Artifacts deposited in the pickup directory.
    pub pickup_deposits: u64,
    /// Submissions accepted by the network relay.
    pub relay_submissions: u64,
}

impl MetricsSnapshot {
    /// Returns the send success rate.
    pub fn success_rate(&self) -> f64 {
        let total = self.messages_sent + self.messages_failed;
        if total == 0 {
            1.0
        } else {
            self.messages_sent as f64 / total as f64
        }
    }
}

/// Scope timer for coarse operation timing.
#[derive(Debug)]
pub struct Timer {
    label: &'static str,
    started: Instant,
}

impl Timer {
    /// Starts timing the labeled operation.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    /// The operation label this timer was started with.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Elapsed time since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finishes the measurement and reports it.
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            operation = self.label,
            elapsed_ms = elapsed.as_millis() as u64,
            "Operation finished"
        );

        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_delivery_paths_count_as_sent() {
        let metrics = MailerMetrics::new();

        metrics.record_compose();
        metrics.record_compose();
        metrics.record_compose();
        metrics.record_compose();
        metrics.record_pickup_deposit();
        metrics.record_pickup_deposit();
        metrics.record_relay_submission();
        metrics.record_send_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_composed, 4);
        assert_eq!(snapshot.messages_sent, 3);
        assert_eq!(snapshot.messages_failed, 1);
        assert_eq!(snapshot.pickup_deposits, 2);
        assert_eq!(snapshot.relay_submissions, 1);
        assert_eq!(snapshot.success_rate(), 0.75);
    }

    #[test]
    fn test_success_rate_with_no_traffic() {
        let metrics = MailerMetrics::new();
        assert_eq!(metrics.snapshot().success_rate(), 1.0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let metrics = MailerMetrics::new();
        metrics.record_pickup_deposit();
        metrics.reset();
        assert_eq!(metrics.snapshot().messages_sent, 0);
        assert_eq!(metrics.snapshot().pickup_deposits, 0);
    }

    #[test]
    fn test_timer_reports_elapsed() {
        let timer = Timer::start("unit");
        assert_eq!(timer.label(), "unit");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
    }
}
