//! Transaction and execution counters.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy)]
struct TimerStats {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl TimerStats {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(elapsed);
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            count: self.count,
            total_ms: self.total.as_secs_f64() * 1000.0,
            min_ms: self.min.map(|d| d.as_secs_f64() * 1000.0),
            max_ms: self.max.map(|d| d.as_secs_f64() * 1000.0),
        }
    }
}

/// Point-in-time view of one latency timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total_ms: f64,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

impl TimerSnapshot {
    #[must_use]
    pub fn mean_ms(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            let count = self.count as f64;
            Some(self.total_ms / count)
        }
    }
}

/// Point-in-time view of all counters, suitable for export as JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub transactions_started: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub executions_succeeded: u64,
    pub executions_failed: u64,
    pub success_latency: TimerSnapshot,
    pub failure_latency: TimerSnapshot,
}

/// Counters and timers shared by every engine using one
/// [`ExecutionConfig`](crate::engine::ExecutionConfig).
#[derive(Debug, Default)]
pub struct ExecutionTelemetry {
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    executions_succeeded: AtomicU64,
    executions_failed: AtomicU64,
    success_timer: Mutex<TimerStats>,
    failure_timer: Mutex<TimerStats>,
}

impl ExecutionTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn transaction_started(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_rolled_back(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, elapsed: Duration) {
        self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
        self.success_timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .record(elapsed);
    }

    pub(crate) fn record_failure(&self, elapsed: Duration) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
        self.failure_timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .record(elapsed);
    }

    #[must_use]
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn transactions_rolled_back(&self) -> u64 {
        self.transactions_rolled_back.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn executions_succeeded(&self) -> u64 {
        self.executions_succeeded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn executions_failed(&self) -> u64 {
        self.executions_failed.load(Ordering::Relaxed)
    }

    /// Copy all counters and timers.
    ///
    /// Counters are read one by one, so a snapshot taken while executions are
    /// running may mix values from slightly different instants.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let success = *self
            .success_timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let failure = *self
            .failure_timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        TelemetrySnapshot {
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_rolled_back: self.transactions_rolled_back(),
            executions_succeeded: self.executions_succeeded(),
            executions_failed: self.executions_failed(),
            success_latency: success.snapshot(),
            failure_latency: failure.snapshot(),
        }
    }

    /// Zero every counter and timer.
    pub fn reset(&self) {
        for counter in [
            &self.transactions_started,
            &self.transactions_committed,
            &self.transactions_rolled_back,
            &self.executions_succeeded,
            &self.executions_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for timer in [&self.success_timer, &self.failure_timer] {
            *timer.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                TimerStats::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_track_min_max_and_total() {
        let telemetry = ExecutionTelemetry::new();
        telemetry.record_success(Duration::from_millis(10));
        telemetry.record_success(Duration::from_millis(30));
        telemetry.record_failure(Duration::from_millis(5));

        let snap = telemetry.snapshot();
        assert_eq!(snap.executions_succeeded, 2);
        assert_eq!(snap.executions_failed, 1);
        assert_eq!(snap.success_latency.count, 2);
        assert_eq!(snap.success_latency.min_ms, Some(10.0));
        assert_eq!(snap.success_latency.max_ms, Some(30.0));
        assert_eq!(snap.success_latency.mean_ms(), Some(20.0));
        assert_eq!(snap.failure_latency.count, 1);
    }

    #[test]
    fn snapshot_serializes_and_reset_clears() -> Result<(), Box<dyn std::error::Error>> {
        let telemetry = ExecutionTelemetry::new();
        telemetry.transaction_started();
        telemetry.transaction_committed();
        let json = serde_json::to_value(telemetry.snapshot())?;
        assert_eq!(json["transactions_started"], 1);
        assert_eq!(json["success_latency"]["min_ms"], serde_json::Value::Null);

        telemetry.reset();
        assert_eq!(telemetry.snapshot(), TelemetrySnapshot::default());
        Ok(())
    }
}
