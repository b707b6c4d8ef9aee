use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    total_tokens: u64,
    tool_calls: u64,
    average_duration_secs: f64,
}

/// Process-local run statistics, safe to share between agents.
///
/// Every update happens under one lock, so concurrent runs never lose an
/// increment or interleave a running-mean update.
#[derive(Debug, Default)]
pub struct RunMetrics {
    totals: Mutex<Totals>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate: f64,
    pub total_tokens: u64,
    pub tool_calls: u64,
    pub average_duration_secs: f64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&self, success: bool, duration: Duration, tokens_used: u64, tool_calls: u64) {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);

        totals.total_runs += 1;
        if success {
            totals.successful_runs += 1;
        } else {
            totals.failed_runs += 1;
        }
        totals.total_tokens = totals.total_tokens.saturating_add(tokens_used);
        totals.tool_calls = totals.tool_calls.saturating_add(tool_calls);

        let previous = totals.average_duration_secs;
        totals.average_duration_secs =
            previous + (duration.as_secs_f64() - previous) / totals.total_runs as f64;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let totals = *self.totals.lock().unwrap_or_else(PoisonError::into_inner);

        MetricsSnapshot {
            total_runs: totals.total_runs,
            successful_runs: totals.successful_runs,
            failed_runs: totals.failed_runs,
            success_rate: totals.successful_runs as f64 / totals.total_runs.max(1) as f64,
            total_tokens: totals.total_tokens,
            tool_calls: totals.tool_calls,
            average_duration_secs: totals.average_duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn empty_aggregator_reports_zero_rate() {
        let snapshot = RunMetrics::new().snapshot();
        assert_eq!(snapshot.total_runs, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.average_duration_secs, 0.0);
    }

    #[test]
    fn running_mean_and_success_rate() {
        let metrics = RunMetrics::new();
        for secs in [2.0, 4.0, 6.0] {
            metrics.record_run(true, Duration::from_secs_f64(secs), 100, 1);
        }

        let snapshot = metrics.snapshot();
        assert!((snapshot.average_duration_secs - 4.0).abs() < 1e-9);
        assert_eq!(snapshot.success_rate, 1.0);
        assert_eq!(snapshot.total_tokens, 300);
        assert_eq!(snapshot.tool_calls, 3);

        metrics.record_run(false, Duration::ZERO, 0, 0);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 4);
        assert_eq!(snapshot.failed_runs, 1);
        assert_eq!(snapshot.success_rate, 0.75);
        assert!((snapshot.average_duration_secs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let metrics = Arc::new(RunMetrics::new());
        let workers = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record_run(true, Duration::from_secs(1), 2, 1);
                    }
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().expect("worker finishes");
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 2000);
        assert_eq!(snapshot.total_tokens, 4000);
        assert!((snapshot.average_duration_secs - 1.0).abs() < 1e-9);
    }
}
