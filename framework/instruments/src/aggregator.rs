use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use squall_summary_model::{sorted_error_counts, ErrorCount, MetricsSnapshot};
use tokio::sync::watch;

use crate::history::{HistoryRetention, LatencyHistory, LatencySample};

/// The result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success { latency: Duration },
    /// A failed attempt, identified by the raw error text. Different texts are never merged.
    Failure { error: String },
}

/// Accumulates attempt outcomes for one run and publishes a fresh [MetricsSnapshot] after each one.
///
/// Workers of a run may be scheduled on several threads so all writes go through
/// [MetricsAggregator::record], which holds a lock for the whole update and never suspends while
/// holding it. The snapshot is published under the same lock, which keeps published
/// `total_requests` monotonic.
#[derive(Debug)]
pub struct MetricsAggregator {
    started: Instant,
    state: Mutex<AggregatorState>,
    publisher: watch::Sender<MetricsSnapshot>,
}

#[derive(Debug)]
struct AggregatorState {
    total: u64,
    success: u64,
    failure: u64,
    latency_sum_ms: f64,
    // None until the first success, never exposed as an infinity.
    min_latency_ms: Option<f64>,
    max_latency_ms: Option<f64>,
    errors: HashMap<String, u64>,
    history: LatencyHistory,
}

impl MetricsAggregator {
    pub fn new(started: Instant, retention: HistoryRetention) -> Self {
        Self {
            started,
            state: Mutex::new(AggregatorState {
                total: 0,
                success: 0,
                failure: 0,
                latency_sum_ms: 0.0,
                min_latency_ms: None,
                max_latency_ms: None,
                errors: HashMap::new(),
                history: LatencyHistory::new(retention),
            }),
            publisher: watch::channel(MetricsSnapshot::default()).0,
        }
    }

    /// Record one outcome and return the snapshot that was published for it.
    pub fn record(&self, outcome: AttemptOutcome) -> MetricsSnapshot {
        let mut state = self.state.lock();

        state.total += 1;
        match outcome {
            AttemptOutcome::Success { latency } => {
                let latency_ms = latency.as_secs_f64() * 1000.0;
                state.success += 1;
                state.latency_sum_ms += latency_ms;
                state.min_latency_ms = Some(
                    state
                        .min_latency_ms
                        .map_or(latency_ms, |min| min.min(latency_ms)),
                );
                state.max_latency_ms = Some(
                    state
                        .max_latency_ms
                        .map_or(latency_ms, |max| max.max(latency_ms)),
                );
                state.history.push(LatencySample {
                    timestamp: Utc::now(),
                    latency_ms,
                });
            }
            AttemptOutcome::Failure { error } => {
                state.failure += 1;
                *state.errors.entry(error).or_insert(0) += 1;
            }
        }

        let snapshot = state.snapshot(self.started.elapsed());
        self.publisher.send_replace(snapshot);

        snapshot
    }

    /// Compute a snapshot for the current time, without publishing it.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.lock().snapshot(self.started.elapsed())
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> MetricsSnapshot {
        *self.publisher.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.publisher.subscribe()
    }

    pub fn error_tally(&self) -> HashMap<String, u64> {
        self.state.lock().errors.clone()
    }

    pub fn error_counts(&self) -> Vec<ErrorCount> {
        sorted_error_counts(&self.state.lock().errors)
    }

    pub fn latency_history(&self) -> Vec<LatencySample> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Latency samples dropped because the history reached its retention limit.
    pub fn latency_samples_evicted(&self) -> u64 {
        self.state.lock().history.evicted()
    }
}

impl AggregatorState {
    fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let elapsed_s = elapsed.as_secs_f64();
        let per_second = |count: u64| {
            if elapsed_s > 0.0 {
                count as f64 / elapsed_s
            } else {
                0.0
            }
        };

        let (avg_latency_ms, min_latency_ms, max_latency_ms) =
            match (self.min_latency_ms, self.max_latency_ms) {
                (Some(min), Some(max)) if self.success > 0 => {
                    // Rounding in the running sum must not push the mean outside the observed range.
                    let avg = (self.latency_sum_ms / self.success as f64).clamp(min, max);
                    (avg, min, max)
                }
                _ => (0.0, 0.0, 0.0),
            };

        let error_rate_pct = if self.total > 0 {
            (self.failure as f64 / self.total as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests: self.total,
            success_count: self.success,
            failure_count: self.failure,
            avg_latency_ms,
            min_latency_ms,
            max_latency_ms,
            observed_rate_per_sec: per_second(self.total),
            error_rate_pct,
            throughput_per_sec: per_second(self.success),
        }
    }
}
