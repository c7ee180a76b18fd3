use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use squall_core::prelude::{RunAbortError, Scenario, ShutdownHandle, ShutdownListener};
use squall_instruments::{AttemptOutcome, MetricsAggregator};

use crate::executor::RequestExecutor;
use crate::rate::RateGovernor;

/// Why a worker left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Deadline,
    Cancelled,
    Aborted(String),
}

/// Counts a worker as live for as long as it exists, including when its task panics.
pub(crate) struct LiveWorker {
    counters: Vec<Arc<AtomicUsize>>,
}

impl LiveWorker {
    pub(crate) fn new(counters: Vec<Arc<AtomicUsize>>) -> Self {
        for counter in &counters {
            counter.fetch_add(1, Ordering::AcqRel);
        }
        Self { counters }
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        for counter in &self.counters {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

pub(crate) struct Worker<E: RequestExecutor> {
    pub(crate) worker_id: String,
    pub(crate) scenario: Arc<Scenario>,
    pub(crate) executor: Arc<E>,
    pub(crate) aggregator: Arc<MetricsAggregator>,
    pub(crate) governor: RateGovernor,
    pub(crate) deadline: Instant,
    /// Raised to drain every worker of the run.
    pub(crate) halt: ShutdownHandle,
    pub(crate) halt_listener: ShutdownListener,
    pub(crate) live: LiveWorker,
}

impl<E: RequestExecutor> Worker<E> {
    /// Issue attempts until the deadline passes or the run is halted.
    ///
    /// Both conditions are only checked before starting an attempt, an attempt in flight always
    /// finishes and is recorded. Failed attempts are tallied and the loop carries on.
    pub(crate) async fn run(mut self) -> WorkerExit {
        let exit = loop {
            if self.halt_listener.should_shutdown() {
                break WorkerExit::Cancelled;
            }
            if Instant::now() >= self.deadline {
                break WorkerExit::Deadline;
            }

            let started = Instant::now();
            let result = self.executor.perform(&self.scenario).await;
            let elapsed = started.elapsed();

            match result {
                Ok(()) => {
                    self.aggregator
                        .record(AttemptOutcome::Success { latency: elapsed });
                }
                Err(e) if e.is::<RunAbortError>() => {
                    log::error!(
                        "Worker {} aborted run of scenario {}: {}",
                        self.worker_id,
                        self.scenario.id,
                        e
                    );
                    self.halt.shutdown();
                    break WorkerExit::Aborted(e.to_string());
                }
                Err(e) => {
                    let error = e.to_string();
                    log::debug!("Attempt by worker {} failed: {}", self.worker_id, error);
                    self.aggregator.record(AttemptOutcome::Failure { error });
                }
            }

            self.pace(elapsed).await;
        };

        log::debug!("Stopping worker {}: {:?}", self.worker_id, exit);
        drop(self.live);

        exit
    }

    /// Wait out the governed delay. The wait never runs past the deadline and ends early if the
    /// run is halted.
    async fn pace(&mut self, last_attempt: Duration) {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let delay = self.governor.next_delay(last_attempt).min(remaining);

        if delay.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.halt_listener.wait_for_shutdown() => {}
        }
    }
}
