use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use squall_core::prelude::{Scenario, ShutdownHandle};
use squall_instruments::{HistoryRetention, LatencySample, MetricsAggregator};
use squall_summary_model::{MetricsSnapshot, RunReport, RunStatus};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::executor::RequestExecutor;
use crate::rate::{PacingMode, RateGovernor};
use crate::worker::{LiveWorker, Worker, WorkerExit};

/// Longest run a deadline can be set for, about 100 years. Longer durations are capped so the
/// deadline always fits an [Instant].
const MAX_RUN_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Options that apply to every run started by an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub pacing: PacingMode,
    pub history_retention: HistoryRetention,
}

/// The state of one run. Only the [RunController] writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Set once, on the terminal transition.
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the run failed, only set for [RunStatus::Failed].
    pub failure: Option<String>,
}

/// Owns a single run of a scenario.
///
/// The controller spawns `concurrency` workers that share one [MetricsAggregator] and one
/// cancellation signal, then waits for all of them to leave their loop and decides the terminal
/// status:
/// - [RunStatus::Failed] if setup failed or an attempt aborted the run,
/// - [RunStatus::Stopped] if any worker saw the cancellation before the deadline,
/// - [RunStatus::Completed] otherwise.
///
/// Cloning gives another handle to the same run.
#[derive(Clone)]
pub struct RunController {
    inner: Arc<RunInner>,
}

struct RunInner {
    run_id: String,
    scenario: Arc<Scenario>,
    options: RunOptions,
    state: RwLock<RunState>,
    status: watch::Sender<RunStatus>,
    started: Instant,
    aggregator: Arc<MetricsAggregator>,
    /// Raised by [RunController::stop].
    cancel: ShutdownHandle,
    /// Raised on stop or abort to drain the workers.
    halt: ShutdownHandle,
    live_workers: Arc<AtomicUsize>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("run_id", &self.inner.run_id)
            .field("scenario_id", &self.inner.scenario.id)
            .field("status", &self.status())
            .finish()
    }
}

impl RunController {
    pub(crate) fn new(scenario: Scenario, options: RunOptions) -> Self {
        let started = Instant::now();

        Self {
            inner: Arc::new(RunInner {
                run_id: nanoid::nanoid!(),
                scenario: Arc::new(scenario),
                options,
                state: RwLock::new(RunState {
                    status: RunStatus::Idle,
                    started_at: None,
                    ended_at: None,
                    failure: None,
                }),
                status: watch::channel(RunStatus::Idle).0,
                started,
                aggregator: Arc::new(MetricsAggregator::new(
                    started,
                    options.history_retention,
                )),
                cancel: ShutdownHandle::new(),
                halt: ShutdownHandle::new(),
                live_workers: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Move to [RunStatus::Running] and spawn the run onto the runtime.
    ///
    /// `on_terminal` is called once, after the terminal status has been set.
    pub(crate) fn launch<E: RequestExecutor>(
        &self,
        executor: Arc<E>,
        runtime: &Handle,
        worker_gauge: Arc<AtomicUsize>,
        on_terminal: impl FnOnce(&RunController) + Send + 'static,
    ) {
        {
            let mut state = self.inner.state.write();
            state.status = RunStatus::Running;
            state.started_at = Some(Utc::now());
        }
        self.inner.status.send_replace(RunStatus::Running);

        let scenario = &self.inner.scenario;
        log::info!(
            "Running scenario {} ({}) with {} workers for {}s at {} attempts/s ({})",
            scenario.id,
            scenario.kind,
            scenario.concurrency,
            scenario.duration,
            scenario.target_rate,
            self.inner.options.pacing,
        );

        let controller = self.clone();
        runtime.spawn(async move {
            let supervisor = tokio::spawn({
                let controller = controller.clone();
                async move { controller.supervise(executor, worker_gauge).await }
            });

            // A panic in setup or in the supervisor still has to end the run.
            let (status, failure) = match supervisor.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!(
                        "Run of scenario {} did not finish: {:?}",
                        controller.inner.scenario.id,
                        e
                    );
                    controller.inner.halt.shutdown();
                    (RunStatus::Failed, Some(format!("Run did not finish: {e}")))
                }
            };

            controller.finish(status, failure);
            on_terminal(&controller);
        });
    }

    async fn supervise<E: RequestExecutor>(
        &self,
        executor: Arc<E>,
        worker_gauge: Arc<AtomicUsize>,
    ) -> (RunStatus, Option<String>) {
        let inner = &self.inner;
        let scenario = inner.scenario.clone();

        if let Err(e) = executor.setup(&scenario).await {
            log::error!("Setup failed for scenario {}: {:?}", scenario.id, e);
            return (RunStatus::Failed, Some(format!("{e:#}")));
        }

        let deadline = inner.started + scenario.run_duration().min(MAX_RUN_DURATION);
        let governor = RateGovernor::new(
            scenario.target_rate,
            scenario.concurrency,
            inner.options.pacing,
        );

        let mut workers = JoinSet::new();
        for worker_index in 0..scenario.concurrency {
            let worker = Worker {
                worker_id: format!("{}-worker-{}", scenario.id, worker_index),
                scenario: scenario.clone(),
                executor: executor.clone(),
                aggregator: inner.aggregator.clone(),
                governor,
                deadline,
                halt: inner.halt.clone(),
                halt_listener: inner.halt.new_listener(),
                live: LiveWorker::new(vec![inner.live_workers.clone(), worker_gauge.clone()]),
            };
            workers.spawn(worker.run());
        }

        let mut cancelled = false;
        let mut failure = None;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(WorkerExit::Deadline) => {}
                Ok(WorkerExit::Cancelled) => cancelled = true,
                Ok(WorkerExit::Aborted(reason)) => {
                    failure.get_or_insert(reason);
                }
                Err(e) => {
                    log::error!("Worker for scenario {} did not finish: {:?}", scenario.id, e);
                    inner.halt.shutdown();
                    failure.get_or_insert_with(|| format!("Worker did not finish: {e}"));
                }
            }
        }

        match (failure, cancelled) {
            (Some(reason), _) => (RunStatus::Failed, Some(reason)),
            (None, true) => (RunStatus::Stopped, None),
            (None, false) => (RunStatus::Completed, None),
        }
    }

    /// Apply the terminal transition. Returns false if the run was already terminal.
    fn finish(&self, status: RunStatus, failure: Option<String>) -> bool {
        let mut state = self.inner.state.write();
        if state.status.is_terminal() {
            return false;
        }

        state.status = status;
        state.ended_at = Some(Utc::now());
        state.failure = failure;
        drop(state);

        self.inner.status.send_replace(status);

        let snapshot = self.snapshot();
        match status {
            RunStatus::Failed => log::error!(
                "Scenario {} failed after {} attempts",
                self.inner.scenario.id,
                snapshot.total_requests
            ),
            _ => log::info!(
                "Scenario {} {} after {} attempts, {} failed",
                self.inner.scenario.id,
                status,
                snapshot.total_requests,
                snapshot.failure_count
            ),
        }

        true
    }

    /// Request the run to stop. Workers finish their in-flight attempt and do not start another.
    ///
    /// Returns immediately, use [RunController::wait] to wait for the run to drain. Only the first
    /// call on a running run returns true, every other call is a no-op.
    pub fn stop(&self) -> bool {
        if self.status() != RunStatus::Running {
            return false;
        }

        let requested = self.inner.cancel.shutdown();
        if requested {
            log::info!("Stop requested for scenario {}", self.inner.scenario.id);
            self.inner.halt.shutdown();
        }

        requested
    }

    /// Wait for the run to reach a terminal status.
    pub async fn wait(&self) -> RunStatus {
        let mut receiver = self.inner.status.subscribe();
        // The sender lives as long as this controller, the wait only ends on a terminal status.
        let status = receiver
            .wait_for(|status| status.is_terminal())
            .await
            .map(|status| *status);

        status.unwrap_or_else(|_| self.status())
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn scenario(&self) -> &Scenario {
        &self.inner.scenario
    }

    pub fn status(&self) -> RunStatus {
        self.inner.state.read().status
    }

    pub fn state(&self) -> RunState {
        self.inner.state.read().clone()
    }

    /// Number of workers currently inside their loop.
    pub fn worker_count(&self) -> usize {
        self.inner.live_workers.load(Ordering::Acquire)
    }

    /// The most recently published metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.aggregator.latest()
    }

    /// Receive every snapshot as it is published.
    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.inner.aggregator.subscribe()
    }

    pub fn error_tally(&self) -> HashMap<String, u64> {
        self.inner.aggregator.error_tally()
    }

    pub fn latency_history(&self) -> Vec<LatencySample> {
        self.inner.aggregator.latency_history()
    }

    /// The final report, available once the run is terminal.
    pub fn report(&self) -> Option<RunReport> {
        let state = self.state();
        if !state.status.is_terminal() {
            return None;
        }

        let scenario = &self.inner.scenario;
        let ended_at = state.ended_at.unwrap_or_else(Utc::now);
        let started_at = state.started_at.unwrap_or(ended_at);

        let mut report = RunReport {
            run_id: self.inner.run_id.clone(),
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            kind: scenario.kind.to_string(),
            status: state.status,
            started_at: started_at.timestamp_millis(),
            ended_at: ended_at.timestamp_millis(),
            concurrency: scenario.concurrency,
            duration_s: scenario.duration,
            target_rate: scenario.target_rate,
            pacing: self.inner.options.pacing.to_string(),
            metrics: self.snapshot(),
            errors: self.inner.aggregator.error_counts(),
            failure: state.failure,
            latency_samples_evicted: self.inner.aggregator.latency_samples_evicted(),
            squall_version: env!("CARGO_PKG_VERSION").to_string(),
            fingerprint: String::new(),
        };
        report.fingerprint = report.config_fingerprint();

        Some(report)
    }
}
