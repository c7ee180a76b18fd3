use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use squall_runner::prelude::{
    Engine, EngineError, HistoryRetention, PacingMode, RequestExecutor, RunAbortError, RunOptions,
    RunStatus, SampleSource, Scenario, ScenarioKind, SystemSample, SystemSampler,
};

/// Succeeds straight away, or after a fixed delay.
#[derive(Default)]
struct SucceedingExecutor {
    delay: Duration,
    calls: AtomicU64,
}

impl SucceedingExecutor {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicU64::new(0),
        }
    }
}

impl RequestExecutor for SucceedingExecutor {
    async fn perform(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

/// Fails every attempt of scenarios whose id starts with `fail`, succeeds otherwise.
struct SelectiveExecutor;

impl RequestExecutor for SelectiveExecutor {
    async fn perform(&self, scenario: &Scenario) -> anyhow::Result<()> {
        if scenario.id.starts_with("fail") {
            anyhow::bail!("HTTP 500: Internal Server Error");
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(())
    }
}

struct AbortingExecutor;

impl RequestExecutor for AbortingExecutor {
    async fn perform(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        Err(RunAbortError::new("executor is misconfigured").into())
    }
}

struct BrokenSetupExecutor;

impl RequestExecutor for BrokenSetupExecutor {
    async fn setup(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        anyhow::bail!("cannot connect to target")
    }

    async fn perform(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        Ok(())
    }
}

struct PanickingSetupExecutor;

impl RequestExecutor for PanickingSetupExecutor {
    async fn setup(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        panic!("setup exploded");
    }

    async fn perform(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        Ok(())
    }
}

struct ConstantSource;

impl SampleSource for ConstantSource {
    fn sample(&mut self, active_connections: u64) -> SystemSample {
        SystemSample {
            timestamp: chrono::Utc::now(),
            cpu_pct: 1.0,
            mem_pct: 1.0,
            disk_pct: 1.0,
            net_pct: 1.0,
            active_connections,
        }
    }
}

fn scenario(id: &str, concurrency: usize, duration: u64, target_rate: f64) -> Scenario {
    Scenario::new(id, id, ScenarioKind::Frontend, concurrency, duration, target_rate)
}

fn engine<E: RequestExecutor>(executor: E) -> Engine<E> {
    Engine::new(executor, SystemSampler::disabled()).unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_completes_after_deadline() {
    let engine = engine(SucceedingExecutor::default());

    let run = engine.start(scenario("complete", 3, 1, 1000.0)).unwrap();
    assert_eq!(1, engine.active_count());
    assert_eq!(RunStatus::Running, run.status());

    let status = tokio::time::timeout(Duration::from_secs(3), run.wait())
        .await
        .unwrap();
    assert_eq!(RunStatus::Completed, status);
    assert!(wait_until(|| engine.active_count() == 0).await);

    let state = run.state();
    let elapsed = state.ended_at.unwrap() - state.started_at.unwrap();
    assert!(elapsed.num_milliseconds() >= 1000, "{elapsed}");
    assert!(elapsed.num_milliseconds() < 1500, "{elapsed}");

    let snapshot = run.snapshot();
    assert!(snapshot.total_requests > 0);
    assert_eq!(
        snapshot.total_requests,
        snapshot.success_count + snapshot.failure_count
    );
    assert!(snapshot.min_latency_ms <= snapshot.avg_latency_ms);
    assert!(snapshot.avg_latency_ms <= snapshot.max_latency_ms);
    assert_eq!(0, run.worker_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_before_deadline() {
    let engine = engine(SucceedingExecutor::with_delay(Duration::from_millis(5)));

    let run = engine.start(scenario("stop", 2, 10, 20.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.stop("stop");

    let status = tokio::time::timeout(Duration::from_secs(2), run.wait())
        .await
        .unwrap();
    assert_eq!(RunStatus::Stopped, status);

    let state = run.state();
    let elapsed = (state.ended_at.unwrap() - state.started_at.unwrap()).num_milliseconds();
    assert!((150..700).contains(&elapsed), "{elapsed}ms");
    assert!(wait_until(|| engine.active_count() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_transitions_once() {
    let engine = engine(SucceedingExecutor::with_delay(Duration::from_millis(2)));
    let run = engine.start(scenario("once", 4, 10, 100.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let handles = (0..10)
        .map(|_| {
            let run = run.clone();
            tokio::spawn(async move { run.stop() })
        })
        .collect::<Vec<_>>();

    let mut raised = 0;
    for handle in handles {
        if handle.await.unwrap() {
            raised += 1;
        }
    }
    assert_eq!(1, raised);

    assert_eq!(RunStatus::Stopped, run.wait().await);
    let ended_at = run.state().ended_at;

    // Stopping a finished or unknown run does nothing.
    assert!(!run.stop());
    engine.stop("once");
    engine.stop("unknown");
    engine.stop_all();
    assert_eq!(RunStatus::Stopped, run.status());
    assert_eq!(ended_at, run.state().ended_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_start_is_rejected() {
    let engine = engine(SucceedingExecutor::with_delay(Duration::from_millis(5)));

    let run = engine.start(scenario("dup", 3, 10, 50.0)).unwrap();
    assert!(wait_until(|| run.worker_count() == 3).await);

    let err = engine.start(scenario("dup", 3, 10, 50.0)).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning { ref scenario_id } if scenario_id == "dup"));
    assert_eq!("scenario `dup` is already running", err.to_string());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(3, run.worker_count());
    assert_eq!(3, engine.active_workers());
    assert_eq!(1, engine.active_count());

    engine.stop_all();
    assert_eq!(RunStatus::Stopped, run.wait().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_can_run_again_after_finishing() {
    let engine = engine(SucceedingExecutor::default());

    let first = engine.start(scenario("again", 1, 1, 100.0)).unwrap();
    first.stop();
    first.wait().await;
    assert!(wait_until(|| engine.active_count() == 0).await);

    let second = engine.start(scenario("again", 1, 1, 100.0)).unwrap();
    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(RunStatus::Completed, second.wait().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abort_fails_run_without_attempts() {
    let engine = engine(AbortingExecutor);

    let run = engine.start(scenario("abort", 3, 10, 10.0)).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(2), run.wait())
        .await
        .unwrap();

    assert_eq!(RunStatus::Failed, status);
    assert_eq!(0, run.snapshot().total_requests);
    assert_eq!(
        Some("executor is misconfigured".to_string()),
        run.state().failure
    );
    assert!(wait_until(|| engine.active_count() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn setup_error_fails_run() {
    let engine = engine(BrokenSetupExecutor);

    let run = engine.start(scenario("setup", 2, 10, 10.0)).unwrap();
    assert_eq!(RunStatus::Failed, run.wait().await);

    assert_eq!(0, run.snapshot().total_requests);
    assert_eq!(Some("cannot connect to target".to_string()), run.state().failure);

    let report = run.report().unwrap();
    assert_eq!(RunStatus::Failed, report.status);
    assert_eq!(Some("cannot connect to target".to_string()), report.failure);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_attempts_do_not_stop_workers() {
    let engine = engine(SelectiveExecutor);

    let run = engine.start(scenario("fail-all", 2, 1, 50.0)).unwrap();
    assert_eq!(RunStatus::Completed, run.wait().await);

    let snapshot = run.snapshot();
    assert!(snapshot.total_requests > 2);
    assert_eq!(snapshot.total_requests, snapshot.failure_count);
    assert_eq!(100.0, snapshot.error_rate_pct);
    assert_eq!(0.0, snapshot.avg_latency_ms);
    assert_eq!(0.0, snapshot.min_latency_ms);
    assert_eq!(0.0, snapshot.max_latency_ms);

    let tally = run.error_tally();
    assert_eq!(1, tally.len());
    assert_eq!(
        Some(&snapshot.failure_count),
        tally.get("HTTP 500: Internal Server Error")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenarios_run_independently() {
    let engine = engine(SelectiveExecutor);

    let ok = engine.start(scenario("ok", 2, 1, 50.0)).unwrap();
    let failing = engine.start(scenario("fail", 2, 2, 50.0)).unwrap();
    assert_eq!(2, engine.active_count());

    assert_eq!(RunStatus::Completed, ok.wait().await);
    assert!(wait_until(|| engine.active_count() == 1).await);
    assert_eq!(RunStatus::Running, failing.status());

    assert_eq!(RunStatus::Completed, failing.wait().await);

    let ok = ok.snapshot();
    let failing = failing.snapshot();
    assert!(ok.success_count > 0);
    assert_eq!(0, ok.failure_count);
    assert!(failing.failure_count > 0);
    assert_eq!(0, failing.success_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_scenario_is_rejected() {
    let engine = engine(SucceedingExecutor::default());

    let err = engine.start(scenario("bad", 0, 1, 1.0)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidScenario(_)));
    assert_eq!(0, engine.active_count());
}

#[test]
fn engine_needs_a_runtime() {
    let result = Engine::new(SucceedingExecutor::default(), SystemSampler::disabled());
    assert!(matches!(result, Err(EngineError::NoRuntime)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshots_never_go_backwards() {
    let engine = engine(SucceedingExecutor::with_delay(Duration::from_millis(1)));
    let run = engine.start(scenario("monotonic", 4, 1, 200.0)).unwrap();

    let mut snapshots = run.subscribe();
    let mut last_total = 0;
    while !run.status().is_terminal() {
        if tokio::time::timeout(Duration::from_millis(100), snapshots.changed())
            .await
            .is_err()
        {
            continue;
        }
        let snapshot = *snapshots.borrow_and_update();
        assert!(snapshot.total_requests >= last_total);
        assert_eq!(
            snapshot.total_requests,
            snapshot.success_count + snapshot.failure_count
        );
        assert!((0.0..=100.0).contains(&snapshot.error_rate_pct));
        last_total = snapshot.total_requests;
    }

    assert!(last_total > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn report_available_once_terminal() {
    let engine = engine(SucceedingExecutor::default());
    let run = engine.start(scenario("report", 1, 1, 10.0)).unwrap();
    assert!(run.report().is_none());

    run.wait().await;
    let report = run.report().unwrap();
    assert_eq!("report", report.scenario_id);
    assert_eq!(RunStatus::Completed, report.status);
    assert_eq!("per_worker", report.pacing);
    assert_eq!(run.snapshot(), report.metrics);
    assert!(report.elapsed_ms() >= 1000);
    assert_eq!(0, report.latency_samples_evicted);
    assert_eq!(64, report.fingerprint.len());
    assert_eq!(report.config_fingerprint(), report.fingerprint);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn report_counts_evicted_latency_samples() {
    let engine = engine(SucceedingExecutor::default()).with_options(RunOptions {
        history_retention: HistoryRetention::Bounded(5),
        ..Default::default()
    });

    let run = engine.start(scenario("retention", 1, 1, 100.0)).unwrap();
    run.wait().await;

    let report = run.report().unwrap();
    assert!(report.metrics.success_count > 5);
    assert_eq!(5, run.latency_history().len());
    assert_eq!(
        report.metrics.success_count - 5,
        report.latency_samples_evicted
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn huge_duration_can_still_be_stopped() {
    let sampler = SystemSampler::new(ConstantSource).with_interval(Duration::from_millis(10));
    let engine = Engine::new(SucceedingExecutor::default(), sampler.clone()).unwrap();

    let run = engine
        .start(scenario("forever", 1, u64::MAX / 2, 10.0))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(RunStatus::Running, run.status());
    assert!(run.snapshot().total_requests > 0);

    assert!(run.stop());
    let status = tokio::time::timeout(Duration::from_secs(2), run.wait())
        .await
        .unwrap();
    assert_eq!(RunStatus::Stopped, status);
    assert!(wait_until(|| engine.active_count() == 0).await);
    assert!(!sampler.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panic_in_setup_fails_run() {
    let sampler = SystemSampler::new(ConstantSource).with_interval(Duration::from_millis(10));
    let engine = Engine::new(PanickingSetupExecutor, sampler.clone()).unwrap();

    let run = engine.start(scenario("panics", 2, 10, 10.0)).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(2), run.wait())
        .await
        .unwrap();

    assert_eq!(RunStatus::Failed, status);
    assert!(run.state().failure.is_some());
    assert_eq!(0, run.snapshot().total_requests);
    assert!(wait_until(|| engine.active_count() == 0).await);
    assert!(!sampler.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_waits_for_attempt_in_flight() {
    let engine = engine(SucceedingExecutor::with_delay(Duration::from_millis(300)));

    let run = engine.start(scenario("in-flight", 1, 10, 1.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(0, run.snapshot().total_requests);

    assert!(run.stop());
    // The stop is only requested, the attempt keeps going.
    assert_eq!(RunStatus::Running, run.status());

    let status = tokio::time::timeout(Duration::from_secs(2), run.wait())
        .await
        .unwrap();
    assert_eq!(RunStatus::Stopped, status);

    let state = run.state();
    let elapsed = (state.ended_at.unwrap() - state.started_at.unwrap()).num_milliseconds();
    assert!(elapsed >= 295, "{elapsed}ms");
    assert!(elapsed < 1000, "{elapsed}ms");

    let snapshot = run.snapshot();
    assert_eq!(1, snapshot.total_requests);
    assert_eq!(1, snapshot.success_count);
    assert!(snapshot.min_latency_ms >= 295.0, "{}", snapshot.min_latency_ms);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_worker_pacing_multiplies_the_rate() {
    let per_worker = engine(SucceedingExecutor::default());
    let aggregate = engine(SucceedingExecutor::default()).with_options(RunOptions {
        pacing: PacingMode::Aggregate,
        ..Default::default()
    });

    let a = per_worker.start(scenario("pacing", 4, 1, 20.0)).unwrap();
    let b = aggregate.start(scenario("pacing", 4, 1, 20.0)).unwrap();
    a.wait().await;
    b.wait().await;

    let per_worker_total = a.snapshot().total_requests;
    let aggregate_total = b.snapshot().total_requests;
    assert!(per_worker_total >= 60, "{per_worker_total}");
    assert!(aggregate_total <= 28, "{aggregate_total}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sampler_runs_while_any_run_is_active() {
    let sampler = SystemSampler::new(ConstantSource).with_interval(Duration::from_millis(10));
    let engine = Engine::new(SucceedingExecutor::default(), sampler.clone()).unwrap();
    assert!(!sampler.is_running());

    let short = engine.start(scenario("short", 1, 1, 100.0)).unwrap();
    assert!(sampler.is_running());
    let long = engine.start(scenario("long", 1, 2, 100.0)).unwrap();

    short.wait().await;
    assert!(wait_until(|| engine.active_count() == 1).await);
    assert!(sampler.is_running());

    long.wait().await;
    assert!(wait_until(|| engine.active_count() == 0).await);
    assert!(!sampler.is_running());

    let samples = engine.system_samples();
    assert!(!samples.is_empty());
    assert!(samples.len() <= 150);
}
