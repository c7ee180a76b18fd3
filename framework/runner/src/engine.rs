use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use squall_core::prelude::{Scenario, ScenarioError};
use tokio::runtime::Handle;

use crate::controller::{RunController, RunOptions};
use crate::executor::RequestExecutor;
use crate::sampler::{SystemSample, SystemSampler};

/// Errors from using the engine incorrectly. These are returned to the caller straight away and
/// never turn into a failed run.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum EngineError {
    #[display("scenario `{scenario_id}` is already running")]
    AlreadyRunning { scenario_id: String },
    #[display("invalid scenario: {_0}")]
    InvalidScenario(ScenarioError),
    #[display("no tokio runtime is available to run scenarios on")]
    NoRuntime,
}

/// Registry of active runs, at most one per scenario id.
///
/// The system sampler runs while any run is active: it is started when the number of active runs
/// goes from 0 to 1 and stopped when it drops back to 0, whichever runs those are.
pub struct Engine<E: RequestExecutor> {
    executor: Arc<E>,
    runtime: Handle,
    options: RunOptions,
    inner: Arc<EngineInner>,
}

struct EngineInner {
    active: Mutex<HashMap<String, RunController>>,
    sampler: SystemSampler,
}

impl<E: RequestExecutor> Clone for Engine<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            runtime: self.runtime.clone(),
            options: self.options,
            inner: self.inner.clone(),
        }
    }
}

impl<E: RequestExecutor> Engine<E> {
    /// Create an engine that runs scenarios on the current tokio runtime.
    pub fn new(executor: E, sampler: SystemSampler) -> Result<Self, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self::with_runtime(executor, sampler, runtime))
    }

    pub fn with_runtime(executor: E, sampler: SystemSampler, runtime: Handle) -> Self {
        Self {
            executor: Arc::new(executor),
            runtime,
            options: RunOptions::default(),
            inner: Arc::new(EngineInner {
                active: Mutex::new(HashMap::new()),
                sampler,
            }),
        }
    }

    /// Options for runs started from now on.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Start a run of the scenario.
    ///
    /// Fails if the scenario is invalid or a run with the same scenario id is still running, in
    /// which case no workers are spawned.
    pub fn start(&self, scenario: Scenario) -> Result<RunController, EngineError> {
        scenario.validate().map_err(EngineError::InvalidScenario)?;

        let mut active = self.inner.active.lock();
        if let Some(existing) = active.get(&scenario.id) {
            // A run that just finished may not have removed itself yet.
            if !existing.status().is_terminal() {
                log::warn!("Scenario {} is already running", scenario.id);
                return Err(EngineError::AlreadyRunning {
                    scenario_id: scenario.id,
                });
            }
        }

        let was_idle = active.is_empty();
        let controller = RunController::new(scenario, self.options);
        active.insert(controller.scenario().id.clone(), controller.clone());

        if was_idle {
            self.inner.sampler.start(&self.runtime);
        }

        let inner = self.inner.clone();
        controller.launch(
            self.executor.clone(),
            &self.runtime,
            self.inner.sampler.worker_gauge(),
            move |run| inner.remove_run(run),
        );

        Ok(controller)
    }

    /// Request the run of a scenario to stop. Unknown or finished scenarios are ignored.
    pub fn stop(&self, scenario_id: &str) {
        let controller = self.inner.active.lock().get(scenario_id).cloned();
        if let Some(controller) = controller {
            controller.stop();
        }
    }

    pub fn stop_all(&self) {
        let controllers = self
            .inner
            .active
            .lock()
            .values()
            .cloned()
            .collect::<Vec<_>>();

        log::info!("Stopping {} active runs", controllers.len());
        for controller in controllers {
            controller.stop();
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Number of live workers across all runs.
    pub fn active_workers(&self) -> usize {
        self.inner.sampler.worker_gauge().load(Ordering::Acquire)
    }

    pub fn sampler(&self) -> &SystemSampler {
        &self.inner.sampler
    }

    pub fn system_samples(&self) -> Vec<SystemSample> {
        self.inner.sampler.samples()
    }
}

impl EngineInner {
    fn remove_run(&self, run: &RunController) {
        let mut active = self.active.lock();

        // Only remove the entry if it still belongs to this run.
        let is_current = active
            .get(&run.scenario().id)
            .is_some_and(|current| current.run_id() == run.run_id());
        if is_current {
            active.remove(&run.scenario().id);
        }

        if active.is_empty() {
            self.sampler.stop();
        }
    }
}
