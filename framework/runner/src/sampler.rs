mod source;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use squall_core::prelude::ShutdownHandle;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

pub use source::{SimulatedSource, SysinfoSource};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);
/// About five minutes of samples at the default interval.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 150;

const HIGH_CPU_PCT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub net_pct: f64,
    pub active_connections: u64,
}

/// Produces the values of a [SystemSample].
pub trait SampleSource: Send + 'static {
    /// `active_connections` is the number of workers that are live across all runs.
    fn sample(&mut self, active_connections: u64) -> SystemSample;
}

/// Collects resource usage samples while at least one run is active.
///
/// Samples are kept in a ring buffer, the oldest sample is dropped once the capacity is reached.
/// Nothing is sampled while the sampler is stopped. Cloning gives another handle to the same
/// sampler.
#[derive(Clone)]
pub struct SystemSampler {
    interval: Duration,
    capacity: usize,
    source: Option<Arc<Mutex<Box<dyn SampleSource>>>>,
    samples: Arc<Mutex<VecDeque<SystemSample>>>,
    running: Arc<Mutex<Option<ShutdownHandle>>>,
    worker_gauge: Arc<AtomicUsize>,
}

impl std::fmt::Debug for SystemSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSampler")
            .field("interval", &self.interval)
            .field("capacity", &self.capacity)
            .field("enabled", &self.source.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SystemSampler {
    pub fn new(source: impl SampleSource) -> Self {
        let source: Box<dyn SampleSource> = Box::new(source);
        Self::with_source(Some(source))
    }

    /// A sampler that never collects anything.
    pub fn disabled() -> Self {
        Self::with_source(None)
    }

    fn with_source(source: Option<Box<dyn SampleSource>>) -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
            capacity: DEFAULT_SAMPLE_CAPACITY,
            source: source.map(|source| Arc::new(Mutex::new(source))),
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(DEFAULT_SAMPLE_CAPACITY))),
            running: Arc::new(Mutex::new(None)),
            worker_gauge: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Shared count of live workers, reported as `active_connections`.
    pub(crate) fn worker_gauge(&self) -> Arc<AtomicUsize> {
        self.worker_gauge.clone()
    }

    /// Start sampling on the given runtime. Does nothing if already running or disabled.
    pub fn start(&self, runtime: &Handle) {
        let Some(source) = self.source.clone() else {
            log::trace!("System sampler is disabled");
            return;
        };

        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let shutdown_handle = ShutdownHandle::new();
        let mut shutdown_listener = shutdown_handle.new_listener();
        *running = Some(shutdown_handle);

        let interval = self.interval.max(Duration::from_millis(1));
        let capacity = self.capacity;
        let samples = self.samples.clone();
        let worker_gauge = self.worker_gauge.clone();

        log::debug!("Starting system sampler, sampling every {interval:?}");
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately, the first sample is taken one interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_listener.wait_for_shutdown() => break,
                    _ = ticker.tick() => {}
                }

                let active = worker_gauge.load(Ordering::Acquire) as u64;
                let sample = source.lock().sample(active);
                if shutdown_listener.should_shutdown() {
                    break;
                }

                if sample.cpu_pct > HIGH_CPU_PCT {
                    log::warn!(
                        "High CPU usage detected ({:.2}%), measured latencies might be affected",
                        sample.cpu_pct
                    );
                }

                push_sample(&mut samples.lock(), capacity, sample);
            }

            log::trace!("System sampler stopped");
        });
    }

    /// Stop sampling. Samples that were already collected are kept.
    pub fn stop(&self) {
        if let Some(handle) = self.running.lock().take() {
            log::debug!("Stopping system sampler");
            handle.shutdown();
        }
    }

    /// The retained samples, oldest first.
    pub fn samples(&self) -> Vec<SystemSample> {
        self.samples.lock().iter().copied().collect()
    }

    pub fn latest(&self) -> Option<SystemSample> {
        self.samples.lock().back().copied()
    }
}

fn push_sample(samples: &mut VecDeque<SystemSample>, capacity: usize, sample: SystemSample) {
    if capacity == 0 {
        return;
    }
    while samples.len() >= capacity {
        samples.pop_front();
    }
    samples.push_back(sample);
}
