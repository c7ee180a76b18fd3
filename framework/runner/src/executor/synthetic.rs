use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use rand::Rng;
use squall_core::prelude::Scenario;

use crate::executor::RequestExecutor;

/// A CPU bound stand-in for rendering work, used for `frontend` scenarios.
///
/// Each attempt builds a block of nested markup and runs an arithmetic loop. The attempt fails if
/// the work takes longer than the threshold, 100ms by default.
#[derive(Debug, Clone)]
pub struct SyntheticExecutor {
    threshold: Duration,
    elements: usize,
    iterations: usize,
}

impl Default for SyntheticExecutor {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(100),
            elements: 1000,
            iterations: 100_000,
        }
    }
}

impl SyntheticExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

}

fn workload(elements: usize, iterations: usize) -> (usize, f64) {
    let markup = format!(
        "{}Test content{}",
        "<p>".repeat(elements),
        "</p>".repeat(elements)
    );
    let nodes = markup.matches("<p>").count();

    let mut rng = rand::thread_rng();
    let mut sum = 0.0;
    for _ in 0..iterations {
        sum += rng.gen::<f64>();
    }

    (nodes, sum)
}

impl RequestExecutor for SyntheticExecutor {
    async fn perform(&self, _scenario: &Scenario) -> anyhow::Result<()> {
        // Runs on the blocking pool so that other workers keep being polled.
        let (elements, iterations) = (self.elements, self.iterations);
        let elapsed = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            std::hint::black_box(workload(elements, iterations));
            started.elapsed()
        })
        .await
        .context("Synthetic workload did not finish")?;

        if elapsed > self.threshold {
            bail!(
                "Frontend performance degraded: {:.2}ms",
                elapsed.as_secs_f64() * 1000.0
            );
        }

        Ok(())
    }
}
