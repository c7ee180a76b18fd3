mod http;
mod kind;
mod synthetic;

use std::future::Future;

use squall_core::prelude::Scenario;

pub use http::HttpExecutor;
pub use kind::KindExecutor;
pub use synthetic::SyntheticExecutor;

/// Performs the work that a scenario measures.
///
/// Each call to [RequestExecutor::perform] is one attempt. Returning an error marks the attempt as
/// failed and the error text is used to tally it, the worker carries on with the next attempt.
/// Wrap the error in [squall_core::prelude::RunAbortError] to abort the whole run instead.
///
/// An attempt is never cancelled once it has started. Stopping a run waits for in-flight attempts,
/// so the time it takes for a run to stop is bounded by the slowest attempt.
pub trait RequestExecutor: Send + Sync + 'static {
    /// Called once per run, before any worker is spawned. An error fails the run without any
    /// attempts being made.
    fn setup(&self, _scenario: &Scenario) -> impl Future<Output = anyhow::Result<()>> + Send {
        async { Ok(()) }
    }

    fn perform(&self, scenario: &Scenario) -> impl Future<Output = anyhow::Result<()>> + Send;
}
