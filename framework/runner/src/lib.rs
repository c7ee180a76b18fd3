mod controller;
mod engine;
mod executor;
mod progress;
mod rate;
mod sampler;
mod worker;

pub mod prelude {
    pub use crate::controller::{RunController, RunOptions, RunState};
    pub use crate::engine::{Engine, EngineError};
    pub use crate::executor::{HttpExecutor, KindExecutor, RequestExecutor, SyntheticExecutor};
    pub use crate::progress::start_progress;
    pub use crate::rate::{next_delay_ms, PacingMode, RateGovernor};
    pub use crate::sampler::{
        SampleSource, SimulatedSource, SysinfoSource, SystemSample, SystemSampler,
        DEFAULT_SAMPLE_CAPACITY, DEFAULT_SAMPLE_INTERVAL,
    };

    pub use squall_core::prelude::*;
    pub use squall_instruments::{
        AttemptOutcome, HistoryRetention, LatencySample, MetricsAggregator, ReportCollector,
        ReportConfig, Reporter,
    };
    pub use squall_summary_model::{ErrorCount, MetricsSnapshot, RunReport, RunStatus};
}
