mod aggregator;
mod history;
mod report;

pub use aggregator::{AttemptOutcome, MetricsAggregator};
pub use history::{HistoryRetention, LatencySample};
pub use report::{
    JsonlReportCollector, ReportCollector, ReportConfig, Reporter, SummaryReportCollector,
};
