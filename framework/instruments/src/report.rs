mod jsonl_report;
mod summary_report;

use std::path::PathBuf;

use squall_summary_model::RunReport;

pub use jsonl_report::JsonlReportCollector;
pub use summary_report::SummaryReportCollector;

/// Receives the final report of each run.
pub trait ReportCollector {
    fn add_run(&mut self, report: &RunReport);

    /// Called once, after the last run has been added.
    fn finalize(&self);
}

/// Choose which report collectors to use.
#[derive(Debug, Default)]
pub struct ReportConfig {
    summary: bool,
    jsonl_path: Option<PathBuf>,
}

impl ReportConfig {
    /// Print tables of the runs at the end.
    pub fn enable_summary(mut self) -> Self {
        self.summary = true;
        self
    }

    /// Append each run report as a line of JSON to a file.
    pub fn enable_jsonl(mut self, path: PathBuf) -> Self {
        self.jsonl_path = Some(path);
        self
    }

    pub fn init(self) -> Reporter {
        let mut collectors: Vec<Box<dyn ReportCollector + Send>> = Vec::new();

        if self.summary {
            collectors.push(Box::new(SummaryReportCollector::new()));
        }
        if let Some(path) = self.jsonl_path {
            collectors.push(Box::new(JsonlReportCollector::new(path)));
        }

        Reporter { collectors }
    }
}

/// Forwards run reports to every configured collector.
pub struct Reporter {
    collectors: Vec<Box<dyn ReportCollector + Send>>,
}

impl ReportCollector for Reporter {
    fn add_run(&mut self, report: &RunReport) {
        for collector in &mut self.collectors {
            collector.add_run(report);
        }
    }

    fn finalize(&self) {
        for collector in &self.collectors {
            collector.finalize();
        }
    }
}
