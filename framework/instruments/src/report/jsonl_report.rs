use std::path::PathBuf;

use squall_summary_model::{append_run_report, RunReport};

use crate::report::ReportCollector;

/// Appends one JSON object per run to a file, which can be read back with
/// [squall_summary_model::load_run_reports].
pub struct JsonlReportCollector {
    path: PathBuf,
}

impl JsonlReportCollector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportCollector for JsonlReportCollector {
    fn add_run(&mut self, report: &RunReport) {
        if let Err(e) = append_run_report(report, &self.path) {
            log::warn!(
                "Failed to write report for run {} to {}: {:?}",
                report.run_id,
                self.path.display(),
                e
            );
        }
    }

    fn finalize(&self) {
        log::info!("Run reports written to {}", self.path.display());
    }
}
