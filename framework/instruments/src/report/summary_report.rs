mod errors_table;
mod runs_table;

use tabled::settings::Style;
use tabled::Table;

use squall_summary_model::RunReport;

use crate::report::summary_report::errors_table::ErrorRow;
use crate::report::summary_report::runs_table::RunRow;
use crate::report::ReportCollector;

/// Keeps the reports in memory and prints a summary table at the end.
pub struct SummaryReportCollector {
    reports: Vec<RunReport>,
}

impl Default for SummaryReportCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self {
            reports: Vec::new(),
        }
    }

    pub(crate) fn render_runs(&self) -> String {
        let rows = self.reports.iter().map(RunRow::from).collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());
        table.to_string()
    }

    pub(crate) fn render_errors(&self) -> Option<String> {
        let rows = self
            .reports
            .iter()
            .flat_map(|report| {
                report.errors.iter().map(|error| ErrorRow {
                    scenario_id: report.scenario_id.clone(),
                    error: error.error.clone(),
                    count: error.count,
                })
            })
            .collect::<Vec<_>>();

        if rows.is_empty() {
            return None;
        }

        let mut table = Table::new(rows);
        table.with(Style::modern());
        Some(table.to_string())
    }
}

impl ReportCollector for SummaryReportCollector {
    fn add_run(&mut self, report: &RunReport) {
        self.reports.push(report.clone());
    }

    fn finalize(&self) {
        println!("\nSummary of runs");
        println!("{}", self.render_runs());

        if let Some(errors) = self.render_errors() {
            println!("\nErrors");
            println!("{errors}");
        }

        for report in &self.reports {
            if let Some(failure) = &report.failure {
                println!("\nRun {} failed: {}", report.scenario_id, failure);
            }
        }
    }
}
