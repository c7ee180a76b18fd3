use squall_summary_model::RunReport;
use tabled::Tabled;

/// Enough of the fingerprint to tell configurations apart in a table.
const FINGERPRINT_CHARS: usize = 12;

#[derive(Tabled)]
pub struct RunRow {
    pub scenario_id: String,
    pub status: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub avg_ms: String,
    pub min_ms: String,
    pub max_ms: String,
    pub rps: String,
    pub error_pct: String,
    pub elapsed_s: String,
    pub fingerprint: String,
}

impl From<&RunReport> for RunRow {
    fn from(report: &RunReport) -> Self {
        let metrics = &report.metrics;
        Self {
            scenario_id: report.scenario_id.clone(),
            status: report.status.to_string(),
            total: metrics.total_requests,
            success: metrics.success_count,
            failed: metrics.failure_count,
            avg_ms: float2(metrics.avg_latency_ms),
            min_ms: float2(metrics.min_latency_ms),
            max_ms: float2(metrics.max_latency_ms),
            rps: float2(metrics.observed_rate_per_sec),
            error_pct: float2(metrics.error_rate_pct),
            elapsed_s: float2(report.elapsed_ms() as f64 / 1000.0),
            fingerprint: report.fingerprint.chars().take(FINGERPRINT_CHARS).collect(),
        }
    }
}

fn float2(n: f64) -> String {
    format!("{:.2}", n)
}
