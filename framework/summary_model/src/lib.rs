use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;

/// Status of a run.
///
/// `Idle` is only seen before a run has been launched. `Completed`, `Failed` and `Stopped` are
/// terminal and a run never moves out of them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[display("idle")]
    Idle,
    #[display("running")]
    Running,
    /// Ran until the deadline without being cancelled.
    #[display("completed")]
    Completed,
    /// Aborted by an error outside of the per-attempt failure path.
    #[display("failed")]
    Failed,
    /// Cancelled before the deadline.
    #[display("stopped")]
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped
        )
    }
}

/// Point in time view of the metrics of a run.
///
/// All values are finite. Latency statistics only cover successful attempts and are 0 until the
/// first success, rates are 0 until time has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Attempts per second since the run started.
    pub observed_rate_per_sec: f64,
    /// Percentage of failed attempts, between 0 and 100.
    pub error_rate_pct: f64,
    /// Successful attempts per second since the run started.
    pub throughput_per_sec: f64,
}

/// Number of failures seen with one error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error: String,
    pub count: u64,
}

/// Turn an error tally into a list, most frequent first. Ties are ordered by error text so the
/// output is stable.
pub fn sorted_error_counts(tally: &HashMap<String, u64>) -> Vec<ErrorCount> {
    tally
        .iter()
        .sorted_by(|(a_err, a_count), (b_err, b_count)| {
            b_count.cmp(a_count).then_with(|| a_err.cmp(b_err))
        })
        .map(|(error, count)| ErrorCount {
            error: error.clone(),
            count: *count,
        })
        .collect()
}

/// Final report of a run, available once the run reached a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    /// The unique run id
    ///
    /// Chosen by the engine. Unique for each run, a scenario that is run twice gets two ids.
    pub run_id: String,
    pub scenario_id: String,
    pub scenario_name: String,
    /// The scenario kind, as configured.
    pub kind: String,
    pub status: RunStatus,
    /// Unix timestamp in milliseconds.
    pub started_at: i64,
    /// Unix timestamp in milliseconds.
    pub ended_at: i64,
    pub concurrency: usize,
    /// Configured duration in seconds.
    pub duration_s: u64,
    pub target_rate: f64,
    /// The pacing mode the workers used, `per_worker` or `aggregate`.
    pub pacing: String,
    pub metrics: MetricsSnapshot,
    /// Failures by error text, most frequent first.
    pub errors: Vec<ErrorCount>,
    /// Why the run failed, only set for [RunStatus::Failed].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Latency samples dropped from the history to stay within its retention limit.
    #[serde(default)]
    pub latency_samples_evicted: u64,
    pub squall_version: String,
    /// See [RunReport::config_fingerprint].
    #[serde(default)]
    pub fingerprint: String,
}

impl RunReport {
    /// Wall clock time between the start and the end of the run.
    pub fn elapsed_ms(&self) -> i64 {
        self.ended_at - self.started_at
    }

    /// Compute a fingerprint for the configuration used for this run.
    ///
    /// It uses the
    ///     - Scenario id
    ///     - Scenario kind
    ///     - Concurrency
    ///     - Duration
    ///     - Target rate
    ///     - Pacing mode
    ///     - Squall version
    ///
    /// Runs with the same fingerprint can be compared with each other. The fingerprint is computed
    /// using [sha3::Sha3_256].
    pub fn config_fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_id.as_bytes());
        Digest::update(&mut hasher, self.kind.as_bytes());
        Digest::update(&mut hasher, (self.concurrency as u64).to_le_bytes());
        Digest::update(&mut hasher, self.duration_s.to_le_bytes());
        Digest::update(&mut hasher, self.target_rate.to_le_bytes());
        Digest::update(&mut hasher, self.pacing.as_bytes());
        Digest::update(&mut hasher, self.squall_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run report to a file
///
/// The report will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_report(run_report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_report(run_report, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run report to a writer
fn store_run_report<W: Write>(run_report: &RunReport, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_report)?;
    Ok(())
}

/// Load run reports from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_report].
pub fn load_run_reports(path: &Path) -> anyhow::Result<Vec<RunReport>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunReport = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
