use std::time::Duration;

use anyhow::Context;
use indicatif::MultiProgress;
use squall_core::prelude::{load_scenarios, Scenario};
use squall_runner::prelude::{
    start_progress, Engine, HttpExecutor, KindExecutor, ReportCollector, ReportConfig, RunOptions, RunReport,
    RunStatus, SimulatedSource, SysinfoSource, SystemSampler,
};

use crate::cli::{RunArgs, SamplerOpt, ScenarioSource};
use crate::shutdown::start_shutdown_listener;

/// The scenarios from the given file, or the built-in scenarios if there is no file.
pub(crate) fn available_scenarios(source: &ScenarioSource) -> anyhow::Result<Vec<Scenario>> {
    match &source.scenarios {
        Some(path) => load_scenarios(path),
        None => Ok(Scenario::presets()),
    }
}

/// Pick the scenarios to run, in the order they were asked for, and apply the overrides.
fn select_scenarios(
    available: Vec<Scenario>,
    ids: &[String],
    duration: Option<u64>,
    concurrency: Option<usize>,
) -> anyhow::Result<Vec<Scenario>> {
    let mut selected = if ids.is_empty() {
        available
    } else {
        ids.iter()
            .map(|id| {
                available
                    .iter()
                    .find(|scenario| &scenario.id == id)
                    .cloned()
                    .with_context(|| format!("Unknown scenario id `{id}`"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    for scenario in &mut selected {
        if let Some(duration) = duration {
            scenario.duration = duration;
        }
        if let Some(concurrency) = concurrency {
            scenario.concurrency = concurrency;
        }
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario `{}`", scenario.id))?;
    }

    if selected.is_empty() {
        anyhow::bail!("No scenarios to run");
    }

    Ok(selected)
}

fn system_sampler(args: &RunArgs) -> SystemSampler {
    let mut sampler = match args.sampler {
        SamplerOpt::Sysinfo => SystemSampler::new(SysinfoSource::new()),
        SamplerOpt::Simulated => SystemSampler::new(SimulatedSource),
        SamplerOpt::Off => SystemSampler::disabled(),
    };
    if let Some(interval_ms) = args.sample_interval_ms {
        sampler = sampler.with_interval(Duration::from_millis(interval_ms));
    }
    if let Some(capacity) = args.sample_capacity {
        sampler = sampler.with_capacity(capacity);
    }
    sampler
}

fn http_executor(args: &RunArgs) -> anyhow::Result<Option<HttpExecutor>> {
    let Some(base_url) = args.base_url.as_deref() else {
        return Ok(None);
    };

    let mut http = HttpExecutor::new(base_url)?;
    if let Some(token) = args.csrf_token.as_deref() {
        http = http.with_csrf_token(token)?;
    }
    Ok(Some(http))
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let scenarios = select_scenarios(
        available_scenarios(&args.source)?,
        &args.scenario_ids,
        args.duration,
        args.concurrency,
    )?;

    let executor = KindExecutor::new(http_executor(&args)?);
    let options = RunOptions {
        pacing: args.pacing.into(),
        ..Default::default()
    };

    let mut report_config = ReportConfig::default().enable_summary();
    if let Some(path) = args.report.clone() {
        report_config = report_config.enable_jsonl(path);
    }
    let mut reporter = report_config.init();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let reports = runtime.block_on(async {
        let engine = Engine::new(executor, system_sampler(&args))?.with_options(options);
        start_shutdown_listener(engine.clone());

        let multi = MultiProgress::new();
        let mut runs = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            match engine.start(scenario) {
                Ok(run) => {
                    if !args.no_progress {
                        start_progress(run.clone(), &multi);
                    }
                    runs.push(run);
                }
                Err(e) => {
                    engine.stop_all();
                    return Err(e.into());
                }
            }
        }

        let mut reports = Vec::with_capacity(runs.len());
        for run in runs {
            run.wait().await;
            if let Some(report) = run.report() {
                reports.push(report);
            }
        }

        if let Some(sample) = engine.sampler().latest() {
            log::info!(
                "Last system sample: cpu {:.1}%, memory {:.1}%, disk {:.1}%, network {:.1}%, {} active connections",
                sample.cpu_pct,
                sample.mem_pct,
                sample.disk_pct,
                sample.net_pct,
                sample.active_connections
            );
        }

        anyhow::Ok(reports)
    })?;

    for report in &reports {
        reporter.add_run(report);
    }
    reporter.finalize();

    check_reports(&reports)
}

fn check_reports(reports: &[RunReport]) -> anyhow::Result<()> {
    let failed = reports
        .iter()
        .filter(|report| report.status == RunStatus::Failed)
        .collect::<Vec<_>>();

    if failed.is_empty() {
        return Ok(());
    }

    for report in &failed {
        log::error!(
            "Scenario {} failed: {}",
            report.scenario_id,
            report.failure.as_deref().unwrap_or("unknown error")
        );
    }
    anyhow::bail!("{} of {} runs failed", failed.len(), reports.len())
}
