use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use squall_runner::prelude::PacingMode;

#[derive(Debug, Parser)]
#[command(name = "squall", version, about, long_about = None)]
pub struct SquallCli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the scenarios that are available to run
    List(ScenarioSource),

    /// Run one or more scenarios at the same time and print a summary when they have all finished
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct ScenarioSource {
    /// A TOML or YAML file with a `scenario` list to use instead of the built-in scenarios
    #[clap(long)]
    pub scenarios: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: ScenarioSource,

    /// The id of a scenario to run. Can be given multiple times, for example
    /// `--scenario api-load-test --scenario database-load`.
    ///
    /// If no scenario is given then every available scenario is run.
    #[clap(long = "scenario", short)]
    pub scenario_ids: Vec<String>,

    /// Override the number of seconds to run each scenario for
    #[clap(long)]
    pub duration: Option<u64>,

    /// Override the number of workers to run for each scenario
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// How the target rate of a scenario is applied.
    ///
    /// With `per-worker` every worker is paced towards the target rate, so the total rate is the
    /// target rate times the concurrency. With `aggregate` the target rate is shared between the
    /// workers.
    #[clap(long, value_enum, default_value_t = PacingOpt::PerWorker)]
    pub pacing: PacingOpt,

    /// The base URL of the service to test. Required for every scenario that sends HTTP requests.
    #[clap(long)]
    pub base_url: Option<String>,

    /// A CSRF token to send in the `X-CSRF-Token` header of chat requests and of every other
    /// request that is not a `GET`. Only used together with `--base-url`.
    #[clap(long, requires = "base_url")]
    pub csrf_token: Option<String>,

    /// Where system resource samples come from while scenarios are running
    #[clap(long, value_enum, default_value_t = SamplerOpt::Sysinfo)]
    pub sampler: SamplerOpt,

    /// Milliseconds between system resource samples, 2000 if not set
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub sample_interval_ms: Option<u64>,

    /// How many system resource samples to keep, 150 if not set
    #[clap(long)]
    pub sample_capacity: Option<usize>,

    /// Append a JSON report of each run to this file
    #[clap(long)]
    pub report: Option<PathBuf>,

    /// Do not show progress bars on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bars aren't being looked at by anyone and are just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PacingOpt {
    PerWorker,
    Aggregate,
}

impl From<PacingOpt> for PacingMode {
    fn from(value: PacingOpt) -> Self {
        match value {
            PacingOpt::PerWorker => PacingMode::PerWorker,
            PacingOpt::Aggregate => PacingMode::Aggregate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SamplerOpt {
    /// Measure the host with sysinfo
    Sysinfo,
    /// Generate random values, for demos
    Simulated,
    /// Do not sample
    Off,
}
