use squall_core::prelude::Scenario;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::ScenarioSource;
use crate::run::available_scenarios;

#[derive(Tabled)]
struct ScenarioRow {
    id: String,
    name: String,
    kind: String,
    workers: usize,
    duration_s: u64,
    target_rate: f64,
    request: String,
}

impl From<&Scenario> for ScenarioRow {
    fn from(scenario: &Scenario) -> Self {
        let request = match &scenario.endpoint {
            Some(endpoint) => format!("{} {}", scenario.method, endpoint),
            None => "-".to_string(),
        };

        Self {
            id: scenario.id.clone(),
            name: scenario.name.clone(),
            kind: scenario.kind.to_string(),
            workers: scenario.concurrency,
            duration_s: scenario.duration,
            target_rate: scenario.target_rate,
            request,
        }
    }
}

pub fn list(source: &ScenarioSource) -> anyhow::Result<()> {
    let scenarios = available_scenarios(source)?;
    println!("{}", render_scenarios(&scenarios));

    Ok(())
}

fn render_scenarios(scenarios: &[Scenario]) -> String {
    let mut table = Table::new(scenarios.iter().map(ScenarioRow::from));
    table.with(Style::modern());
    table.to_string()
}
