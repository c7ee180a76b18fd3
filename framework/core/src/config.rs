use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::scenario::{Scenario, ScenarioError};

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    scenario: Vec<Scenario>,
}

/// Load scenarios from a TOML or YAML file, chosen by the file extension.
///
/// Every scenario is validated and ids must be unique within the file.
pub fn load_scenarios(path: &Path) -> anyhow::Result<Vec<Scenario>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    let scenarios = match extension {
        "toml" => parse_toml(&content)?,
        "yaml" | "yml" => parse_yaml(&content)?,
        other => bail!(
            "Unsupported scenario file extension '{other}' for {}, expected toml, yaml or yml",
            path.display()
        ),
    };

    log::debug!(
        "Loaded {} scenarios from {}",
        scenarios.len(),
        path.display()
    );

    Ok(scenarios)
}

pub fn parse_toml(content: &str) -> anyhow::Result<Vec<Scenario>> {
    let file: ScenarioFile = toml::from_str(content).context("Invalid TOML scenario file")?;
    check_scenarios(file.scenario)
}

pub fn parse_yaml(content: &str) -> anyhow::Result<Vec<Scenario>> {
    let file: ScenarioFile = serde_yaml::from_str(content).context("Invalid YAML scenario file")?;
    check_scenarios(file.scenario)
}

fn check_scenarios(scenarios: Vec<Scenario>) -> anyhow::Result<Vec<Scenario>> {
    let mut seen = HashSet::new();
    for scenario in &scenarios {
        scenario.validate()?;
        if !seen.insert(scenario.id.as_str()) {
            return Err(ScenarioError::DuplicateId {
                id: scenario.id.clone(),
            }
            .into());
        }
    }

    Ok(scenarios)
}
