use anyhow::bail;
use squall_core::prelude::{Scenario, ScenarioKind};

use crate::executor::{HttpExecutor, RequestExecutor, SyntheticExecutor};

/// Picks an executor based on the kind of the scenario.
///
/// `frontend` scenarios run the synthetic workload, every other kind goes over HTTP. Without an
/// HTTP executor only `frontend` scenarios can be run, the others fail during setup.
#[derive(Debug, Clone, Default)]
pub struct KindExecutor {
    http: Option<HttpExecutor>,
    synthetic: SyntheticExecutor,
}

impl KindExecutor {
    pub fn new(http: Option<HttpExecutor>) -> Self {
        Self {
            http,
            synthetic: SyntheticExecutor::new(),
        }
    }

    pub fn with_synthetic(mut self, synthetic: SyntheticExecutor) -> Self {
        self.synthetic = synthetic;
        self
    }

    fn http_for(&self, scenario: &Scenario) -> anyhow::Result<&HttpExecutor> {
        match &self.http {
            Some(http) => Ok(http),
            None => bail!(
                "Scenario '{}' of kind '{}' needs a base URL to send requests to",
                scenario.id,
                scenario.kind
            ),
        }
    }
}

impl RequestExecutor for KindExecutor {
    async fn setup(&self, scenario: &Scenario) -> anyhow::Result<()> {
        match scenario.kind {
            ScenarioKind::Frontend => self.synthetic.setup(scenario).await,
            _ => self.http_for(scenario)?.setup(scenario).await,
        }
    }

    async fn perform(&self, scenario: &Scenario) -> anyhow::Result<()> {
        match scenario.kind {
            ScenarioKind::Frontend => self.synthetic.perform(scenario).await,
            _ => self.http_for(scenario)?.perform(scenario).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_kinds_need_base_url() {
        let executor = KindExecutor::new(None);
        let scenario =
            Scenario::new("api", "api", ScenarioKind::Api, 1, 1, 1.0).with_endpoint("/api");

        let err = executor.setup(&scenario).await.unwrap_err();
        assert_eq!(
            "Scenario 'api' of kind 'api' needs a base URL to send requests to",
            err.to_string()
        );
    }

    #[tokio::test]
    async fn frontend_runs_without_base_url() {
        let executor = KindExecutor::new(None).with_synthetic(
            SyntheticExecutor::new().with_threshold(std::time::Duration::from_secs(30)),
        );
        let scenario = Scenario::new("fe", "fe", ScenarioKind::Frontend, 1, 1, 1.0);

        executor.setup(&scenario).await.unwrap();
        executor.perform(&scenario).await.unwrap();
    }
}
