use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The kind of work a scenario drives. The engine never looks at this, it is only used by
/// executors to decide how to perform an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    #[display("api")]
    Api,
    #[display("database")]
    Database,
    #[display("ai_chat")]
    AiChat,
    #[display("frontend")]
    Frontend,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("DELETE")]
    Delete,
}

/// A named, parameterised description of a workload.
///
/// Scenarios are immutable once a run has started. The `endpoint` and `method` fields are only
/// consumed by executors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique id, at most one run per id can be active at a time.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ScenarioKind,
    /// The number of workers to run.
    pub concurrency: usize,
    /// How long to run for, in seconds.
    pub duration: u64,
    /// Attempts per second that each worker is paced towards.
    #[serde(alias = "expected_rps")]
    pub target_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ScenarioError {
    #[display("scenario id must not be empty")]
    EmptyId,
    #[display("scenario `{id}` must have a concurrency of at least 1")]
    ZeroConcurrency { id: String },
    #[display("scenario `{id}` must run for at least 1 second")]
    ZeroDuration { id: String },
    #[display("scenario `{id}` has target rate {rate}, expected a positive number")]
    InvalidTargetRate { id: String, rate: f64 },
    #[display("scenario id `{id}` is defined more than once")]
    DuplicateId { id: String },
}

impl Scenario {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ScenarioKind,
        concurrency: usize,
        duration: u64,
        target_rate: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind,
            concurrency,
            duration,
            target_rate,
            endpoint: None,
            method: HttpMethod::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.id.trim().is_empty() {
            return Err(ScenarioError::EmptyId);
        }
        if self.concurrency == 0 {
            return Err(ScenarioError::ZeroConcurrency {
                id: self.id.clone(),
            });
        }
        if self.duration == 0 {
            return Err(ScenarioError::ZeroDuration {
                id: self.id.clone(),
            });
        }
        if !self.target_rate.is_finite() || self.target_rate <= 0.0 {
            return Err(ScenarioError::InvalidTargetRate {
                id: self.id.clone(),
                rate: self.target_rate,
            });
        }

        Ok(())
    }

    /// The scenarios that are available without a scenario file.
    pub fn presets() -> Vec<Scenario> {
        vec![
            Scenario::new("api-load-test", "API load test", ScenarioKind::Api, 50, 60, 100.0)
                .with_description("Measure an API endpoint under high concurrency")
                .with_endpoint("/api/statistics/user")
                .with_method(HttpMethod::Get),
            Scenario::new(
                "ai-chat-stress",
                "AI chat stress test",
                ScenarioKind::AiChat,
                20,
                120,
                10.0,
            )
            .with_description("Check responsiveness and stability of the chat endpoint")
            .with_endpoint("/api/chat")
            .with_method(HttpMethod::Post),
            Scenario::new(
                "frontend-perf",
                "Frontend performance test",
                ScenarioKind::Frontend,
                10,
                30,
                5.0,
            )
            .with_description("Synthetic rendering and compute workload"),
            Scenario::new(
                "database-load",
                "Database load test",
                ScenarioKind::Database,
                30,
                90,
                50.0,
            )
            .with_description("Query performance of a data endpoint under concurrency")
            .with_endpoint("/api/articles/drafts")
            .with_method(HttpMethod::Get),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for scenario in Scenario::presets() {
            scenario.validate().unwrap();
        }
    }

    #[test]
    fn reject_zero_concurrency() {
        let scenario = Scenario::new("s", "s", ScenarioKind::Api, 0, 1, 1.0);
        assert_eq!(
            Err(ScenarioError::ZeroConcurrency { id: "s".to_string() }),
            scenario.validate()
        );
    }

    #[test]
    fn reject_zero_duration() {
        let scenario = Scenario::new("s", "s", ScenarioKind::Api, 1, 0, 1.0);
        assert_eq!(
            Err(ScenarioError::ZeroDuration { id: "s".to_string() }),
            scenario.validate()
        );
    }

    #[test]
    fn reject_bad_target_rate() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let scenario = Scenario::new("s", "s", ScenarioKind::Frontend, 1, 1, rate);
            assert!(matches!(
                scenario.validate(),
                Err(ScenarioError::InvalidTargetRate { .. })
            ));
        }
    }

    #[test]
    fn reject_blank_id() {
        let scenario = Scenario::new("  ", "s", ScenarioKind::Frontend, 1, 1, 1.0);
        assert_eq!(Err(ScenarioError::EmptyId), scenario.validate());
    }
}
