use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use squall_core::prelude::{HttpMethod, RunAbortError, Scenario, ScenarioKind};
use url::Url;

use crate::executor::RequestExecutor;

const DEFAULT_CHAT_ENDPOINT: &str = "/api/chat";

const CSRF_HEADER: &str = "X-CSRF-Token";

/// Sends HTTP requests for `api`, `database` and `ai_chat` scenarios.
///
/// Endpoints are resolved against the base URL. `api` and `database` attempts fail on a non-success
/// status or a body that is not JSON. `ai_chat` attempts post a message and read the whole
/// streamed reply, which counts as a single attempt.
///
/// With a CSRF token configured it is sent in the `X-CSRF-Token` header of every chat request and
/// of every other request that is not a `GET`.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: Url,
    csrf_token: Option<HeaderValue>,
}

impl HttpExecutor {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL '{base_url}'"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            csrf_token: None,
        })
    }

    pub fn with_csrf_token(mut self, token: &str) -> anyhow::Result<Self> {
        let token = HeaderValue::from_str(token).context("Invalid CSRF token")?;
        self.csrf_token = Some(token);
        Ok(self)
    }

    pub(crate) fn url_for(&self, scenario: &Scenario) -> anyhow::Result<Url> {
        let endpoint = match (scenario.kind, scenario.endpoint.as_deref()) {
            (_, Some(endpoint)) => endpoint,
            (ScenarioKind::AiChat, None) => DEFAULT_CHAT_ENDPOINT,
            (kind, None) => bail!("Scenario '{}' of kind '{kind}' has no endpoint", scenario.id),
        };

        self.base_url
            .join(endpoint)
            .with_context(|| format!("Invalid endpoint '{endpoint}' for scenario '{}'", scenario.id))
    }

    async fn perform_request(&self, scenario: &Scenario, url: Url) -> anyhow::Result<()> {
        let mut request = self
            .client
            .request(method(scenario.method), url)
            .header(CONTENT_TYPE, "application/json");
        if scenario.method != HttpMethod::Get {
            if let Some(token) = &self.csrf_token {
                request = request.header(CSRF_HEADER, token.clone());
            }
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            );
        }

        response.json::<serde_json::Value>().await?;

        Ok(())
    }

    async fn perform_chat(&self, url: Url) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "message": "This is a performance test message",
            "conversationId": format!("test-{}", rand::random::<f64>()),
        });

        let mut request = self.client.post(url).json(&body);
        if let Some(token) = &self.csrf_token {
            request = request.header(CSRF_HEADER, token.clone());
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            bail!("Chat API error: {}", status.as_u16());
        }

        response.text().await?;

        Ok(())
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

impl RequestExecutor for HttpExecutor {
    async fn setup(&self, scenario: &Scenario) -> anyhow::Result<()> {
        if scenario.kind == ScenarioKind::Frontend {
            bail!(
                "Scenario '{}' is a frontend scenario and cannot be run over HTTP",
                scenario.id
            );
        }

        let url = self.url_for(scenario)?;
        log::debug!("Scenario {} will send requests to {url}", scenario.id);

        Ok(())
    }

    async fn perform(&self, scenario: &Scenario) -> anyhow::Result<()> {
        // Setup has already checked the URL, failing here means the scenario changed under us.
        let url = self
            .url_for(scenario)
            .map_err(|e| RunAbortError::new(e.to_string()))?;

        match scenario.kind {
            ScenarioKind::AiChat => self.perform_chat(url).await,
            ScenarioKind::Api | ScenarioKind::Database => {
                self.perform_request(scenario, url).await
            }
            ScenarioKind::Frontend => Err(RunAbortError::new(format!(
                "Scenario '{}' is a frontend scenario and cannot be run over HTTP",
                scenario.id
            ))
            .into()),
        }
    }
}
