//! The agent/task execution engine that does the actual thinking.
//!
//! The orchestrator only sees an opaque async function from
//! [`PhaseRequest`] to raw text. [`HttpAgentEngine`] talks to a remote engine
//! over JSON.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::EngineError;
use crate::prompts::PhaseRequest;

#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// Run one phase attempt and return the engine's raw answer.
    async fn run_phase(&self, request: &PhaseRequest) -> Result<String, EngineError>;
}

#[derive(Debug, Deserialize)]
struct EngineResponse {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Engine reached at `<base_url>/phases/<phase>`.
#[derive(Debug, Clone)]
pub struct HttpAgentEngine {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpAgentEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            api_key: None,
        }
    }

    /// Client-side request timeout, on top of the orchestrator's phase timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, EngineError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn phase_url(&self, request: &PhaseRequest) -> String {
        format!("{}/phases/{}", self.base_url, request.phase.as_str())
    }
}

#[async_trait]
impl AgentEngine for HttpAgentEngine {
    async fn run_phase(&self, request: &PhaseRequest) -> Result<String, EngineError> {
        let url = self.phase_url(request);
        info!(
            cycle_id = %request.cycle_id,
            phase = %request.phase,
            agents = request.agents.len(),
            "Sending phase to engine"
        );

        let mut builder = self.client.post(&url).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(status = %status, url = %url, "Engine request failed");
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Either {"output": ...} / {"error": ...} or the raw answer itself.
        match serde_json::from_str::<EngineResponse>(&body) {
            Ok(EngineResponse {
                error: Some(message),
                ..
            }) => Err(EngineError::Failed(message)),
            Ok(EngineResponse {
                output: Some(output),
                ..
            }) => {
                debug!(bytes = output.len(), "Engine returned output");
                Ok(output)
            }
            _ => Ok(body),
        }
    }
}
