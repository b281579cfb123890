//! `.pdca/config.toml`. Every field has a default, so a partial file is fine.

use anyhow::{Context, Result};
use orchestrator::{
    AgentEngine, AgentPhaseExecutor, ContinuousConfig, DeviationSpecialistComposer, LessonsMerge,
    OrchestratorConfig, RetryPolicy, StaticComposer, TeamComposer,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ENGINE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdcaConfig {
    pub project: ProjectConfig,
    pub engine: EngineConfig,
    pub orchestrator: OrchestratorSection,
    pub continuous: ContinuousSection,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "PDCA cycle".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENGINE_URL.to_string(),
            api_key: None,
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub phase_timeout_secs: u64,
    pub sanitize_inputs: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        let config = OrchestratorConfig::default();
        Self {
            max_retries: config.retry.max_retries,
            retry_delay_ms: config.retry.delay.as_millis() as u64,
            phase_timeout_secs: config.phase_timeout.as_secs(),
            sanitize_inputs: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposerKind {
    #[default]
    Static,
    DeviationSpecialist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousSection {
    pub cycles: usize,
    pub continue_on_failure: bool,
    pub lessons_merge: LessonsMerge,
    pub composer: ComposerKind,
}

impl Default for ContinuousSection {
    fn default() -> Self {
        Self {
            cycles: 1,
            continue_on_failure: false,
            lessons_merge: LessonsMerge::default(),
            composer: ComposerKind::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

impl PdcaConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let section = &self.orchestrator;
        OrchestratorConfig::new()
            .with_retry(
                RetryPolicy::new(section.max_retries)
                    .with_delay(Duration::from_millis(section.retry_delay_ms)),
            )
            .with_phase_timeout(Duration::from_secs(section.phase_timeout_secs))
    }

    /// Executor for the configured engine. Input scrubbing lives here, not
    /// in the orchestrator config, because only agent-backed executors build
    /// prompt inputs.
    pub fn phase_executor(&self, engine: Arc<dyn AgentEngine>) -> AgentPhaseExecutor {
        AgentPhaseExecutor::new(engine).with_sanitize_inputs(self.orchestrator.sanitize_inputs)
    }

    pub fn continuous_config(&self, continue_on_failure: bool) -> ContinuousConfig {
        ContinuousConfig::new()
            .with_continue_on_failure(continue_on_failure || self.continuous.continue_on_failure)
            .with_lessons_merge(self.continuous.lessons_merge)
    }

    pub fn composer(&self) -> Arc<dyn TeamComposer> {
        match self.continuous.composer {
            ComposerKind::Static => Arc::new(StaticComposer),
            ComposerKind::DeviationSpecialist => Arc::new(DeviationSpecialistComposer::new()),
        }
    }
}
