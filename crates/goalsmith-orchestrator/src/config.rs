// Goalsmith configuration
//
// One TOML file configures the retry policy, scoring scale, tool gateway, and
// the two agents. Every section is optional; missing values fall back to the
// defaults below.

use goalsmith_abstraction::ModelParameters;
use goalsmith_models::{ModelCapabilities, ModelConfig, ModelType, capabilities_for};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::Criterion;
use crate::error::PipelineError;
use crate::tools::builtin::{BUILD_EVAL_PLAN, BUILTIN_TOOL_NAMES, FETCH_NOTE, TERMINOLOGY_LOOKUP};

/// Environment variable naming the default configuration file.
pub const CONFIG_ENV_VAR: &str = "GOALSMITH_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {reason}")]
    Read {
        /// File path
        path: PathBuf,
        /// IO error text
        reason: String,
    },

    /// The TOML did not parse or did not match the schema.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Values parsed but are inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        Self::Config { reason: err.to_string() }
    }
}

/// Role an agent plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Produces goals from a note.
    #[default]
    Generator,
    /// Scores goals.
    Judge,
}

impl AgentRole {
    /// Lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::Judge => "judge",
        }
    }

    fn default_tools(self) -> &'static [&'static str] {
        match self {
            Self::Generator => &[FETCH_NOTE, TERMINOLOGY_LOOKUP],
            Self::Judge => &[FETCH_NOTE, TERMINOLOGY_LOOKUP, BUILD_EVAL_PLAN],
        }
    }

    fn default_max_tokens(self) -> u32 {
        match self {
            Self::Generator => 4096,
            Self::Judge => 8192,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one agent. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Role, taken from the table name when loaded from TOML.
    pub role: AgentRole,
    /// Model backend.
    pub model_type: ModelType,
    /// Model identifier.
    pub model_id: String,
    /// Endpoint for OpenAI-compatible backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the model API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Reply script for the mock backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    /// Overrides the capability table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_system_prompt: Option<bool>,
    /// Overrides the capability table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_tool_calling: Option<bool>,
    /// Replaces the built-in instruction template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Tools this agent may call. Defaults depend on the role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permitted_tools: Option<Vec<String>>,
    /// Generation parameters. Defaults depend on the role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ModelParameters>,
    /// Upper bound on tool rounds per invocation.
    pub max_tool_rounds: u32,
    /// Re-prompts allowed when output does not parse.
    pub max_repair_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::for_role(AgentRole::Generator)
    }
}

impl AgentConfig {
    /// Default configuration for `role`, backed by the mock model.
    #[must_use]
    pub fn for_role(role: AgentRole) -> Self {
        Self {
            role,
            model_type: ModelType::Mock,
            model_id: format!("mock-{role}"),
            base_url: None,
            api_key_env: None,
            script_path: None,
            supports_system_prompt: None,
            supports_tool_calling: None,
            instructions: None,
            permitted_tools: None,
            parameters: None,
            max_tool_rounds: 4,
            max_repair_attempts: 2,
        }
    }

    /// Default generator configuration.
    #[must_use]
    pub fn generator() -> Self {
        Self::for_role(AgentRole::Generator)
    }

    /// Default judge configuration.
    #[must_use]
    pub fn judge() -> Self {
        Self::for_role(AgentRole::Judge)
    }

    /// Sets the model id.
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Pins both capability flags.
    #[must_use]
    pub fn with_capabilities(mut self, system_prompt: bool, tool_calling: bool) -> Self {
        self.supports_system_prompt = Some(system_prompt);
        self.supports_tool_calling = Some(tool_calling);
        self
    }

    /// Replaces the permitted tool list.
    #[must_use]
    pub fn with_permitted_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the tool round bound.
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Sets the repair bound.
    #[must_use]
    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    /// Capability flags: explicit values win over the capability table.
    #[must_use]
    pub fn capabilities(&self) -> ModelCapabilities {
        let known = capabilities_for(&self.model_id);
        ModelCapabilities {
            supports_system_prompt: self.supports_system_prompt.unwrap_or(known.supports_system_prompt),
            supports_tool_calling: self.supports_tool_calling.unwrap_or(known.supports_tool_calling),
        }
    }

    /// Tools this agent may call.
    #[must_use]
    pub fn permitted_tools(&self) -> Vec<&str> {
        match &self.permitted_tools {
            Some(tools) => tools.iter().map(String::as_str).collect(),
            None => self.role.default_tools().to_vec(),
        }
    }

    /// Whether this agent may call `tool`.
    #[must_use]
    pub fn permits(&self, tool: &str) -> bool {
        self.permitted_tools().contains(&tool)
    }

    /// Effective generation parameters.
    #[must_use]
    pub fn model_parameters(&self) -> ModelParameters {
        self.parameters.clone().unwrap_or_else(|| ModelParameters {
            max_tokens: Some(self.role.default_max_tokens()),
            ..ModelParameters::default()
        })
    }

    /// Model construction settings. The API key is read from `api_key_env` now.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_type: self.model_type,
            model_id: self.model_id.clone(),
            api_key: self.api_key_env.as_deref().and_then(|name| std::env::var(name).ok()),
            base_url: self.base_url.clone(),
            script_path: self.script_path.clone(),
        }
    }

    /// Copy of this config with per-run overrides applied.
    #[must_use]
    pub fn with_overrides(&self, overrides: &RunOverrides) -> Self {
        let mut config = self.clone();
        if let Some(model_id) = &overrides.model_id {
            config.model_id.clone_from(model_id);
        }
        if let Some(rounds) = overrides.max_tool_rounds {
            config.max_tool_rounds = rounds;
        }
        config
    }
}

/// Per-run overrides applied to both agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOverrides {
    /// Model id to use instead of the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Tool round bound to use instead of the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_rounds: Option<u32>,
}

/// Both agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Goal generator.
    #[serde(default = "AgentConfig::generator")]
    pub generator: AgentConfig,
    /// Judge.
    #[serde(default = "AgentConfig::judge")]
    pub judge: AgentConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self { generator: AgentConfig::generator(), judge: AgentConfig::judge() }
    }
}

/// Retry, timeout, and concurrency settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts per stage, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on any retry delay.
    pub max_backoff_ms: u64,
    /// Growth factor between retries.
    pub backoff_multiplier: f64,
    /// Deadline for a single stage attempt.
    pub stage_timeout_secs: u64,
    /// Runs processed at once by `run_batch`.
    pub max_concurrent_runs: usize,
    /// Tools the orchestrator itself may call when resolving note references.
    pub intake_tools: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
            backoff_multiplier: 2.0,
            stage_timeout_secs: 120,
            max_concurrent_runs: 4,
            intake_tools: vec![FETCH_NOTE.to_string()],
        }
    }
}

impl PipelineConfig {
    /// Stage attempt deadline.
    #[must_use]
    pub const fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

/// Scoring scale and criterion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Lowest allowed criterion score.
    pub scale_min: f64,
    /// Highest allowed criterion score.
    pub scale_max: f64,
    /// Weight per criterion name. Unlisted criteria weigh 1.0.
    pub weights: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { scale_min: 0.0, scale_max: 5.0, weights: BTreeMap::new() }
    }
}

impl ScoringConfig {
    /// Weight of `criterion`.
    #[must_use]
    pub fn weight(&self, criterion: Criterion) -> f64 {
        self.weights.get(criterion.as_str()).copied().unwrap_or(1.0)
    }

    /// Whether `score` lies on the scale.
    #[must_use]
    pub fn in_range(&self, score: f64) -> bool {
        score.is_finite() && score >= self.scale_min && score <= self.scale_max
    }

    /// Weighted mean of the given criterion scores.
    #[must_use]
    pub fn weighted_mean(&self, scores: &BTreeMap<Criterion, f64>) -> f64 {
        let (sum, total_weight) = scores.iter().fold((0.0, 0.0), |(sum, weight), (criterion, score)| {
            let w = self.weight(*criterion);
            (sum + w * score, weight + w)
        });
        if total_weight > 0.0 { sum / total_weight } else { self.scale_min }
    }
}

/// One argument of a remote tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Argument name.
    pub name: String,
    /// JSON type ("string", "integer", "number", "boolean", "object", "array").
    #[serde(rename = "type")]
    pub param_type: String,
    /// What the argument means.
    #[serde(default)]
    pub description: String,
    /// Whether the argument must be present.
    #[serde(default)]
    pub required: bool,
}

/// A tool served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToolConfig {
    /// Tool name.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// URL the request is posted to.
    pub endpoint: String,
    /// Argument schema.
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    /// Environment variable with the bearer token, if it differs from `[tools].credential_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
}

/// Tool gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Per-call timeout.
    pub timeout_ms: u64,
    /// Directory `fetch_note` reads relative references from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes_dir: Option<PathBuf>,
    /// Environment variable holding the bearer token for remote tools.
    pub credential_env: String,
    /// Remote tools.
    pub remote: Vec<RemoteToolConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            notes_dir: None,
            credential_env: "GOALSMITH_TOOL_TOKEN".to_string(),
            remote: Vec::new(),
        }
    }
}

impl ToolsConfig {
    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalsmithConfig {
    /// Retry and concurrency settings.
    pub pipeline: PipelineConfig,
    /// Scoring scale.
    pub scoring: ScoringConfig,
    /// Tool gateway.
    pub tools: ToolsConfig,
    /// The two agents.
    pub agents: AgentsConfig,
}

impl GoalsmithConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_path_buf(), reason: e.to_string() })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from TOML string
    ///
    /// The content may wrap everything in a `[goalsmith]` table.
    ///
    /// # Errors
    /// Returns error if TOML cannot be parsed
    pub fn from_toml_str(toml_content: &str) -> Result<Self, ConfigError> {
        let toml: toml::Value =
            toml::from_str(toml_content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config_value = match toml.get("goalsmith") {
            Some(section) => section.clone(),
            None => toml,
        };

        let judge_model_set = config_value
            .get("agents")
            .and_then(|agents| agents.get("judge"))
            .is_some_and(|judge| judge.get("model_id").is_some());

        let mut config: Self = config_value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        config.agents.generator.role = AgentRole::Generator;
        config.agents.judge.role = AgentRole::Judge;
        // A partial judge table is filled from the generator-shaped default.
        if !judge_model_set {
            config.agents.judge.model_id = AgentConfig::judge().model_id;
        }
        Ok(config)
    }

    /// Loads the file named by `GOALSMITH_CONFIG`, or the defaults when unset.
    ///
    /// # Errors
    /// Returns error if the named file cannot be loaded
    #[allow(clippy::disallowed_methods)]
    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_toml(path),
            _ => Ok(Self::default()),
        }
    }

    /// Names of every tool the gateway will register.
    #[must_use]
    pub fn known_tools(&self) -> Vec<&str> {
        BUILTIN_TOOL_NAMES
            .iter()
            .copied()
            .chain(self.tools.remote.iter().map(|t| t.name.as_str()))
            .collect()
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.pipeline.max_attempts == 0 {
            return invalid("pipeline.max_attempts must be at least 1".into());
        }
        if self.pipeline.max_concurrent_runs == 0 {
            return invalid("pipeline.max_concurrent_runs must be at least 1".into());
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return invalid("pipeline.stage_timeout_secs must be at least 1".into());
        }
        if self.pipeline.backoff_multiplier < 1.0 {
            return invalid("pipeline.backoff_multiplier must be at least 1.0".into());
        }
        if self.tools.timeout_ms == 0 {
            return invalid("tools.timeout_ms must be at least 1".into());
        }
        if !(self.scoring.scale_min.is_finite() && self.scoring.scale_max.is_finite())
            || self.scoring.scale_min >= self.scoring.scale_max
        {
            return invalid(format!(
                "scoring scale [{}, {}] is empty or inverted",
                self.scoring.scale_min, self.scoring.scale_max
            ));
        }
        for (name, weight) in &self.scoring.weights {
            if Criterion::parse(name).is_none() {
                return invalid(format!("scoring.weights names unknown criterion '{name}'"));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return invalid(format!("scoring.weights.{name} must be a non-negative number"));
            }
        }
        if Criterion::ALL.iter().all(|c| self.scoring.weight(*c) == 0.0) {
            return invalid("scoring.weights cannot all be zero".into());
        }

        let mut seen = std::collections::HashSet::new();
        for remote in &self.tools.remote {
            if BUILTIN_TOOL_NAMES.contains(&remote.name.as_str()) || !seen.insert(remote.name.as_str()) {
                return invalid(format!("tool '{}' is registered twice", remote.name));
            }
        }

        let known = self.known_tools();
        for tool in &self.pipeline.intake_tools {
            if !known.contains(&tool.as_str()) {
                return invalid(format!("pipeline.intake_tools names unknown tool '{tool}'"));
            }
        }
        for agent in [&self.agents.generator, &self.agents.judge] {
            if agent.model_id.trim().is_empty() {
                return invalid(format!("agents.{}.model_id is empty", agent.role));
            }
            if agent.model_type == ModelType::Universal && agent.base_url.is_none() {
                return invalid(format!("agents.{}.base_url is required for universal models", agent.role));
            }
            for tool in agent.permitted_tools() {
                if !known.contains(&tool) {
                    return invalid(format!("agents.{}.permitted_tools names unknown tool '{tool}'", agent.role));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GoalsmithConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.agents.judge.role, AgentRole::Judge);
        assert_eq!(config.agents.judge.model_parameters().max_tokens, Some(8192));
        assert_eq!(config.agents.generator.model_parameters().max_tokens, Some(4096));
        assert!(config.agents.judge.permits(BUILD_EVAL_PLAN));
        assert!(!config.agents.generator.permits(BUILD_EVAL_PLAN));
    }

    #[test]
    fn test_from_toml_with_wrapper_and_partial_tables() {
        let config = GoalsmithConfig::from_toml_str(
            r#"
            [goalsmith.pipeline]
            max_attempts = 5

            [goalsmith.agents.judge]
            model_id = "meta.llama3-70b-instruct-v1:0"
            max_tool_rounds = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.pipeline.initial_backoff_ms, 250);
        assert_eq!(config.agents.judge.role, AgentRole::Judge);
        assert_eq!(config.agents.judge.max_tool_rounds, 2);
        assert!(config.agents.judge.permits(BUILD_EVAL_PLAN));
        assert!(!config.agents.judge.capabilities().supports_tool_calling);
        assert!(config.agents.judge.capabilities().supports_system_prompt);
        assert_eq!(config.agents.generator, AgentConfig::generator());
    }

    #[test]
    fn test_partial_judge_table_keeps_judge_model() {
        let config = GoalsmithConfig::from_toml_str("[agents.judge]\nmax_repair_attempts = 1\n").unwrap();
        assert_eq!(config.agents.judge.model_id, "mock-judge");
        assert_eq!(config.agents.judge.max_repair_attempts, 1);
    }

    #[test]
    fn test_explicit_flags_override_capability_table() {
        let config = AgentConfig::generator()
            .with_model_id("mistral.mistral-7b-instruct-v0:2")
            .with_capabilities(true, true);
        assert_eq!(config.capabilities(), ModelCapabilities::default());
    }

    #[test]
    fn test_validate_rejects_unknown_tool() {
        let mut config = GoalsmithConfig::default();
        config.agents.generator = AgentConfig::generator().with_permitted_tools(["delete_chart"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("delete_chart"));
    }

    #[test]
    fn test_validate_rejects_inverted_scale_and_zero_attempts() {
        let mut config = GoalsmithConfig::default();
        config.scoring.scale_min = 5.0;
        config.scoring.scale_max = 0.0;
        assert!(config.validate().is_err());

        let mut config = GoalsmithConfig::default();
        config.pipeline.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = GoalsmithConfig::default();
        config.scoring.weights.insert("achievable".into(), 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_tools_become_known() {
        let config = GoalsmithConfig::from_toml_str(
            r#"
            [[tools.remote]]
            name = "icd_search"
            description = "Search ICD-10 codes"
            endpoint = "http://localhost:9000/tools"
            parameters = [{ name = "query", type = "string", required = true }]

            [agents.generator]
            permitted_tools = ["fetch_note", "icd_search"]
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert!(config.agents.generator.permits("icd_search"));
    }

    #[test]
    fn test_weighted_mean() {
        let mut scoring = ScoringConfig::default();
        let scores: BTreeMap<Criterion, f64> =
            [(Criterion::Specific, 5.0), (Criterion::Measurable, 1.0)].into_iter().collect();
        assert!((scoring.weighted_mean(&scores) - 3.0).abs() < f64::EPSILON);

        scoring.weights.insert("specific".into(), 3.0);
        assert!((scoring.weighted_mean(&scores) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overrides() {
        let overrides = RunOverrides { model_id: Some("other".into()), max_tool_rounds: Some(9) };
        let config = AgentConfig::judge().with_overrides(&overrides);
        assert_eq!(config.model_id, "other");
        assert_eq!(config.max_tool_rounds, 9);
        assert_eq!(config.role, AgentRole::Judge);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = GoalsmithConfig::load_from_toml("/nonexistent/goalsmith.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
