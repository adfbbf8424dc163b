use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{DeepResearchError, SecretValue, optional_env};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "DEEPRESEARCH_CONFIG";

/// Top-level configuration structure. Every section is optional in the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub workflow: WorkflowConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document and validate it, without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, DeepResearchError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| DeepResearchError::InvalidConfiguration(err.to_string()))?;
        ConfigLoader::validate(&config)?;
        Ok(config)
    }

    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.llm.api_key_env)
    }

    pub fn search_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.search.api_key_env)
    }

    /// True when searches will be served by the offline provider.
    pub fn search_mock_mode(&self) -> bool {
        match self.search.provider {
            SearchProviderKind::Mock => true,
            SearchProviderKind::Tavily => self.search_api_key().is_none(),
        }
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `DEEPRESEARCH_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory, if it exists.
    /// 4. Built-in defaults.
    ///
    /// `DEEPRESEARCH_*` overrides are applied on top of whichever source won.
    pub fn load(path: Option<PathBuf>) -> Result<Config, DeepResearchError> {
        let mut config = match resolve_path(path) {
            Some(candidate) => {
                let raw = fs::read_to_string(&candidate)
                    .map_err(|err| DeepResearchError::config_io(candidate.clone(), err))?;
                toml::from_str(&raw)
                    .map_err(|err| DeepResearchError::InvalidConfiguration(err.to_string()))?
            }
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), DeepResearchError> {
        let invalid = |msg: &str| Err(DeepResearchError::InvalidConfiguration(msg.into()));

        if config.llm.api_key_env.trim().is_empty() {
            return invalid("llm.api_key_env must reference an environment variable");
        }
        if config.search.api_key_env.trim().is_empty() {
            return invalid("search.api_key_env must reference an environment variable");
        }
        if config.llm.reasoning_model.trim().is_empty() || config.llm.fast_model.trim().is_empty()
        {
            return invalid("llm.reasoning_model and llm.fast_model must be set");
        }
        if config.workflow.max_iterations == 0 {
            return invalid("workflow.max_iterations must be at least 1");
        }
        if config.workflow.max_critique_loops == 0 {
            return invalid("workflow.max_critique_loops must be at least 1");
        }
        if config.workflow.max_queries_per_plan == 0 {
            return invalid("workflow.max_queries_per_plan must be at least 1");
        }
        if config.search.max_results == 0 {
            return invalid("search.max_results must be at least 1");
        }
        if !(0.0..=1.0).contains(&config.search.min_relevance_score) {
            return invalid("search.min_relevance_score must be within [0, 1]");
        }
        if config.server.max_concurrent_runs == 0 {
            return invalid("server.max_concurrent_runs must be at least 1");
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV)
        && !from_env.trim().is_empty()
    {
        return Some(PathBuf::from(from_env));
    }

    let fallback = Path::new(DEFAULT_CONFIG_PATH);
    fallback.exists().then(|| fallback.to_path_buf())
}

fn apply_env_overrides(config: &mut Config) -> Result<(), DeepResearchError> {
    override_from_env(
        "DEEPRESEARCH_MAX_ITERATIONS",
        &mut config.workflow.max_iterations,
    )?;
    override_from_env(
        "DEEPRESEARCH_MAX_CRITIQUE_LOOPS",
        &mut config.workflow.max_critique_loops,
    )?;
    override_from_env(
        "DEEPRESEARCH_REASONING_MODEL",
        &mut config.llm.reasoning_model,
    )?;
    override_from_env("DEEPRESEARCH_FAST_MODEL", &mut config.llm.fast_model)?;
    override_from_env("DEEPRESEARCH_LISTEN_ADDR", &mut config.server.listen_addr)?;
    Ok(())
}

fn override_from_env<T: FromStr>(var: &str, slot: &mut T) -> Result<(), DeepResearchError> {
    let Ok(raw) = env::var(var) else {
        return Ok(());
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }
    *slot = raw.parse().map_err(|_| {
        DeepResearchError::InvalidConfiguration(format!("{var} has an invalid value: {raw}"))
    })?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_provider")]
    pub provider: String,
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_reasoning_model")]
    pub reasoning_model: String,
    #[serde(default = "LlmConfig::default_fast_model")]
    pub fast_model: String,
    #[serde(default = "LlmConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "LlmConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    fn default_provider() -> String {
        "openai".into()
    }

    fn default_base_url() -> String {
        "https://api.openai.com/v1".into()
    }

    fn default_reasoning_model() -> String {
        "gpt-4o".into()
    }

    fn default_fast_model() -> String {
        "gpt-4o-mini".into()
    }

    fn default_api_key_env() -> String {
        "OPENAI_API_KEY".into()
    }

    const fn default_request_timeout_secs() -> u64 {
        120
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            base_url: Self::default_base_url(),
            reasoning_model: Self::default_reasoning_model(),
            fast_model: Self::default_fast_model(),
            api_key_env: Self::default_api_key_env(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    #[default]
    Tavily,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProviderKind,
    #[serde(default = "SearchConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "SearchConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "SearchConfig::default_search_depth")]
    pub search_depth: String,
    #[serde(default = "SearchConfig::default_max_results")]
    pub max_results: usize,
    #[serde(default = "SearchConfig::default_min_relevance_score")]
    pub min_relevance_score: f64,
    #[serde(default = "SearchConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl SearchConfig {
    fn default_base_url() -> String {
        "https://api.tavily.com".into()
    }

    fn default_api_key_env() -> String {
        "TAVILY_API_KEY".into()
    }

    fn default_search_depth() -> String {
        "advanced".into()
    }

    const fn default_max_results() -> usize {
        5
    }

    const fn default_min_relevance_score() -> f64 {
        0.6
    }

    const fn default_request_timeout_secs() -> u64 {
        30
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::default(),
            base_url: Self::default_base_url(),
            api_key_env: Self::default_api_key_env(),
            search_depth: Self::default_search_depth(),
            max_results: Self::default_max_results(),
            min_relevance_score: Self::default_min_relevance_score(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "WorkflowConfig::default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "WorkflowConfig::default_max_critique_loops")]
    pub max_critique_loops: u32,
    #[serde(default = "WorkflowConfig::default_max_queries_per_plan")]
    pub max_queries_per_plan: usize,
    #[serde(default = "WorkflowConfig::default_fact_preview_chars")]
    pub fact_preview_chars: usize,
    #[serde(default = "WorkflowConfig::default_approval_min_feedback_chars")]
    pub approval_min_feedback_chars: usize,
    #[serde(default = "WorkflowConfig::default_approval_markers")]
    pub approval_markers: Vec<String>,
}

impl WorkflowConfig {
    const fn default_max_iterations() -> u32 {
        5
    }

    const fn default_max_critique_loops() -> u32 {
        3
    }

    const fn default_max_queries_per_plan() -> usize {
        3
    }

    const fn default_fact_preview_chars() -> usize {
        200
    }

    const fn default_approval_min_feedback_chars() -> usize {
        10
    }

    fn default_approval_markers() -> Vec<String> {
        vec!["No critical issues".into()]
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::default_max_iterations(),
            max_critique_loops: Self::default_max_critique_loops(),
            max_queries_per_plan: Self::default_max_queries_per_plan(),
            fact_preview_chars: Self::default_fact_preview_chars(),
            approval_min_feedback_chars: Self::default_approval_min_feedback_chars(),
            approval_markers: Self::default_approval_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "ServerConfig::default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default = "ServerConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8000".into()
    }

    const fn default_max_concurrent_runs() -> usize {
        5
    }

    fn default_cors_origins() -> Vec<String> {
        vec![
            "http://localhost:3000".into(),
            "http://localhost:5173".into(),
        ]
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            max_concurrent_runs: Self::default_max_concurrent_runs(),
            cors_origins: Self::default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}
