use serde::{Deserialize, Serialize};

use crate::analyst::AnalystKind;
use crate::error::ConfigError;
use crate::request::check_round_limit;

/// Hard cap on either debate's round limit.
pub const MAX_ROUND_LIMIT: u32 = 10;

/// Top-level configuration for TRADEDESK.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradedeskConfig {
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl TradedeskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reasoning.validate()?;
        self.memory.validate()?;
        self.run.validate()
    }
}

/// Which text-generation backend to call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// The local `claude` CLI.
    #[default]
    ClaudeCli,
    /// Google Gemini `generateContent` over HTTP.
    Gemini,
}

/// Configuration for the reasoning (text generation) layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Base URL for HTTP providers. Ignored by the CLI provider.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Environment variable holding the API key for HTTP providers.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model for synthesis and the two debate adjudicators.
    #[serde(default = "default_deep_model")]
    pub deep_model: String,
    /// Model for analysts and debaters.
    #[serde(default = "default_quick_model")]
    pub quick_model: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
    /// Retries after the first attempt, for transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between retries; doubles on each retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            backend_url: default_backend_url(),
            api_key_env: default_api_key_env(),
            deep_model: default_deep_model(),
            quick_model: default_quick_model(),
            call_timeout_seconds: default_call_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl ReasoningConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_seconds == 0 {
            return Err(ConfigError::ZeroValue("reasoning.call_timeout_seconds"));
        }
        if self.deep_model.trim().is_empty() || self.quick_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "reasoning.deep_model and reasoning.quick_model must be set".to_string(),
            ));
        }
        if self.provider == ProviderKind::Gemini && self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "reasoning.backend_url is required for the gemini provider".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the situation memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Path to the SQLite memory file. `:memory:` keeps it in-process.
    #[serde(default = "default_memory_path")]
    pub sqlite_path: String,
    /// Use embeddings (similarity mode). Lexical fallback when false.
    #[serde(default)]
    pub use_embeddings: bool,
    /// OpenAI-compatible endpoint for embeddings.
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    /// Embedding model; derived from the endpoint when unset.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Number of past situations recalled per query.
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
    /// Maximum number of cached query results.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// How long a cached query result lives.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_memory_path(),
            use_embeddings: false,
            embedding_url: default_embedding_url(),
            embedding_model: None,
            max_matches: default_max_matches(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

impl MemoryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_matches == 0 {
            return Err(ConfigError::ZeroValue("memory.max_matches"));
        }
        Ok(())
    }
}

/// Configuration for the run pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Analysts requested by default.
    #[serde(default = "default_analysts")]
    pub analysts: Vec<AnalystKind>,
    #[serde(default = "default_rounds")]
    pub max_debate_rounds: u32,
    #[serde(default = "default_rounds")]
    pub max_risk_rounds: u32,
    /// Overall budget for a run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
    /// Online data tools when true, cached snapshots from `data_dir` otherwise.
    #[serde(default = "default_true")]
    pub online_tools: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            analysts: default_analysts(),
            max_debate_rounds: default_rounds(),
            max_risk_rounds: default_rounds(),
            run_timeout_seconds: default_run_timeout(),
            online_tools: true,
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_round_limit("run.max_debate_rounds", self.max_debate_rounds)?;
        check_round_limit("run.max_risk_rounds", self.max_risk_rounds)?;
        if self.run_timeout_seconds == 0 {
            return Err(ConfigError::ZeroValue("run.run_timeout_seconds"));
        }
        Ok(())
    }
}

fn default_backend_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_deep_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
fn default_quick_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_call_timeout() -> u64 {
    90
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_memory_path() -> String {
    "data/tradedesk_memory.db".to_string()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_matches() -> usize {
    5
}
fn default_cache_capacity() -> u64 {
    1_000
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_analysts() -> Vec<AnalystKind> {
    AnalystKind::ALL.to_vec()
}
fn default_rounds() -> u32 {
    1
}
fn default_run_timeout() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_data_dir() -> String {
    "data/snapshots".to_string()
}
fn default_results_dir() -> String {
    "results".to_string()
}
