//! TRADEDESK - multi-agent trading decision pipeline
//!
//! Analyst reports feed a bull/bear research debate, a synthesis drafts the
//! trade plan, a risk debate reviews it, and the portfolio manager's verdict
//! becomes a BUY/SELL/HOLD decision.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradedesk::models::{RunRequest, TradedeskConfig};
//! use tradedesk::agents::{Coordinator, RunError};
//! use tradedesk::memory::{MemoryStore, SqliteMemoryStore};
//! ```

pub use tradedesk_agents as agents;
pub use tradedesk_memory as memory;
pub use tradedesk_models as models;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{info, warn};
use tradedesk_agents::{
    ClaudeCliClient, Coordinator, CoordinatorSettings, GeminiClient, LlmAnalyst,
    ReasoningClient, RetryPolicy, RunError, SnapshotTool,
};
use tradedesk_memory::{Embedder, OpenAiEmbedder, SqliteMemory, SqliteMemoryStore};
use tradedesk_models::{
    AnalystKind, MemoryConfig, ProviderKind, ReasoningConfig, RunConfig, RunRequest, RunState,
    TradedeskConfig,
};

/// Environment variable read for the embeddings API key.
pub const EMBEDDING_API_KEY_ENV: &str = "OPENAI_API_KEY";

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// File name of an archived run inside its `<SUBJECT>/<date>` directory.
pub const ARCHIVE_FILE: &str = "run_state.json";

/// Load and validate a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<TradedeskConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: TradedeskConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Reasoning client for `model` on the configured provider.
pub fn reasoning_client(
    config: &ReasoningConfig,
    model: &str,
) -> anyhow::Result<Arc<dyn ReasoningClient>> {
    match config.provider {
        ProviderKind::ClaudeCli => Ok(Arc::new(ClaudeCliClient::new(model))),
        ProviderKind::Gemini => {
            let api_key = std::env::var(&config.api_key_env)
                .with_context(|| format!("{} is not set", config.api_key_env))?;
            Ok(Arc::new(GeminiClient::new(&config.backend_url, model, api_key)?))
        }
    }
}

/// Open the situation memory, with an embedder when embeddings are enabled.
pub fn open_memory(config: &MemoryConfig) -> anyhow::Result<SqliteMemoryStore> {
    if let Some(parent) = Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let sqlite = SqliteMemory::open(&config.sqlite_path)
        .with_context(|| format!("Failed to open memory: {}", config.sqlite_path))?;

    let embedder = if config.use_embeddings {
        let embedder = OpenAiEmbedder::new(
            &config.embedding_url,
            config.embedding_model.clone(),
            std::env::var(EMBEDDING_API_KEY_ENV).ok(),
            EMBEDDING_TIMEOUT,
        )?;
        Some(Arc::new(embedder) as Arc<dyn Embedder>)
    } else {
        None
    };

    Ok(SqliteMemoryStore::new(
        sqlite,
        embedder,
        config.cache_capacity,
        Duration::from_secs(config.cache_ttl_seconds),
    ))
}

/// Build a Coordinator from configuration.
pub fn build_coordinator(config: &TradedeskConfig) -> anyhow::Result<Coordinator> {
    config.validate()?;

    let reasoning = &config.reasoning;
    let quick = reasoning_client(reasoning, &reasoning.quick_model)?;
    let deep = reasoning_client(reasoning, &reasoning.deep_model)?;
    let retry = RetryPolicy::from_config(reasoning);
    let settings = CoordinatorSettings::from_config(config);

    let mut coordinator = Coordinator::new(Arc::clone(&quick), deep, retry.clone(), settings);

    // Online tools are wired by the provider; offline runs read cached snapshots.
    if !config.run.online_tools {
        let data_dir = Path::new(&config.run.data_dir);
        for kind in AnalystKind::ALL {
            let analyst = LlmAnalyst::new(kind, Arc::clone(&quick), retry.clone())
                .with_tools(SnapshotTool::for_analyst(kind, data_dir));
            coordinator = coordinator.with_analyst(Arc::new(analyst));
        }
    }

    let memory = open_memory(&config.memory)?;
    info!(
        provider = ?reasoning.provider,
        quick_model = %reasoning.quick_model,
        deep_model = %reasoning.deep_model,
        memory = %config.memory.sqlite_path,
        online_tools = config.run.online_tools,
        "Coordinator ready"
    );
    Ok(coordinator.with_memory(Arc::new(memory)))
}

/// A request for `subject` on `as_of_date` using the configured run defaults.
pub fn request_for(config: &RunConfig, subject: &str, as_of_date: NaiveDate) -> RunRequest {
    RunRequest {
        subject: subject.to_string(),
        as_of_date,
        analysts: config.analysts.clone(),
        max_debate_rounds: config.max_debate_rounds,
        max_risk_rounds: config.max_risk_rounds,
    }
}

/// Run one request to completion.
pub async fn run(coordinator: &Coordinator, request: RunRequest) -> Result<RunState, RunError> {
    coordinator.run(request).await
}

/// Where a run for `subject` on `as_of_date` is archived.
pub fn archive_path(results_dir: impl AsRef<Path>, subject: &str, as_of_date: NaiveDate) -> PathBuf {
    results_dir
        .as_ref()
        .join(subject)
        .join(as_of_date.format("%Y-%m-%d").to_string())
        .join(ARCHIVE_FILE)
}

/// Write the run state as pretty JSON under `results_dir`, replacing any
/// earlier run for the same subject and date.
pub fn archive_run(results_dir: impl AsRef<Path>, state: &RunState) -> anyhow::Result<PathBuf> {
    let path = archive_path(results_dir, state.subject(), state.as_of_date());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if path.exists() {
        warn!(path = %path.display(), "Replacing archived run");
    }

    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), run_id = %state.run_id(), "Run archived");
    Ok(path)
}

/// Read an archived run back.
pub fn load_run(path: impl AsRef<Path>) -> anyhow::Result<RunState> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradedesk_agents::test_support::ScriptedClient;
    use tradedesk_models::{ActionSignal, DecisionStatus};

    fn offline_config(dir: &Path) -> TradedeskConfig {
        let mut config = TradedeskConfig::default();
        config.memory.sqlite_path = dir.join("memory/tradedesk.db").display().to_string();
        config.run.online_tools = false;
        config.run.data_dir = dir.join("snapshots").display().to_string();
        config
    }

    #[test]
    fn load_config_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradedesk.toml");
        std::fs::write(
            &path,
            "[reasoning]\nquick_model = \"claude-3-5-haiku-latest\"\n\n[run]\nmax_debate_rounds = 3\nanalysts = [\"market\", \"social\"]\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.run.max_debate_rounds, 3);
        assert_eq!(config.run.max_risk_rounds, 1);
        assert_eq!(
            config.run.analysts,
            vec![AnalystKind::Market, AnalystKind::Sentiment]
        );
        assert_eq!(config.memory.max_matches, 5);
        assert_eq!(config.reasoning.provider, ProviderKind::ClaudeCli);
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradedesk.toml");
        std::fs::write(&path, "[run]\nmax_risk_rounds = 11\n").unwrap();
        assert!(load_config(&path).is_err());

        std::fs::write(&path, "[run]\nanalysts = [\"macro\"]\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_config_is_an_error() {
        let err = load_config("/nonexistent/tradedesk.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn gemini_requires_api_key() {
        let config = ReasoningConfig {
            provider: ProviderKind::Gemini,
            api_key_env: "TRADEDESK_TEST_UNSET_KEY_5d1c".to_string(),
            ..ReasoningConfig::default()
        };
        let err = match reasoning_client(&config, "gemini-2.0-flash") {
            Ok(_) => panic!("expected a missing key error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("TRADEDESK_TEST_UNSET_KEY_5d1c"));
    }

    #[test]
    fn builds_offline_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let coordinator = build_coordinator(&config).unwrap();
        assert_eq!(coordinator.settings().max_matches, 5);
        assert!(dir.path().join("memory/tradedesk.db").exists());
    }

    #[test]
    fn request_uses_run_defaults() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let request = request_for(&RunConfig::default(), "aapl", date);
        assert_eq!(request.analysts, AnalystKind::ALL.to_vec());
        assert_eq!(request.max_debate_rounds, 1);
        assert_eq!(request.validated().unwrap().subject, "AAPL");
    }

    #[tokio::test]
    async fn archived_run_loads_back() {
        let client = Arc::new(ScriptedClient::new());
        let coordinator = Coordinator::new(
            client.clone(),
            client,
            RetryPolicy::default(),
            CoordinatorSettings::default(),
        );
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let state = run(&coordinator, request_for(&RunConfig::default(), "msft", date))
            .await
            .unwrap();
        assert_eq!(state.decision_status(), DecisionStatus::Decided(ActionSignal::Hold));

        let dir = tempfile::tempdir().unwrap();
        let path = archive_run(dir.path(), &state).unwrap();
        assert!(path.ends_with("MSFT/2025-03-14/run_state.json"));

        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded, state);

        // same subject and date overwrites in place
        assert_eq!(archive_run(dir.path(), &state).unwrap(), path);
    }
}
