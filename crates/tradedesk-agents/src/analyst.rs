use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};
use tradedesk_models::{AnalystKind, RunRequest};

use crate::client::ReasoningClient;
use crate::error::AgentError;
use crate::prompts::{analyst_prompt, ToolData};
use crate::retry::RetryPolicy;

/// A report and the data tools consulted to write it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalystOutput {
    pub report: String,
    pub tool_calls: Vec<String>,
}

/// Report producer for one analyst slot. Mockable for testing.
#[async_trait]
pub trait Analyst: Send + Sync {
    fn kind(&self) -> AnalystKind;

    async fn produce(&self, request: &RunRequest) -> Result<AnalystOutput, AgentError>;
}

/// Data source an analyst consults before writing its report.
#[async_trait]
pub trait DataTool: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, subject: &str, as_of_date: NaiveDate) -> Result<String, AgentError>;
}

/// Tool names each analyst consults.
pub fn default_tool_names(kind: AnalystKind) -> &'static [&'static str] {
    match kind {
        AnalystKind::Market => &["price_history", "technical_indicators"],
        AnalystKind::Sentiment => &["social_posts"],
        AnalystKind::News => &["company_news", "global_news"],
        AnalystKind::Fundamentals => &["financial_statements", "insider_transactions"],
    }
}

/// Offline tool reading cached data from
/// `<data_dir>/<tool>/<SUBJECT>/<YYYY-MM-DD>.txt`.
#[derive(Debug, Clone)]
pub struct SnapshotTool {
    name: String,
    data_dir: PathBuf,
}

impl SnapshotTool {
    pub fn new(name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.into(),
        }
    }

    /// One snapshot tool per default tool name of `kind`.
    pub fn for_analyst(kind: AnalystKind, data_dir: &Path) -> Vec<Arc<dyn DataTool>> {
        default_tool_names(kind)
            .iter()
            .map(|name| Arc::new(SnapshotTool::new(*name, data_dir)) as Arc<dyn DataTool>)
            .collect()
    }

    pub fn path_for(&self, subject: &str, as_of_date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(&self.name)
            .join(subject)
            .join(format!("{}.txt", as_of_date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl DataTool for SnapshotTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, subject: &str, as_of_date: NaiveDate) -> Result<String, AgentError> {
        let path = self.path_for(subject, as_of_date);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::Tool(format!("{}: {e}", path.display())))
    }
}

/// Analyst that gathers tool data, then asks a reasoning client for the report.
pub struct LlmAnalyst {
    kind: AnalystKind,
    client: Arc<dyn ReasoningClient>,
    retry: RetryPolicy,
    tools: Vec<Arc<dyn DataTool>>,
}

impl LlmAnalyst {
    pub fn new(kind: AnalystKind, client: Arc<dyn ReasoningClient>, retry: RetryPolicy) -> Self {
        Self {
            kind,
            client,
            retry,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn DataTool>>) -> Self {
        self.tools = tools;
        self
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn produce(&self, request: &RunRequest) -> Result<AnalystOutput, AgentError> {
        let mut tool_data = Vec::with_capacity(self.tools.len());
        for tool in &self.tools {
            let content = match tool.fetch(&request.subject, request.as_of_date).await {
                Ok(text) => Ok(text),
                Err(e) => {
                    warn!(analyst = %self.kind, tool = tool.name(), error = %e, "Data tool failed");
                    Err(e.to_string())
                }
            };
            tool_data.push(ToolData {
                tool: tool.name().to_string(),
                content,
            });
        }

        let prompt = analyst_prompt(self.kind, &request.subject, request.as_of_date, &tool_data);
        let report = self.retry.generate(self.client.as_ref(), &prompt, None).await?;
        debug!(analyst = %self.kind, chars = report.len(), "Report written");

        Ok(AnalystOutput {
            report,
            tool_calls: tool_data.into_iter().map(|d| d.tool).collect(),
        })
    }
}
