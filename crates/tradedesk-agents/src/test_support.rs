//! Test doubles for the run pipeline.
//!
//! `ScriptedClient` answers prompts by role from per-role scripts, so a whole
//! run can be driven through the real analysts, debaters and synthesis
//! without a model. The analyst, debater and adjudicator doubles cover
//! failure, latency and observation of the debate protocol.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tradedesk_memory::{MemoryError, MemoryStore};
use tradedesk_models::{
    AnalystKind, DebateRole, DebateState, MemoryMode, MemoryRecord, RunRequest,
};

use crate::analyst::{Analyst, AnalystOutput};
use crate::client::{Prompt, ReasoningClient};
use crate::context::DebateContext;
use crate::debate::{Adjudicator, TurnGenerator};
use crate::error::AgentError;
use crate::prompts::SYNTHESIS_ROLE;

/// A synthesis answer with every section and the given decision.
pub fn full_draft(decision: &str) -> String {
    format!(
        "**BULLISH ANALYSIS:** Revenue growth is accelerating.\n\
         **BEARISH ANALYSIS:** Valuation leaves little room for error.\n\
         **RISK ASSESSMENT:** Earnings in two weeks.\n\
         **INVESTMENT PLAN:** Size at half weight and add on confirmation.\n\
         **FINAL DECISION:** {decision}\n\
         **RATIONALE:** Scripted rationale."
    )
}

/// One scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Transient,
    Fatal,
    /// Never completes; exercises timeouts.
    Hang,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

/// Reasoning client answering from per-role scripts.
///
/// Scripted replies are consumed in order; after that the role's `always`
/// reply is used, and failing that a default: a full draft deciding HOLD for
/// synthesis, a HOLD verdict for the portfolio manager, and a short echo of
/// the role for everything else.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    always: HashMap<String, Reply>,
    log: Mutex<Vec<Prompt>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, role: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn always(mut self, role: &str, reply: Reply) -> Self {
        self.always.insert(role.to_string(), reply);
        self
    }

    /// Number of prompts received for `role`.
    pub fn calls(&self, role: &str) -> usize {
        self.prompts(role).len()
    }

    pub fn prompts(&self, role: &str) -> Vec<Prompt> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.role == role)
            .cloned()
            .collect()
    }

    fn default_reply(role: &str) -> Reply {
        match role {
            SYNTHESIS_ROLE => Reply::Text(full_draft("HOLD")),
            "portfolio_manager" => {
                Reply::text("**FINAL DECISION:** HOLD\n**RATIONALE:** Scripted verdict.")
            }
            other => Reply::Text(format!("{other} scripted output")),
        }
    }

    fn next_reply(&self, role: &str) -> Reply {
        let scripted = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(role)
            .and_then(VecDeque::pop_front);
        scripted
            .or_else(|| self.always.get(role).cloned())
            .unwrap_or_else(|| Self::default_reply(role))
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, AgentError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.clone());

        match self.next_reply(&prompt.role) {
            Reply::Text(text) => Ok(text),
            Reply::Transient => Err(AgentError::Transient(format!(
                "scripted transient failure for {}",
                prompt.role
            ))),
            Reply::Fatal => Err(AgentError::Fatal(format!(
                "scripted fatal failure for {}",
                prompt.role
            ))),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Analyst returning a fixed report.
pub struct StaticAnalyst {
    pub kind: AnalystKind,
    pub report: String,
}

impl StaticAnalyst {
    pub fn new(kind: AnalystKind, report: &str) -> Self {
        Self {
            kind,
            report: report.to_string(),
        }
    }
}

#[async_trait]
impl Analyst for StaticAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn produce(&self, _request: &RunRequest) -> Result<AnalystOutput, AgentError> {
        Ok(AnalystOutput {
            report: self.report.clone(),
            tool_calls: vec![format!("{}_snapshot", self.kind)],
        })
    }
}

/// Analyst that always fails.
pub struct FailingAnalyst(pub AnalystKind);

#[async_trait]
impl Analyst for FailingAnalyst {
    fn kind(&self) -> AnalystKind {
        self.0
    }

    async fn produce(&self, _request: &RunRequest) -> Result<AnalystOutput, AgentError> {
        Err(AgentError::Fatal(format!("{} analyst unavailable", self.0)))
    }
}

/// Analyst that answers after a delay.
pub struct SlowAnalyst {
    pub kind: AnalystKind,
    pub delay: Duration,
}

#[async_trait]
impl Analyst for SlowAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn produce(&self, _request: &RunRequest) -> Result<AnalystOutput, AgentError> {
        tokio::time::sleep(self.delay).await;
        Ok(AnalystOutput {
            report: format!("late {} report", self.kind),
            tool_calls: Vec::new(),
        })
    }
}

/// Analyst whose task panics.
pub struct PanickingAnalyst(pub AnalystKind);

#[async_trait]
impl Analyst for PanickingAnalyst {
    fn kind(&self) -> AnalystKind {
        self.0
    }

    async fn produce(&self, _request: &RunRequest) -> Result<AnalystOutput, AgentError> {
        panic!("{} analyst panicked", self.0)
    }
}

/// Debater that states its role and round.
pub struct StaticDebater;

#[async_trait]
impl<R: DebateRole> TurnGenerator<R> for StaticDebater {
    async fn turn(
        &self,
        role: R,
        state: &DebateState<R>,
        _ctx: &DebateContext,
    ) -> Result<String, AgentError> {
        Ok(format!("{} argues in round {}", role.label(), state.round() + 1))
    }
}

/// Debater that always fails.
pub struct FailingDebater;

#[async_trait]
impl<R: DebateRole> TurnGenerator<R> for FailingDebater {
    async fn turn(
        &self,
        role: R,
        _state: &DebateState<R>,
        _ctx: &DebateContext,
    ) -> Result<String, AgentError> {
        Err(AgentError::Transient(format!("{} unavailable", role.label())))
    }
}

/// Debater that answers after a delay.
pub struct SlowDebater(pub Duration);

#[async_trait]
impl<R: DebateRole> TurnGenerator<R> for SlowDebater {
    async fn turn(
        &self,
        role: R,
        _state: &DebateState<R>,
        _ctx: &DebateContext,
    ) -> Result<String, AgentError> {
        tokio::time::sleep(self.0).await;
        Ok(format!("{} finally speaks", role.label()))
    }
}

/// Adjudicator that returns a fixed verdict and records what it was shown.
pub struct RecordingAdjudicator {
    verdict: Option<String>,
    stop_after: Option<u32>,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<String>>,
}

impl RecordingAdjudicator {
    pub fn new(verdict: &str) -> Self {
        Self {
            verdict: Some(verdict.to_string()),
            stop_after: None,
            calls: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Adjudicator whose generation always fails.
    pub fn failing() -> Self {
        Self {
            verdict: None,
            ..Self::new("")
        }
    }

    /// Raise early stop once `round` rounds are complete.
    pub fn stop_after_round(mut self, round: u32) -> Self {
        self.stop_after = Some(round);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transcripts seen, one per adjudication.
    pub fn transcripts(&self) -> Vec<String> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<R: DebateRole> Adjudicator<R> for RecordingAdjudicator {
    async fn adjudicate(
        &self,
        state: &DebateState<R>,
        _ctx: &DebateContext,
    ) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.transcript().to_string());
        self.verdict
            .clone()
            .ok_or_else(|| AgentError::Transient("scripted adjudicator failure".to_string()))
    }

    fn early_stop(&self, state: &DebateState<R>) -> bool {
        self.stop_after.is_some_and(|n| state.round() >= n)
    }
}

/// Memory store that is always unreachable.
pub struct UnavailableMemory;

#[async_trait]
impl MemoryStore for UnavailableMemory {
    fn mode(&self) -> MemoryMode {
        MemoryMode::Similarity
    }

    async fn query(&self, _situation: &str, _n: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(MemoryError::Unavailable("embedding backend down".to_string()))
    }

    async fn record(&self, _situation: &str, _recommendation: &str) -> Result<(), MemoryError> {
        Err(MemoryError::Unavailable("embedding backend down".to_string()))
    }
}

/// Memory store whose calls never complete.
pub struct HangingMemory;

#[async_trait]
impl MemoryStore for HangingMemory {
    fn mode(&self) -> MemoryMode {
        MemoryMode::Lexical
    }

    async fn query(&self, _situation: &str, _n: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        std::future::pending().await
    }

    async fn record(&self, _situation: &str, _recommendation: &str) -> Result<(), MemoryError> {
        std::future::pending().await
    }
}
