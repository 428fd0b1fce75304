//! Bounded-round debate protocol.
//!
//! [`next_step`] is pure: it reads a [`DebateState`] and says what happens
//! next. [`execute_step`] performs that step and returns the delta for the
//! coordinator to apply. Failures never escape; they become placeholder
//! turns and verdicts.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use tradedesk_models::{DebateDelta, DebateRole, DebateState};

use crate::client::ReasoningClient;
use crate::context::DebateContext;
use crate::error::AgentError;
use crate::prompts::{adjudicator_prompt, debater_prompt, DebatePersona};
use crate::retry::RetryPolicy;

/// Verdict when no arguments were ever made (round limit 0).
pub const INSUFFICIENT_INFORMATION: &str =
    "INSUFFICIENT INFORMATION: no arguments were presented, so no verdict can be reached.";
/// Placeholder for a turn whose generation failed.
pub const NO_RESPONSE: &str = "[no response: generation failed]";
/// Placeholder for a verdict whose generation failed.
pub const VERDICT_UNAVAILABLE: &str = "[verdict unavailable: generation failed]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateStep<R> {
    Turn(R),
    AdvanceRound,
    Adjudicate { early: bool },
    Done,
}

/// What the debate needs next. `early_stop` is honoured only between rounds,
/// after at least one full round.
pub fn next_step<R: DebateRole>(state: &DebateState<R>, early_stop: bool) -> DebateStep<R> {
    if state.is_concluded() {
        return DebateStep::Done;
    }
    if state.at_round_boundary() {
        if state.round() >= state.round_limit() {
            return DebateStep::Adjudicate { early: false };
        }
        if early_stop && state.round() > 0 {
            return DebateStep::Adjudicate { early: true };
        }
    }
    match state.next_speaker() {
        Some(role) => DebateStep::Turn(role),
        None => DebateStep::AdvanceRound,
    }
}

/// Produces one participant's turn.
#[async_trait]
pub trait TurnGenerator<R: DebateRole>: Send + Sync {
    async fn turn(
        &self,
        role: R,
        state: &DebateState<R>,
        ctx: &DebateContext,
    ) -> Result<String, AgentError>;
}

/// Judges a debate. Mockable for testing.
#[async_trait]
pub trait Adjudicator<R: DebateRole>: Send + Sync {
    async fn adjudicate(
        &self,
        state: &DebateState<R>,
        ctx: &DebateContext,
    ) -> Result<String, AgentError>;

    /// Consulted after each completed round; `true` ends the debate early.
    fn early_stop(&self, _state: &DebateState<R>) -> bool {
        false
    }
}

/// Debater backed by a reasoning client.
pub struct LlmDebater {
    client: Arc<dyn ReasoningClient>,
    retry: RetryPolicy,
}

impl LlmDebater {
    pub fn new(client: Arc<dyn ReasoningClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl<R: DebatePersona> TurnGenerator<R> for LlmDebater {
    async fn turn(
        &self,
        role: R,
        state: &DebateState<R>,
        ctx: &DebateContext,
    ) -> Result<String, AgentError> {
        let prompt = debater_prompt(role, state, ctx);
        self.retry
            .generate(self.client.as_ref(), &prompt, ctx.deadline)
            .await
    }
}

/// Research manager or portfolio manager backed by a reasoning client.
pub struct LlmAdjudicator {
    client: Arc<dyn ReasoningClient>,
    retry: RetryPolicy,
}

impl LlmAdjudicator {
    pub fn new(client: Arc<dyn ReasoningClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl<R: DebatePersona> Adjudicator<R> for LlmAdjudicator {
    async fn adjudicate(
        &self,
        state: &DebateState<R>,
        ctx: &DebateContext,
    ) -> Result<String, AgentError> {
        let prompt = adjudicator_prompt(state, ctx);
        self.retry
            .generate(self.client.as_ref(), &prompt, ctx.deadline)
            .await
    }
}

/// Run `call` unless the context deadline passes first.
async fn within_deadline<F>(ctx: &DebateContext, call: F) -> Result<String, AgentError>
where
    F: Future<Output = Result<String, AgentError>>,
{
    match ctx.deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or(Err(AgentError::Timeout(0))),
        None => call.await,
    }
}

fn usable(result: Result<String, AgentError>) -> Result<String, AgentError> {
    match result {
        Ok(text) if text.trim().is_empty() => {
            Err(AgentError::Transient("empty generation".to_string()))
        }
        other => other,
    }
}

/// Perform one step. `None` for [`DebateStep::Done`].
pub async fn execute_step<R: DebateRole>(
    step: DebateStep<R>,
    state: &DebateState<R>,
    ctx: &DebateContext,
    generator: &dyn TurnGenerator<R>,
    adjudicator: &dyn Adjudicator<R>,
) -> Option<DebateDelta<R>> {
    match step {
        DebateStep::Done => None,
        DebateStep::AdvanceRound => {
            debug!(round = state.round() + 1, "Debate round advanced");
            Some(DebateDelta::RoundAdvanced)
        }
        DebateStep::Turn(role) => {
            let result = usable(within_deadline(ctx, generator.turn(role, state, ctx)).await);
            Some(match result {
                Ok(text) => DebateDelta::Turn {
                    role,
                    text,
                    degraded: false,
                },
                Err(e) => {
                    warn!(role = role.label(), round = state.round(), error = %e, "Debate turn failed, using placeholder");
                    DebateDelta::Turn {
                        role,
                        text: NO_RESPONSE.to_string(),
                        degraded: true,
                    }
                }
            })
        }
        DebateStep::Adjudicate { early } => {
            if state.all_histories_empty() {
                return Some(DebateDelta::Verdict {
                    text: INSUFFICIENT_INFORMATION.to_string(),
                    early,
                    degraded: false,
                });
            }
            let result = usable(within_deadline(ctx, adjudicator.adjudicate(state, ctx)).await);
            Some(match result {
                Ok(text) => DebateDelta::Verdict {
                    text,
                    early,
                    degraded: false,
                },
                Err(e) => {
                    warn!(round = state.round(), error = %e, "Adjudicator failed, using placeholder verdict");
                    DebateDelta::Verdict {
                        text: VERDICT_UNAVAILABLE.to_string(),
                        early,
                        degraded: true,
                    }
                }
            })
        }
    }
}

/// True for verdict texts produced by the protocol itself rather than a judge.
pub fn is_placeholder_verdict(text: &str) -> bool {
    text == INSUFFICIENT_INFORMATION || text == VERDICT_UNAVAILABLE
}
