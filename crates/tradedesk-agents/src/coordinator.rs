use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tradedesk_memory::{MemoryError, MemoryStore};
use tradedesk_models::{
    AnalystKind, DebateDelta, DebateRole, DebateState, ReportOutcome, ResearchRole, RiskRole,
    RunRequest, RunState, Stage, StateDelta, TradedeskConfig,
};

use crate::analyst::{Analyst, LlmAnalyst};
use crate::client::ReasoningClient;
use crate::context::{self, assemble_reports, risk_material, DebateContext, Recall};
use crate::debate::{
    execute_step, next_step, Adjudicator, LlmAdjudicator, LlmDebater, TurnGenerator,
};
use crate::error::{NoDecisionReason, RunError};
use crate::retry::RetryPolicy;
use crate::synthesis::{decide, Synthesizer};

/// Run-level knobs that are not part of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Past situations recalled per run.
    pub max_matches: usize,
    pub run_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&TradedeskConfig::default())
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &TradedeskConfig) -> Self {
        Self {
            max_matches: config.memory.max_matches,
            run_timeout: Duration::from_secs(config.run.run_timeout_seconds),
        }
    }
}

type Updates<'a> = Option<&'a mpsc::UnboundedSender<Result<RunState, RunError>>>;

/// Owns a run's state and drives it through every stage.
///
/// Stages never touch the state directly: they return deltas, and the
/// coordinator applies each one and publishes a snapshot.
#[derive(Clone)]
pub struct Coordinator {
    analysts: BTreeMap<AnalystKind, Arc<dyn Analyst>>,
    research_debater: Arc<dyn TurnGenerator<ResearchRole>>,
    research_judge: Arc<dyn Adjudicator<ResearchRole>>,
    risk_debater: Arc<dyn TurnGenerator<RiskRole>>,
    risk_judge: Arc<dyn Adjudicator<RiskRole>>,
    synthesizer: Arc<Synthesizer>,
    memory: Option<Arc<dyn MemoryStore>>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    /// Analysts and debaters use `quick`; adjudicators and synthesis use `deep`.
    pub fn new(
        quick: Arc<dyn ReasoningClient>,
        deep: Arc<dyn ReasoningClient>,
        retry: RetryPolicy,
        settings: CoordinatorSettings,
    ) -> Self {
        let analysts = AnalystKind::ALL
            .iter()
            .map(|kind| {
                let analyst: Arc<dyn Analyst> =
                    Arc::new(LlmAnalyst::new(*kind, Arc::clone(&quick), retry.clone()));
                (*kind, analyst)
            })
            .collect();
        let debater = Arc::new(LlmDebater::new(Arc::clone(&quick), retry.clone()));
        let judge = Arc::new(LlmAdjudicator::new(Arc::clone(&deep), retry.clone()));

        Self {
            analysts,
            research_debater: debater.clone(),
            research_judge: judge.clone(),
            risk_debater: debater,
            risk_judge: judge,
            synthesizer: Arc::new(Synthesizer::new(deep, retry)),
            memory: None,
            settings,
        }
    }

    /// Replace the analyst for its slot.
    pub fn with_analyst(mut self, analyst: Arc<dyn Analyst>) -> Self {
        self.analysts.insert(analyst.kind(), analyst);
        self
    }

    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn with_research_debater(mut self, debater: Arc<dyn TurnGenerator<ResearchRole>>) -> Self {
        self.research_debater = debater;
        self
    }

    pub fn with_research_adjudicator(mut self, judge: Arc<dyn Adjudicator<ResearchRole>>) -> Self {
        self.research_judge = judge;
        self
    }

    pub fn with_risk_debater(mut self, debater: Arc<dyn TurnGenerator<RiskRole>>) -> Self {
        self.risk_debater = debater;
        self
    }

    pub fn with_risk_adjudicator(mut self, judge: Arc<dyn Adjudicator<RiskRole>>) -> Self {
        self.risk_judge = judge;
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Run to completion and return the concluded state.
    pub async fn run(&self, request: RunRequest) -> Result<RunState, RunError> {
        self.drive(request, None, &CancellationToken::new()).await
    }

    /// Run in the background, streaming a snapshot after every state change.
    pub fn start(&self, request: RunRequest) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let coordinator = self.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = coordinator.drive(request, Some(&tx), &token).await {
                let _ = tx.send(Err(e));
            }
        });

        RunHandle {
            updates: rx,
            cancel,
            task,
        }
    }

    /// Record the outcome of a finished run as a lesson for future recall.
    /// Returns `false` when no memory store is configured.
    pub async fn remember(&self, state: &RunState, lesson: &str) -> Result<bool, MemoryError> {
        let Some(store) = &self.memory else {
            return Ok(false);
        };
        store.record(&assemble_reports(state), lesson).await?;
        info!(subject = state.subject(), run_id = %state.run_id(), "Lesson recorded");
        Ok(true)
    }

    async fn drive(
        &self,
        request: RunRequest,
        updates: Updates<'_>,
        cancel: &CancellationToken,
    ) -> Result<RunState, RunError> {
        let request = request.validated()?;
        let started = Instant::now();
        let deadline = started + self.settings.run_timeout;
        let mut state = RunState::new(&request);
        info!(
            subject = %request.subject,
            date = %request.as_of_date,
            run_id = %state.run_id(),
            analysts = request.analysts.len(),
            "Starting run"
        );

        // 1. Reports (concurrent, barrier)
        self.gather_reports(&request, &mut state, deadline, cancel, updates)
            .await?;

        if !state.requested().is_empty() && state.reports().available_count() == 0 {
            let failures: Vec<(AnalystKind, String)> = state
                .unavailable()
                .iter()
                .map(|(k, reason)| (*k, reason.clone()))
                .collect();
            error!(subject = state.subject(), "Every requested analyst failed");
            return Err(RunError::NoDecision(NoDecisionReason::AllAnalystsFailed {
                failures,
            }));
        }

        // 2. Memory recall
        let recall = self.recall(&mut state, deadline, cancel, updates).await?;

        // 3. Research debate
        let research_ctx = DebateContext {
            subject: state.subject().to_string(),
            as_of_date: state.as_of_date(),
            material: assemble_reports(&state),
            recall: recall.text.clone(),
            deadline: Some(deadline),
        };
        run_debate(
            &mut state,
            RunState::research_debate,
            self.research_debater.as_ref(),
            self.research_judge.as_ref(),
            &research_ctx,
            cancel,
            updates,
        )
        .await?;

        // 4. Synthesis drafts the trade plan
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let timeout_secs = self.settings.run_timeout.as_secs();
        if Instant::now() >= deadline {
            return Err(RunError::Timeout(timeout_secs));
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            result = tokio::time::timeout_at(
                deadline,
                self.synthesizer.synthesize(&state, &recall, Some(deadline)),
            ) => result,
        };
        let synthesis = match result {
            Ok(Ok(synthesis)) => synthesis,
            Err(_) => return Err(RunError::Timeout(timeout_secs)),
            Ok(Err(_)) if Instant::now() >= deadline => return Err(RunError::Timeout(timeout_secs)),
            Ok(Err(e)) => {
                error!(subject = state.subject(), error = %e, "Synthesis failed");
                return Err(RunError::NoDecision(NoDecisionReason::SynthesisFailed(
                    e.to_string(),
                )));
            }
        };
        apply(
            &mut state,
            StateDelta::Synthesis {
                investment_plan: synthesis.investment_plan.clone(),
                full_text: synthesis.full_text.clone(),
            },
            updates,
        )?;

        // 5. Risk debate over the drafted plan
        let risk_ctx = DebateContext {
            material: risk_material(&state),
            ..research_ctx
        };
        run_debate(
            &mut state,
            RunState::risk_debate,
            self.risk_debater.as_ref(),
            self.risk_judge.as_ref(),
            &risk_ctx,
            cancel,
            updates,
        )
        .await?;

        // 6. Decision
        let (text, signal) = decide(state.risk_debate().verdict(), &synthesis);
        apply(&mut state, StateDelta::Decision { text, signal }, updates)?;

        info!(
            subject = state.subject(),
            run_id = %state.run_id(),
            signal = %signal.signal,
            method = ?signal.method,
            elapsed_ms = started.elapsed().as_millis(),
            "Run complete"
        );
        Ok(state)
    }

    async fn gather_reports(
        &self,
        request: &RunRequest,
        state: &mut RunState,
        deadline: Instant,
        cancel: &CancellationToken,
        updates: Updates<'_>,
    ) -> Result<(), RunError> {
        let mut tasks = JoinSet::new();
        for kind in state.requested().to_vec() {
            let Some(analyst) = self.analysts.get(&kind).cloned() else {
                apply(state, unavailable(kind, "no analyst registered"), updates)?;
                continue;
            };
            let request = request.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let result = analyst.produce(&request).await;
                (kind, result, started.elapsed())
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(RunError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(outstanding = tasks.len(), "Run deadline reached during reports");
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((kind, Ok(output), elapsed))) => {
                        info!(analyst = %kind, tools = output.tool_calls.len(), elapsed_ms = elapsed.as_millis(), "Analyst succeeded");
                        let outcome = if output.report.trim().is_empty() {
                            ReportOutcome::Unavailable("empty report".to_string())
                        } else {
                            ReportOutcome::Written(output.report)
                        };
                        apply(
                            state,
                            StateDelta::Report {
                                analyst: kind,
                                outcome,
                                tool_calls: output.tool_calls,
                            },
                            updates,
                        )?;
                    }
                    Some(Ok((kind, Err(e), elapsed))) => {
                        warn!(analyst = %kind, error = %e, elapsed_ms = elapsed.as_millis(), "Analyst failed");
                        apply(state, unavailable(kind, &e.to_string()), updates)?;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Analyst task panicked");
                    }
                },
            }
        }

        // Anything still unsettled panicked or was cut off at the deadline.
        let reason = if Instant::now() >= deadline {
            "timed out"
        } else {
            "analyst task failed"
        };
        for kind in state.requested().to_vec() {
            if state.reports().get(kind).is_none() && !state.unavailable().contains_key(&kind) {
                apply(state, unavailable(kind, reason), updates)?;
            }
        }
        Ok(())
    }

    async fn recall(
        &self,
        state: &mut RunState,
        deadline: Instant,
        cancel: &CancellationToken,
        updates: Updates<'_>,
    ) -> Result<Recall, RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let Some(store) = &self.memory else {
            return Ok(Recall::empty());
        };

        let situation = assemble_reports(state);
        let query = context::recall(store.as_ref(), &situation, self.settings.max_matches);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            result = tokio::time::timeout_at(deadline, query) => result,
        };
        let failure = match result {
            Ok(Ok(recall)) => return Ok(recall),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "memory query timed out".to_string(),
        };

        warn!(subject = state.subject(), error = %failure, "Memory unavailable, continuing without recall");
        apply(
            state,
            StateDelta::Note {
                stage: Stage::ResearchDebate,
                content: format!("memory unavailable: {failure}"),
            },
            updates,
        )?;
        Ok(Recall::empty())
    }
}

fn unavailable(kind: AnalystKind, reason: &str) -> StateDelta {
    StateDelta::Report {
        analyst: kind,
        outcome: ReportOutcome::Unavailable(reason.to_string()),
        tool_calls: Vec::new(),
    }
}

fn apply(state: &mut RunState, delta: StateDelta, updates: Updates<'_>) -> Result<(), RunError> {
    state.apply(delta)?;
    if let Some(tx) = updates {
        let _ = tx.send(Ok(state.clone()));
    }
    Ok(())
}

async fn run_debate<R>(
    state: &mut RunState,
    select: fn(&RunState) -> &DebateState<R>,
    generator: &dyn TurnGenerator<R>,
    adjudicator: &dyn Adjudicator<R>,
    ctx: &DebateContext,
    cancel: &CancellationToken,
    updates: Updates<'_>,
) -> Result<(), RunError>
where
    R: DebateRole,
    DebateDelta<R>: Into<StateDelta>,
{
    loop {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let debate = select(state);
        let early = debate.at_round_boundary()
            && debate.round() > 0
            && !debate.is_concluded()
            && adjudicator.early_stop(debate);
        let step = next_step(debate, early);

        let delta = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            delta = execute_step(step, debate, ctx, generator, adjudicator) => delta,
        };
        let Some(delta) = delta else {
            let debate = select(state);
            info!(
                subject = state.subject(),
                rounds = debate.round(),
                early = debate.concluded_early(),
                "Debate concluded"
            );
            return Ok(());
        };
        apply(state, delta.into(), updates)?;
    }
}

/// Handle to a run started with [`Coordinator::start`].
///
/// Yields `Ok(snapshot)` after every state change. The stream ends after the
/// concluded snapshot, or with a single `Err` when the run fails.
pub struct RunHandle {
    updates: mpsc::UnboundedReceiver<Result<RunState, RunError>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RunHandle {
    pub async fn next(&mut self) -> Option<Result<RunState, RunError>> {
        self.updates.recv().await
    }

    /// Request cancellation; the stream then ends with `RunError::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream and return the final outcome.
    pub async fn wait(mut self) -> Result<RunState, RunError> {
        let mut last = None;
        while let Some(update) = self.updates.recv().await {
            last = Some(update?);
        }

        if let Err(e) = self.task.await {
            return Err(RunError::Task(e.to_string()));
        }
        match last {
            Some(state) if state.is_concluded() => Ok(state),
            _ => Err(RunError::Task("run ended without a decision".to_string())),
        }
    }
}
