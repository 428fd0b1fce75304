use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyst::AnalystKind;
use crate::debate::{
    DebateDelta, DebateRole, ResearchDebateState, ResearchRole, RiskDebateState, RiskRole,
};
use crate::decision::{DecisionStatus, ExtractedSignal};
use crate::error::StateError;
use crate::request::RunRequest;

/// Marker substituted for any report that was not requested or could not be produced.
pub const NOT_AVAILABLE: &str = "Not available.";

/// Pipeline stage, used to tag log messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reports,
    ResearchDebate,
    Synthesis,
    RiskDebate,
    Decision,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Reports => "reports",
            Stage::ResearchDebate => "research_debate",
            Stage::Synthesis => "synthesis",
            Stage::RiskDebate => "risk_debate",
            Stage::Decision => "decision",
        };
        f.write_str(s)
    }
}

/// One entry of the run's audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMessage {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub sender: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
    /// The entry records a degradation (failure absorbed into placeholder state).
    #[serde(default)]
    pub degraded: bool,
}

/// The four analyst report slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalystReports {
    pub market: Option<String>,
    pub sentiment: Option<String>,
    pub news: Option<String>,
    pub fundamentals: Option<String>,
}

impl AnalystReports {
    pub fn get(&self, kind: AnalystKind) -> Option<&str> {
        match kind {
            AnalystKind::Market => self.market.as_deref(),
            AnalystKind::Sentiment => self.sentiment.as_deref(),
            AnalystKind::News => self.news.as_deref(),
            AnalystKind::Fundamentals => self.fundamentals.as_deref(),
        }
    }

    /// The report text, or [`NOT_AVAILABLE`].
    pub fn get_or_marker(&self, kind: AnalystKind) -> &str {
        self.get(kind).unwrap_or(NOT_AVAILABLE)
    }

    pub fn available_count(&self) -> usize {
        AnalystKind::ALL
            .iter()
            .filter(|k| self.get(**k).is_some())
            .count()
    }

    fn slot_mut(&mut self, kind: AnalystKind) -> &mut Option<String> {
        match kind {
            AnalystKind::Market => &mut self.market,
            AnalystKind::Sentiment => &mut self.sentiment,
            AnalystKind::News => &mut self.news,
            AnalystKind::Fundamentals => &mut self.fundamentals,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum ReportOutcome {
    Written(String),
    /// The analyst failed or was cancelled; carries the reason.
    Unavailable(String),
}

/// A change to a run, produced by a stage and merged by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum StateDelta {
    Report {
        analyst: AnalystKind,
        outcome: ReportOutcome,
        tool_calls: Vec<String>,
    },
    Research(DebateDelta<ResearchRole>),
    Risk(DebateDelta<RiskRole>),
    Note {
        stage: Stage,
        content: String,
    },
    Synthesis {
        investment_plan: String,
        full_text: String,
    },
    Decision {
        text: String,
        signal: ExtractedSignal,
    },
}

impl From<DebateDelta<ResearchRole>> for StateDelta {
    fn from(delta: DebateDelta<ResearchRole>) -> Self {
        StateDelta::Research(delta)
    }
}

impl From<DebateDelta<RiskRole>> for StateDelta {
    fn from(delta: DebateDelta<RiskRole>) -> Self {
        StateDelta::Risk(delta)
    }
}

/// Everything known about one (subject, as-of date) run.
///
/// Mutated only through [`RunState::apply`]; once the decision is applied the
/// state is concluded and every further delta is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    run_id: Uuid,
    subject: String,
    as_of_date: NaiveDate,
    requested: Vec<AnalystKind>,
    reports: AnalystReports,
    #[serde(default)]
    unavailable: BTreeMap<AnalystKind, String>,
    research_debate: ResearchDebateState,
    risk_debate: RiskDebateState,
    trade_plan: Option<String>,
    synthesis: Option<String>,
    final_decision: Option<String>,
    signal: Option<ExtractedSignal>,
    messages: Vec<RunMessage>,
    concluded: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(request: &RunRequest) -> Self {
        let now = Utc::now();
        let mut requested = request.analysts.clone();
        requested.sort();
        requested.dedup();

        Self {
            run_id: Uuid::new_v4(),
            subject: request.subject.clone(),
            as_of_date: request.as_of_date,
            requested,
            reports: AnalystReports::default(),
            unavailable: BTreeMap::new(),
            research_debate: ResearchDebateState::new(request.max_debate_rounds),
            risk_debate: RiskDebateState::new(request.max_risk_rounds),
            trade_plan: None,
            synthesis: None,
            final_decision: None,
            signal: None,
            messages: Vec::new(),
            concluded: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn requested(&self) -> &[AnalystKind] {
        &self.requested
    }

    pub fn reports(&self) -> &AnalystReports {
        &self.reports
    }

    /// Failure reasons for requested analysts that produced no report.
    pub fn unavailable(&self) -> &BTreeMap<AnalystKind, String> {
        &self.unavailable
    }

    /// True once every requested analyst has either reported or been marked unavailable.
    pub fn reports_settled(&self) -> bool {
        self.requested
            .iter()
            .all(|k| self.reports.get(*k).is_some() || self.unavailable.contains_key(k))
    }

    pub fn research_debate(&self) -> &ResearchDebateState {
        &self.research_debate
    }

    pub fn risk_debate(&self) -> &RiskDebateState {
        &self.risk_debate
    }

    pub fn trade_plan(&self) -> Option<&str> {
        self.trade_plan.as_deref()
    }

    pub fn synthesis(&self) -> Option<&str> {
        self.synthesis.as_deref()
    }

    pub fn final_decision(&self) -> Option<&str> {
        self.final_decision.as_deref()
    }

    pub fn signal(&self) -> Option<ExtractedSignal> {
        self.signal
    }

    pub fn messages(&self) -> &[RunMessage] {
        &self.messages
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn decision_status(&self) -> DecisionStatus {
        match (self.concluded, self.signal) {
            (true, Some(extracted)) if extracted.signal.is_determined() => {
                DecisionStatus::Decided(extracted.signal)
            }
            (true, _) => DecisionStatus::Uncertain,
            (false, _) => DecisionStatus::Pending,
        }
    }

    /// Merge one delta. Each accepted delta appends exactly one log message.
    pub fn apply(&mut self, delta: StateDelta) -> Result<(), StateError> {
        if self.concluded {
            return Err(StateError::Concluded);
        }

        let message = match delta {
            StateDelta::Report {
                analyst,
                outcome,
                tool_calls,
            } => self.apply_report(analyst, outcome, tool_calls)?,
            StateDelta::Research(delta) => {
                if !self.reports_settled() {
                    return Err(StateError::StageOrder(
                        "research debate started before all reports settled".to_string(),
                    ));
                }
                self.research_debate.apply(&delta)?;
                debate_message(Stage::ResearchDebate, "research_manager", &delta)
            }
            StateDelta::Risk(delta) => {
                if self.trade_plan.is_none() {
                    return Err(StateError::StageOrder(
                        "risk debate started before a trade plan was drafted".to_string(),
                    ));
                }
                self.risk_debate.apply(&delta)?;
                debate_message(Stage::RiskDebate, "portfolio_manager", &delta)
            }
            StateDelta::Note { stage, content } => RunMessage {
                at: Utc::now(),
                stage,
                sender: "coordinator".to_string(),
                content,
                tool_calls: Vec::new(),
                degraded: true,
            },
            StateDelta::Synthesis {
                investment_plan,
                full_text,
            } => {
                if !self.research_debate.is_concluded() {
                    return Err(StateError::StageOrder(
                        "synthesis before research verdict".to_string(),
                    ));
                }
                if self.synthesis.is_some() {
                    return Err(StateError::StageOrder("synthesis already applied".to_string()));
                }
                self.trade_plan = Some(investment_plan);
                self.synthesis = Some(full_text.clone());
                RunMessage {
                    at: Utc::now(),
                    stage: Stage::Synthesis,
                    sender: "synthesizer".to_string(),
                    content: full_text,
                    tool_calls: Vec::new(),
                    degraded: false,
                }
            }
            StateDelta::Decision { text, signal } => {
                if !self.risk_debate.is_concluded() {
                    return Err(StateError::StageOrder(
                        "decision before risk verdict".to_string(),
                    ));
                }
                self.final_decision = Some(text.clone());
                self.signal = Some(signal);
                self.concluded = true;
                RunMessage {
                    at: Utc::now(),
                    stage: Stage::Decision,
                    sender: "decision".to_string(),
                    content: format!("{} ({:?})", signal.signal, signal.method),
                    tool_calls: Vec::new(),
                    degraded: !signal.signal.is_determined(),
                }
            }
        };

        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn apply_report(
        &mut self,
        analyst: AnalystKind,
        outcome: ReportOutcome,
        tool_calls: Vec<String>,
    ) -> Result<RunMessage, StateError> {
        if !self.requested.contains(&analyst) {
            return Err(StateError::NotRequested(analyst));
        }
        if self.reports.get(analyst).is_some() || self.unavailable.contains_key(&analyst) {
            return Err(StateError::AlreadyReported(analyst));
        }

        let (content, degraded) = match outcome {
            ReportOutcome::Written(text) => {
                *self.reports.slot_mut(analyst) = Some(text.clone());
                (text, false)
            }
            ReportOutcome::Unavailable(reason) => {
                self.unavailable.insert(analyst, reason.clone());
                (format!("{NOT_AVAILABLE} {reason}"), true)
            }
        };

        Ok(RunMessage {
            at: Utc::now(),
            stage: Stage::Reports,
            sender: format!("{analyst}_analyst"),
            content,
            tool_calls,
            degraded,
        })
    }
}

fn debate_message<R: DebateRole>(stage: Stage, judge: &str, delta: &DebateDelta<R>) -> RunMessage {
    let (sender, content, degraded) = match delta {
        DebateDelta::Turn {
            role,
            text,
            degraded,
        } => (role.label().to_string(), text.clone(), *degraded),
        DebateDelta::RoundAdvanced => ("coordinator".to_string(), "round advanced".to_string(), false),
        DebateDelta::Verdict { text, degraded, .. } => (judge.to_string(), text.clone(), *degraded),
    };

    RunMessage {
        at: Utc::now(),
        stage,
        sender,
        content,
        tool_calls: Vec::new(),
        degraded,
    }
}
