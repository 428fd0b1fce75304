use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};
use tradedesk_models::{ExtractedSignal, RunState, NOT_AVAILABLE};

use crate::client::ReasoningClient;
use crate::context::{assemble_reports, Recall};
use crate::debate::is_placeholder_verdict;
use crate::error::AgentError;
use crate::parser::{extract_signal, section, FINAL_DECISION_MARKER, PLAN_MARKER};
use crate::prompts::synthesis_prompt;
use crate::retry::RetryPolicy;

/// Parsed synthesis answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    pub full_text: String,
    /// The INVESTMENT PLAN section, or the whole text when it is missing.
    pub investment_plan: String,
    pub final_decision_section: Option<String>,
    pub signal: ExtractedSignal,
}

impl SynthesisOutput {
    pub fn from_text(full_text: String) -> Self {
        let investment_plan = section(&full_text, PLAN_MARKER)
            .unwrap_or(full_text.trim())
            .to_string();
        let final_decision_section = section(&full_text, FINAL_DECISION_MARKER).map(str::to_string);
        let signal = extract_signal(&full_text);
        Self {
            full_text,
            investment_plan,
            final_decision_section,
            signal,
        }
    }
}

/// Drafts the trade plan from reports, the research verdict and recall.
pub struct Synthesizer {
    client: Arc<dyn ReasoningClient>,
    retry: RetryPolicy,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn ReasoningClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn synthesize(
        &self,
        state: &RunState,
        recall: &Recall,
        deadline: Option<Instant>,
    ) -> Result<SynthesisOutput, AgentError> {
        let prompt = synthesis_prompt(
            state.subject(),
            state.as_of_date(),
            &assemble_reports(state),
            state.research_debate().verdict().unwrap_or(NOT_AVAILABLE),
            &recall.text,
        );
        let text = self
            .retry
            .generate(self.client.as_ref(), &prompt, deadline)
            .await?;
        if text.trim().is_empty() {
            return Err(AgentError::Fatal("synthesis returned no text".to_string()));
        }

        let output = SynthesisOutput::from_text(text);
        info!(
            subject = state.subject(),
            signal = %output.signal.signal,
            method = ?output.signal.method,
            "Synthesis drafted"
        );
        Ok(output)
    }
}

/// The final decision text and signal.
///
/// A substantive portfolio-manager verdict with a determined signal wins;
/// otherwise the synthesis final-decision section is used. When neither
/// determines a signal the result is undetermined and needs manual review.
pub fn decide(pm_verdict: Option<&str>, synthesis: &SynthesisOutput) -> (String, ExtractedSignal) {
    if let Some(verdict) = pm_verdict.filter(|v| !v.trim().is_empty() && !is_placeholder_verdict(v)) {
        let extracted = extract_signal(verdict);
        if extracted.signal.is_determined() {
            return (verdict.to_string(), extracted);
        }
    }

    let text = synthesis
        .final_decision_section
        .clone()
        .unwrap_or_else(|| synthesis.full_text.clone());
    if !synthesis.signal.signal.is_determined() {
        warn!("No action signal could be extracted, flagging for manual review");
    }
    (text, synthesis.signal)
}
