use chrono::NaiveDate;
use tokio::time::Instant;
use tracing::debug;
use tradedesk_memory::{MemoryError, MemoryStore};
use tradedesk_models::{AnalystKind, MemoryMode, MemoryRecord, RunState, NOT_AVAILABLE};

/// Recall text when memory has nothing relevant or is unreachable.
pub const NO_PRIOR_MATCHES: &str = "No past memories found.";

/// Shared, read-only context handed to every participant of one debate.
#[derive(Debug, Clone)]
pub struct DebateContext {
    pub subject: String,
    pub as_of_date: NaiveDate,
    /// What is being debated: the reports, and for the risk debate the plan.
    pub material: String,
    pub recall: String,
    /// Calls still running at this instant degrade to placeholders.
    pub deadline: Option<Instant>,
}

/// All four report slots, in a fixed order, with markers for missing ones.
pub fn assemble_reports(state: &RunState) -> String {
    AnalystKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "### {}\n{}",
                kind.report_title(),
                state.reports().get_or_marker(*kind)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Material for the risk debate: the drafted plan, the research verdict and the reports.
pub fn risk_material(state: &RunState) -> String {
    format!(
        "### Trader's Plan\n{}\n\n### Research Verdict\n{}\n\n{}",
        state.trade_plan().unwrap_or(NOT_AVAILABLE),
        state.research_debate().verdict().unwrap_or(NOT_AVAILABLE),
        assemble_reports(state)
    )
}

/// Memory matches for the current situation, rendered once for every consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Recall {
    pub records: Vec<MemoryRecord>,
    pub text: String,
    pub mode: Option<MemoryMode>,
}

impl Recall {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            text: NO_PRIOR_MATCHES.to_string(),
            mode: None,
        }
    }

    /// Lexical matches with a zero score share no terms with the situation
    /// and are dropped; similarity matches are kept as ranked.
    pub fn from_records(records: Vec<MemoryRecord>, mode: MemoryMode) -> Self {
        let records: Vec<MemoryRecord> = match mode {
            MemoryMode::Lexical => records
                .into_iter()
                .filter(|r| !r.similarity.is_zero())
                .collect(),
            MemoryMode::Similarity => records,
        };

        let text = if records.is_empty() {
            NO_PRIOR_MATCHES.to_string()
        } else {
            records
                .iter()
                .enumerate()
                .map(|(i, r)| format!("Memory {}: {}", i + 1, r.recommendation))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        Self {
            records,
            text,
            mode: Some(mode),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub async fn recall(
    store: &dyn MemoryStore,
    situation: &str,
    n: usize,
) -> Result<Recall, MemoryError> {
    let mode = store.mode();
    let records = store.query(situation, n).await?;
    debug!(matches = records.len(), ?mode, "Memory recall");
    Ok(Recall::from_records(records, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradedesk_memory::SqliteMemoryStore;
    use tradedesk_models::{ReportOutcome, RunRequest, StateDelta};

    fn state() -> RunState {
        let request = RunRequest {
            subject: "AAPL".into(),
            as_of_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            analysts: vec![AnalystKind::Market, AnalystKind::News],
            max_debate_rounds: 1,
            max_risk_rounds: 1,
        };
        let mut state = RunState::new(&request);
        state
            .apply(StateDelta::Report {
                analyst: AnalystKind::Market,
                outcome: ReportOutcome::Written("Price above 50-day average.".into()),
                tool_calls: vec![],
            })
            .unwrap();
        state
    }

    #[test]
    fn missing_reports_get_markers() {
        let text = assemble_reports(&state());
        assert!(text.starts_with("### Market Research Report\nPrice above 50-day average."));
        assert!(text.contains(&format!("### Latest News Report\n{NOT_AVAILABLE}")));
        assert!(text.contains(&format!("### Social Media Sentiment Report\n{NOT_AVAILABLE}")));
        assert!(text.contains(&format!("### Company Fundamentals Report\n{NOT_AVAILABLE}")));
    }

    #[test]
    fn risk_material_without_plan() {
        let text = risk_material(&state());
        assert!(text.starts_with(&format!("### Trader's Plan\n{NOT_AVAILABLE}")));
    }

    #[test]
    fn lexical_zero_scores_are_dropped() {
        let records = vec![
            MemoryRecord::new("a".into(), "trim".into(), 0.4),
            MemoryRecord::new("b".into(), "ignore".into(), 0.0),
        ];
        let recall = Recall::from_records(records.clone(), MemoryMode::Lexical);
        assert_eq!(recall.records.len(), 1);
        assert_eq!(recall.text, "Memory 1: trim");

        let recall = Recall::from_records(records, MemoryMode::Similarity);
        assert_eq!(recall.records.len(), 2);
        assert_eq!(recall.text, "Memory 1: trim\n\nMemory 2: ignore");
    }

    #[tokio::test]
    async fn empty_store_recalls_marker() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let recall = recall(&store, "anything", 5).await.unwrap();
        assert!(recall.is_empty());
        assert_eq!(recall.text, NO_PRIOR_MATCHES);
        assert_eq!(recall.mode, Some(MemoryMode::Lexical));
    }
}
