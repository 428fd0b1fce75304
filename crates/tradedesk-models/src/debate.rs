use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A participant in a bounded-round debate.
///
/// `ROTATION` is the fixed speaking order for one round; a round is complete
/// once every role in it has spoken exactly once.
pub trait DebateRole:
    Copy
    + Eq
    + Ord
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const ROTATION: &'static [Self];

    /// Machine label, used for prompts routing and log fields.
    fn label(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResearchRole {
    Advocate,
    Skeptic,
}

impl DebateRole for ResearchRole {
    const ROTATION: &'static [Self] = &[ResearchRole::Advocate, ResearchRole::Skeptic];

    fn label(self) -> &'static str {
        match self {
            ResearchRole::Advocate => "advocate",
            ResearchRole::Skeptic => "skeptic",
        }
    }
}

impl fmt::Display for ResearchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchRole::Advocate => f.write_str("Advocate"),
            ResearchRole::Skeptic => f.write_str("Skeptic"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskRole {
    Aggressive,
    Conservative,
    Neutral,
}

impl DebateRole for RiskRole {
    const ROTATION: &'static [Self] = &[
        RiskRole::Aggressive,
        RiskRole::Conservative,
        RiskRole::Neutral,
    ];

    fn label(self) -> &'static str {
        match self {
            RiskRole::Aggressive => "aggressive",
            RiskRole::Conservative => "conservative",
            RiskRole::Neutral => "neutral",
        }
    }
}

impl fmt::Display for RiskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskRole::Aggressive => f.write_str("Aggressive Analyst"),
            RiskRole::Conservative => f.write_str("Conservative Analyst"),
            RiskRole::Neutral => f.write_str("Neutral Analyst"),
        }
    }
}

/// A single change to a debate, produced by the debate protocol and merged
/// by the run coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[serde(bound = "")]
pub enum DebateDelta<R: DebateRole> {
    Turn {
        role: R,
        text: String,
        /// The turn is a placeholder standing in for a failed generation.
        degraded: bool,
    },
    RoundAdvanced,
    Verdict {
        text: String,
        early: bool,
        degraded: bool,
    },
}

/// State of one debate. Histories are append-only and the round counter is
/// monotonic; the verdict is written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound = "")]
pub struct DebateState<R: DebateRole> {
    histories: BTreeMap<R, String>,
    transcript: String,
    round: u32,
    round_limit: u32,
    turns_in_round: usize,
    last_speaker: Option<R>,
    verdict: Option<String>,
    concluded_early: bool,
}

pub type ResearchDebateState = DebateState<ResearchRole>;
pub type RiskDebateState = DebateState<RiskRole>;

impl<R: DebateRole> DebateState<R> {
    pub fn new(round_limit: u32) -> Self {
        Self {
            histories: R::ROTATION.iter().map(|r| (*r, String::new())).collect(),
            transcript: String::new(),
            round: 0,
            round_limit,
            turns_in_round: 0,
            last_speaker: None,
            verdict: None,
            concluded_early: false,
        }
    }

    pub fn history(&self, role: R) -> &str {
        self.histories.get(&role).map(String::as_str).unwrap_or("")
    }

    /// Histories in rotation order.
    pub fn histories(&self) -> impl Iterator<Item = (R, &str)> + '_ {
        R::ROTATION.iter().map(move |r| (*r, self.history(*r)))
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn round_limit(&self) -> u32 {
        self.round_limit
    }

    pub fn last_speaker(&self) -> Option<R> {
        self.last_speaker
    }

    pub fn verdict(&self) -> Option<&str> {
        self.verdict.as_deref()
    }

    pub fn is_concluded(&self) -> bool {
        self.verdict.is_some()
    }

    pub fn concluded_early(&self) -> bool {
        self.concluded_early
    }

    pub fn all_histories_empty(&self) -> bool {
        self.histories.values().all(|h| h.is_empty())
    }

    /// Role expected to speak next within the current round, or `None` when
    /// the rotation is complete and the round is waiting to be advanced.
    pub fn next_speaker(&self) -> Option<R> {
        R::ROTATION.get(self.turns_in_round).copied()
    }

    /// True between rounds: no turn of the current round has been taken yet.
    pub fn at_round_boundary(&self) -> bool {
        self.turns_in_round == 0
    }

    pub fn apply(&mut self, delta: &DebateDelta<R>) -> Result<(), StateError> {
        if self.is_concluded() {
            return Err(StateError::DebateConcluded);
        }

        match delta {
            DebateDelta::Turn { role, text, .. } => {
                if self.round >= self.round_limit {
                    return Err(StateError::RoundLimitReached(self.round_limit));
                }
                match self.next_speaker() {
                    Some(expected) if expected == *role => {}
                    Some(expected) => {
                        return Err(StateError::OutOfTurn {
                            expected: expected.label().to_string(),
                            got: role.label().to_string(),
                        })
                    }
                    None => {
                        return Err(StateError::OutOfTurn {
                            expected: "round advance".to_string(),
                            got: role.label().to_string(),
                        })
                    }
                }

                let entry = format!("{role}: {}", text.trim());
                let history = self.histories.entry(*role).or_default();
                append_line(history, &entry);
                append_line(&mut self.transcript, &entry);
                self.turns_in_round += 1;
                self.last_speaker = Some(*role);
            }
            DebateDelta::RoundAdvanced => {
                if self.turns_in_round != R::ROTATION.len() {
                    return Err(StateError::RoundNotComplete {
                        round: self.round,
                        reason: format!(
                            "{} of {} turns taken",
                            self.turns_in_round,
                            R::ROTATION.len()
                        ),
                    });
                }
                if self.round >= self.round_limit {
                    return Err(StateError::RoundLimitReached(self.round_limit));
                }
                self.round += 1;
                self.turns_in_round = 0;
            }
            DebateDelta::Verdict { text, early, .. } => {
                if !self.at_round_boundary() {
                    return Err(StateError::VerdictNotAllowed(
                        "a round is still in progress".to_string(),
                    ));
                }
                if self.round < self.round_limit && !early {
                    return Err(StateError::VerdictNotAllowed(format!(
                        "round {} of {} without early stop",
                        self.round, self.round_limit
                    )));
                }
                self.concluded_early = *early && self.round < self.round_limit;
                self.verdict = Some(text.clone());
            }
        }

        Ok(())
    }
}

fn append_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn<R: DebateRole>(role: R, text: &str) -> DebateDelta<R> {
        DebateDelta::Turn {
            role,
            text: text.to_string(),
            degraded: false,
        }
    }

    fn verdict<R: DebateRole>(text: &str, early: bool) -> DebateDelta<R> {
        DebateDelta::Verdict {
            text: text.to_string(),
            early,
            degraded: false,
        }
    }

    #[test]
    fn full_research_round() {
        let mut state = ResearchDebateState::new(1);
        state.apply(&turn(ResearchRole::Advocate, "Growth is strong")).unwrap();
        state.apply(&turn(ResearchRole::Skeptic, "Valuation is stretched")).unwrap();
        state.apply(&DebateDelta::RoundAdvanced).unwrap();
        state.apply(&verdict("Lean bullish", false)).unwrap();

        assert_eq!(state.round(), 1);
        assert_eq!(state.history(ResearchRole::Advocate), "Advocate: Growth is strong");
        assert_eq!(state.last_speaker(), Some(ResearchRole::Skeptic));
        assert_eq!(
            state.transcript(),
            "Advocate: Growth is strong\nSkeptic: Valuation is stretched"
        );
        assert!(state.is_concluded());
        assert!(!state.concluded_early());
    }

    #[test]
    fn histories_are_newline_joined() {
        let mut state = ResearchDebateState::new(2);
        for text in ["one", "two"] {
            state.apply(&turn(ResearchRole::Advocate, text)).unwrap();
            state.apply(&turn(ResearchRole::Skeptic, text)).unwrap();
            state.apply(&DebateDelta::RoundAdvanced).unwrap();
        }
        assert_eq!(
            state.history(ResearchRole::Skeptic),
            "Skeptic: one\nSkeptic: two"
        );
    }

    #[test]
    fn turn_out_of_rotation_rejected() {
        let mut state = ResearchDebateState::new(1);
        let err = state.apply(&turn(ResearchRole::Skeptic, "first")).unwrap_err();
        assert!(matches!(err, StateError::OutOfTurn { .. }));
        assert!(state.all_histories_empty());
    }

    #[test]
    fn risk_round_needs_three_turns() {
        let mut state = RiskDebateState::new(1);
        state.apply(&turn(RiskRole::Aggressive, "go big")).unwrap();
        state.apply(&turn(RiskRole::Conservative, "stay small")).unwrap();
        assert!(matches!(
            state.apply(&DebateDelta::RoundAdvanced),
            Err(StateError::RoundNotComplete { .. })
        ));
        state.apply(&turn(RiskRole::Neutral, "split it")).unwrap();
        state.apply(&DebateDelta::RoundAdvanced).unwrap();
        assert_eq!(state.round(), 1);
        assert_eq!(state.next_speaker(), Some(RiskRole::Aggressive));
    }

    #[test]
    fn round_never_exceeds_limit() {
        let mut state = ResearchDebateState::new(1);
        state.apply(&turn(ResearchRole::Advocate, "a")).unwrap();
        state.apply(&turn(ResearchRole::Skeptic, "b")).unwrap();
        state.apply(&DebateDelta::RoundAdvanced).unwrap();
        assert_eq!(
            state.apply(&turn(ResearchRole::Advocate, "c")),
            Err(StateError::RoundLimitReached(1))
        );
    }

    #[test]
    fn verdict_requires_limit_or_early_stop() {
        let mut state = ResearchDebateState::new(2);
        state.apply(&turn(ResearchRole::Advocate, "a")).unwrap();
        state.apply(&turn(ResearchRole::Skeptic, "b")).unwrap();
        state.apply(&DebateDelta::RoundAdvanced).unwrap();
        assert!(matches!(
            state.apply(&verdict("too soon", false)),
            Err(StateError::VerdictNotAllowed(_))
        ));
        state.apply(&verdict("settled early", true)).unwrap();
        assert!(state.concluded_early());
        assert_eq!(state.round(), 1);
    }

    #[test]
    fn verdict_set_exactly_once() {
        let mut state = RiskDebateState::new(0);
        state.apply(&verdict("insufficient information", false)).unwrap();
        assert_eq!(
            state.apply(&verdict("again", false)),
            Err(StateError::DebateConcluded)
        );
        assert_eq!(state.verdict(), Some("insufficient information"));
    }

    #[test]
    fn zero_limit_allows_immediate_verdict() {
        let mut state = ResearchDebateState::new(0);
        assert!(state.all_histories_empty());
        assert_eq!(
            state.apply(&turn(ResearchRole::Advocate, "x")),
            Err(StateError::RoundLimitReached(0))
        );
        state.apply(&verdict("insufficient information", false)).unwrap();
        assert_eq!(state.round(), 0);
    }

    #[test]
    fn debate_state_serializes_roles_as_keys() {
        let mut state = RiskDebateState::new(1);
        state.apply(&turn(RiskRole::Aggressive, "go")).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["histories"]["aggressive"], "Aggressive Analyst: go");
        assert_eq!(json["last_speaker"], "aggressive");

        let back: RiskDebateState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
