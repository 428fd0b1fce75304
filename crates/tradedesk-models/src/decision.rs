use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete outcome of a final decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionSignal {
    Buy,
    Sell,
    Hold,
    /// No action token could be extracted; needs manual review.
    Undetermined,
}

impl ActionSignal {
    /// The three tokens recognised in generated text, case-sensitive.
    pub const TOKENS: [(&'static str, ActionSignal); 3] = [
        ("BUY", ActionSignal::Buy),
        ("SELL", ActionSignal::Sell),
        ("HOLD", ActionSignal::Hold),
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        Self::TOKENS
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, signal)| *signal)
    }

    pub fn is_determined(self) -> bool {
        !matches!(self, ActionSignal::Undetermined)
    }
}

impl fmt::Display for ActionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSignal::Buy => f.write_str("BUY"),
            ActionSignal::Sell => f.write_str("SELL"),
            ActionSignal::Hold => f.write_str("HOLD"),
            ActionSignal::Undetermined => f.write_str("UNDETERMINED"),
        }
    }
}

/// How a signal was obtained from generated text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Found inside the exact final-decision marker section.
    Marker,
    /// Marker missing or empty; found by scanning the whole text.
    Scan,
    /// Nothing unambiguous found.
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedSignal {
    pub signal: ActionSignal,
    pub method: ExtractionMethod,
}

impl ExtractedSignal {
    pub fn undetermined() -> Self {
        Self {
            signal: ActionSignal::Undetermined,
            method: ExtractionMethod::None,
        }
    }

    /// True when the signal came from a fallback path and deserves review.
    pub fn is_fallback(&self) -> bool {
        self.method != ExtractionMethod::Marker
    }
}

/// Where a run stands with respect to its final decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "signal", rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Decided(ActionSignal),
    /// A decision text exists but no action could be extracted.
    Uncertain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_case_sensitive() {
        assert_eq!(ActionSignal::from_token("SELL"), Some(ActionSignal::Sell));
        assert_eq!(ActionSignal::from_token("sell"), None);
        assert_eq!(ActionSignal::from_token("UNDETERMINED"), None);
    }

    #[test]
    fn signal_display_and_serde_agree() {
        for signal in [
            ActionSignal::Buy,
            ActionSignal::Sell,
            ActionSignal::Hold,
            ActionSignal::Undetermined,
        ] {
            let json = serde_json::to_string(&signal).unwrap();
            assert_eq!(json, format!("\"{signal}\""));
        }
    }

    #[test]
    fn fallback_flag() {
        let marker = ExtractedSignal {
            signal: ActionSignal::Buy,
            method: ExtractionMethod::Marker,
        };
        assert!(!marker.is_fallback());
        assert!(ExtractedSignal::undetermined().is_fallback());
    }
}
