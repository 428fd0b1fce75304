use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analyst::AnalystKind;
use crate::config::MAX_ROUND_LIMIT;
use crate::error::ConfigError;

/// Input to a single run: what to analyze, as of when, and how much to debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    pub subject: String,
    pub as_of_date: NaiveDate,
    pub analysts: Vec<AnalystKind>,
    pub max_debate_rounds: u32,
    pub max_risk_rounds: u32,
}

impl RunRequest {
    /// Validate and normalize (upper-case the subject). Called before any stage runs.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.subject = normalize_subject(&self.subject)?;
        check_round_limit("max_debate_rounds", self.max_debate_rounds)?;
        check_round_limit("max_risk_rounds", self.max_risk_rounds)?;
        self.analysts.sort();
        self.analysts.dedup();
        Ok(self)
    }
}

/// Ticker-style subject: 1-10 ASCII letters, '.' or '-'.
pub fn normalize_subject(subject: &str) -> Result<String, ConfigError> {
    let upper = subject.trim().to_ascii_uppercase();
    let valid = (1..=10).contains(&upper.len())
        && upper
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '.' || c == '-');
    if valid {
        Ok(upper)
    } else {
        Err(ConfigError::InvalidSubject(subject.to_string()))
    }
}

pub(crate) fn check_round_limit(name: &'static str, value: u32) -> Result<(), ConfigError> {
    if value > MAX_ROUND_LIMIT {
        return Err(ConfigError::RoundLimit {
            name,
            value,
            max: MAX_ROUND_LIMIT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subject: &str, rounds: u32) -> RunRequest {
        RunRequest {
            subject: subject.to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            analysts: vec![AnalystKind::News, AnalystKind::Market, AnalystKind::News],
            max_debate_rounds: rounds,
            max_risk_rounds: 1,
        }
    }

    #[test]
    fn subject_is_normalized() {
        let req = request(" brk.b ", 1).validated().unwrap();
        assert_eq!(req.subject, "BRK.B");
        assert_eq!(req.analysts, vec![AnalystKind::Market, AnalystKind::News]);
    }

    #[test]
    fn invalid_subjects_rejected() {
        for bad in ["", "AAPL1", "TOOLONGTICKER", "A PL"] {
            assert!(
                matches!(
                    request(bad, 1).validated(),
                    Err(ConfigError::InvalidSubject(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn round_limit_capped() {
        let err = request("AAPL", MAX_ROUND_LIMIT + 1).validated().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RoundLimit {
                name: "max_debate_rounds",
                ..
            }
        ));
        assert!(request("AAPL", 0).validated().is_ok());
    }
}
