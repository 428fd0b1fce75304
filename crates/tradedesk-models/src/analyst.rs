use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four report producers that feed a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalystKind {
    Market,
    #[serde(alias = "social")]
    Sentiment,
    News,
    Fundamentals,
}

impl AnalystKind {
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Market,
        AnalystKind::Sentiment,
        AnalystKind::News,
        AnalystKind::Fundamentals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalystKind::Market => "market",
            AnalystKind::Sentiment => "sentiment",
            AnalystKind::News => "news",
            AnalystKind::Fundamentals => "fundamentals",
        }
    }

    /// Heading used when the report is laid out in a shared context.
    pub fn report_title(self) -> &'static str {
        match self {
            AnalystKind::Market => "Market Research Report",
            AnalystKind::Sentiment => "Social Media Sentiment Report",
            AnalystKind::News => "Latest News Report",
            AnalystKind::Fundamentals => "Company Fundamentals Report",
        }
    }
}

impl fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAnalyst(pub String);

impl fmt::Display for UnknownAnalyst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown analyst '{}' (expected market, sentiment, news or fundamentals)",
            self.0
        )
    }
}

impl std::error::Error for UnknownAnalyst {}

impl FromStr for AnalystKind {
    type Err = UnknownAnalyst;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(AnalystKind::Market),
            "sentiment" | "social" => Ok(AnalystKind::Sentiment),
            "news" => Ok(AnalystKind::News),
            "fundamentals" => Ok(AnalystKind::Fundamentals),
            other => Err(UnknownAnalyst(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_social_alias() {
        assert_eq!("social".parse::<AnalystKind>().unwrap(), AnalystKind::Sentiment);
        assert_eq!(" News ".parse::<AnalystKind>().unwrap(), AnalystKind::News);
        assert!("macro".parse::<AnalystKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_and_alias() {
        let kinds: Vec<AnalystKind> =
            serde_json::from_str(r#"["market", "social", "fundamentals"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                AnalystKind::Market,
                AnalystKind::Sentiment,
                AnalystKind::Fundamentals
            ]
        );
        assert_eq!(
            serde_json::to_string(&AnalystKind::Sentiment).unwrap(),
            "\"sentiment\""
        );
    }
}
