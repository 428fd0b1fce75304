use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// How a memory store ranks matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// Cosine similarity over embeddings.
    Similarity,
    /// Term-overlap scoring used when no embedder is configured.
    Lexical,
}

/// A ranked match from the memory store. Never persisted by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub matched_situation: String,
    pub recommendation: String,
    /// 0.0 to 1.0, higher is closer.
    pub similarity: Decimal,
}

impl MemoryRecord {
    pub fn new(matched_situation: String, recommendation: String, score: f64) -> Self {
        Self {
            matched_situation,
            recommendation,
            similarity: similarity_from_f64(score),
        }
    }
}

/// Clamp a raw score into [0, 1] and round to four places.
pub fn similarity_from_f64(score: f64) -> Decimal {
    let clamped = if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Decimal::from_f64_retain(clamped)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven)
}
