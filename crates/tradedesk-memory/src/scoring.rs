use std::collections::HashMap;

/// Cosine similarity of two embeddings, clamped to [0, 1].
/// Mismatched or zero-length vectors score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Term-frequency cosine over lower-cased word tokens.
pub fn lexical(a: &str, b: &str) -> f64 {
    let ta = term_frequencies(a);
    let tb = term_frequencies(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let dot: f64 = ta
        .iter()
        .filter_map(|(term, x)| tb.get(term).map(|y| x * y))
        .sum();
    let norm_a: f64 = ta.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = tb.values().map(|y| y * y).sum::<f64>().sqrt();

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut terms = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}
