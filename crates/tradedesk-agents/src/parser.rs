//! Section and action-signal extraction from generated text.
//!
//! Marker matching is exact and case-sensitive. Action tokens must be whole
//! words; a token that is part of an enumeration of tokens ("BUY/SELL/HOLD",
//! "BUY, SELL, or HOLD") is ambiguous and skipped.

use tradedesk_models::{ActionSignal, ExtractedSignal, ExtractionMethod};

pub const BULLISH_MARKER: &str = "**BULLISH ANALYSIS:**";
pub const BEARISH_MARKER: &str = "**BEARISH ANALYSIS:**";
pub const RISK_MARKER: &str = "**RISK ASSESSMENT:**";
pub const PLAN_MARKER: &str = "**INVESTMENT PLAN:**";
pub const FINAL_DECISION_MARKER: &str = "**FINAL DECISION:**";
pub const RATIONALE_MARKER: &str = "**RATIONALE:**";

pub const MARKERS: [&str; 6] = [
    BULLISH_MARKER,
    BEARISH_MARKER,
    RISK_MARKER,
    PLAN_MARKER,
    FINAL_DECISION_MARKER,
    RATIONALE_MARKER,
];

/// Text following `marker` up to the next known marker, trimmed.
/// `None` when the marker is absent or the section is empty.
pub fn section<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = MARKERS
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    let body = rest[..end].trim();
    (!body.is_empty()).then_some(body)
}

/// The marker section when the marker is present, otherwise the whole text.
///
/// A present marker whose section holds no unambiguous token is
/// undetermined; the other sections argue one side and are not consulted.
pub fn extract_signal(text: &str) -> ExtractedSignal {
    if text.contains(FINAL_DECISION_MARKER) {
        return match section(text, FINAL_DECISION_MARKER).and_then(first_unambiguous_token) {
            Some(signal) => ExtractedSignal {
                signal,
                method: ExtractionMethod::Marker,
            },
            None => ExtractedSignal::undetermined(),
        };
    }
    match first_unambiguous_token(text) {
        Some(signal) => ExtractedSignal {
            signal,
            method: ExtractionMethod::Scan,
        },
        None => ExtractedSignal::undetermined(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lexeme<'a> {
    Word(&'a str),
    /// Enumeration separator: `/`, `|` or `,`.
    Sep,
    Other,
}

impl Lexeme<'_> {
    fn token(self) -> Option<ActionSignal> {
        match self {
            Lexeme::Word(w) => ActionSignal::from_token(w),
            _ => None,
        }
    }

    fn joins(self) -> bool {
        match self {
            Lexeme::Sep => true,
            Lexeme::Word(w) => w.eq_ignore_ascii_case("or"),
            Lexeme::Other => false,
        }
    }
}

fn lex(text: &str) -> Vec<Lexeme<'_>> {
    let mut out = Vec::new();
    let mut word_start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if ch.is_alphanumeric() || ch == '_' {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            out.push(Lexeme::Word(&text[start..i]));
        }
        match ch {
            '/' | '|' | ',' => out.push(Lexeme::Sep),
            c if c.is_whitespace() => {}
            _ => out.push(Lexeme::Other),
        }
    }
    if let Some(start) = word_start {
        out.push(Lexeme::Word(&text[start..]));
    }
    out
}

/// True when the joiners next to `from`, read in one direction, lead to
/// another action token.
fn joined_to_token(lexemes: &[Lexeme<'_>], from: usize, forward: bool) -> bool {
    let mut i = from;
    let mut joiners = 0;
    loop {
        let next = if forward {
            i.checked_add(1).filter(|n| *n < lexemes.len())
        } else {
            i.checked_sub(1)
        };
        let Some(n) = next else {
            return false;
        };
        let lexeme = lexemes[n];
        if lexeme.joins() {
            joiners += 1;
            i = n;
            continue;
        }
        return joiners > 0 && lexeme.token().is_some();
    }
}

/// First BUY/SELL/HOLD that is a whole word and not part of an enumeration.
pub fn first_unambiguous_token(text: &str) -> Option<ActionSignal> {
    let lexemes = lex(text);
    lexemes.iter().enumerate().find_map(|(i, lexeme)| {
        let signal = lexeme.token()?;
        let ambiguous = joined_to_token(&lexemes, i, true) || joined_to_token(&lexemes, i, false);
        (!ambiguous).then_some(signal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_section_wins() {
        let text = "**BULLISH ANALYSIS:** I would BUY on strength.\n\
                    **FINAL DECISION:** SELL\n**RATIONALE:** margins compress.";
        assert_eq!(
            extract_signal(text),
            ExtractedSignal {
                signal: ActionSignal::Sell,
                method: ExtractionMethod::Marker,
            }
        );
    }

    #[test]
    fn falls_back_to_scan_without_marker() {
        let text = "After weighing both sides we HOLD the position.";
        assert_eq!(
            extract_signal(text),
            ExtractedSignal {
                signal: ActionSignal::Hold,
                method: ExtractionMethod::Scan,
            }
        );
    }

    #[test]
    fn enumerations_are_ambiguous() {
        assert_eq!(first_unambiguous_token("BUY/SELL/HOLD"), None);
        assert_eq!(first_unambiguous_token("choose BUY | SELL"), None);
        assert_eq!(first_unambiguous_token("one of BUY, SELL, or HOLD"), None);
        assert_eq!(first_unambiguous_token("BUY or SELL"), None);
        assert_eq!(
            first_unambiguous_token("Options: BUY/SELL/HOLD. We HOLD."),
            Some(ActionSignal::Hold)
        );
    }

    #[test]
    fn comma_before_prose_is_not_ambiguous() {
        assert_eq!(
            first_unambiguous_token("HOLD, given the valuation"),
            Some(ActionSignal::Hold)
        );
    }

    #[test]
    fn case_sensitive_whole_words() {
        assert_eq!(first_unambiguous_token("we should buy"), None);
        assert_eq!(first_unambiguous_token("BUYBACK announced"), None);
        assert_eq!(first_unambiguous_token("**BUY**"), Some(ActionSignal::Buy));
    }

    #[test]
    fn ambiguous_marker_section_is_undetermined() {
        let text = "**BULLISH ANALYSIS:** Bulls would BUY on any dip.\n\
                    **BEARISH ANALYSIS:** Bears would SELL into strength.\n\
                    **FINAL DECISION:** Based on comprehensive analysis, my recommendation is: **BUY/SELL/HOLD**\n\
                    **RATIONALE:** unclear.";
        assert_eq!(extract_signal(text), ExtractedSignal::undetermined());
    }

    #[test]
    fn empty_marker_section_is_undetermined() {
        let text = "We lean SELL overall.\n**FINAL DECISION:**\n**RATIONALE:** none given.";
        assert_eq!(extract_signal(text), ExtractedSignal::undetermined());
    }

    #[test]
    fn whole_text_scanned_only_without_marker() {
        let extracted = extract_signal("We lean SELL overall.");
        assert_eq!(extracted.signal, ActionSignal::Sell);
        assert_eq!(extracted.method, ExtractionMethod::Scan);
    }

    #[test]
    fn nothing_is_undetermined() {
        assert_eq!(
            extract_signal("No clear view today."),
            ExtractedSignal::undetermined()
        );
        assert_eq!(extract_signal(""), ExtractedSignal::undetermined());
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "**FINAL DECISION:** HOLD\n**RATIONALE:** wait for earnings.";
        assert_eq!(extract_signal(text), extract_signal(text));
    }

    #[test]
    fn section_bounds() {
        let text = "**INVESTMENT PLAN:** Scale in over two weeks.\n**FINAL DECISION:** BUY";
        assert_eq!(section(text, PLAN_MARKER), Some("Scale in over two weeks."));
        assert_eq!(section(text, FINAL_DECISION_MARKER), Some("BUY"));
        assert_eq!(section(text, RATIONALE_MARKER), None);
        assert_eq!(section("**RATIONALE:**   ", RATIONALE_MARKER), None);
    }

    #[test]
    fn marker_is_case_sensitive() {
        let text = "**final decision:** BUY/SELL and nothing else";
        assert_eq!(section(text, FINAL_DECISION_MARKER), None);
        assert_eq!(extract_signal(text), ExtractedSignal::undetermined());
    }
}
