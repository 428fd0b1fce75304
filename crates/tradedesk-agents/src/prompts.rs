use chrono::NaiveDate;
use tradedesk_models::{AnalystKind, DebateRole, DebateState, ResearchRole, RiskRole};

use crate::client::Prompt;
use crate::context::DebateContext;
use crate::parser::{
    BEARISH_MARKER, BULLISH_MARKER, FINAL_DECISION_MARKER, PLAN_MARKER, RATIONALE_MARKER,
    RISK_MARKER,
};

pub const SYNTHESIS_ROLE: &str = "synthesis";

/// Prompt text for the participants and judge of one debate.
pub trait DebatePersona: DebateRole {
    /// Prompt role of the adjudicator.
    const JUDGE: &'static str;
    const JUDGE_BRIEF: &'static str;

    fn brief(self) -> &'static str;
}

impl DebatePersona for ResearchRole {
    const JUDGE: &'static str = "research_manager";
    const JUDGE_BRIEF: &'static str =
        "You are the research manager and debate facilitator. Critically weigh the advocate's \
         and the skeptic's arguments and commit to a clear stance: BUY, SELL, or HOLD only when \
         strongly justified. Do not default to HOLD because both sides have valid points. \
         Then lay out a concrete investment plan: your recommendation, the rationale, and the \
         strategic actions to implement it. Learn from the past mistakes listed below.";

    fn brief(self) -> &'static str {
        match self {
            ResearchRole::Advocate => {
                "You are the advocate. Build a strong, evidence-based case for investing: growth \
                 potential, competitive advantages, positive indicators. Counter the skeptic's \
                 points directly with specific data and sound reasoning. Speak conversationally \
                 and engage with the debate, do not merely list facts."
            }
            ResearchRole::Skeptic => {
                "You are the skeptic. Make a well-reasoned case against investing: risks, \
                 competitive weaknesses, negative indicators. Expose over-optimistic assumptions \
                 in the advocate's argument with specific data and sound reasoning. Speak \
                 conversationally and engage with the debate."
            }
        }
    }
}

impl DebatePersona for RiskRole {
    const JUDGE: &'static str = "portfolio_manager";
    const JUDGE_BRIEF: &'static str =
        "You are the portfolio manager and risk-debate judge. Evaluate the aggressive, \
         conservative and neutral analysts and refine the trader's plan. Your answer must \
         contain **FINAL DECISION:** followed by exactly one of BUY, SELL or HOLD, then \
         **RATIONALE:** with the reasoning grounded in the debate. Use the lessons from past \
         situations below to avoid repeating mistakes.";

    fn brief(self) -> &'static str {
        match self {
            RiskRole::Aggressive => {
                "You are the aggressive risk analyst. Champion high-reward opportunities and \
                 bold strategies. Rebut the conservative and neutral views where they are too \
                 cautious, with data-driven counterpoints."
            }
            RiskRole::Conservative => {
                "You are the conservative risk analyst. Protect assets, minimize volatility and \
                 favour steady growth. Point out where the aggressive and neutral views \
                 overlook threats to the firm."
            }
            RiskRole::Neutral => {
                "You are the neutral risk analyst. Weigh both upside and downside, challenge \
                 both the aggressive and conservative views where they are one-sided, and \
                 argue for a balanced, sustainable strategy."
            }
        }
    }
}

fn analyst_brief(kind: AnalystKind) -> &'static str {
    match kind {
        AnalystKind::Market => {
            "You are a market analyst. Study recent price action and a complementary set of \
             technical indicators (moving averages, MACD, RSI, Bollinger bands, ATR, volume). \
             Explain what each indicator says about trend and momentum; avoid redundant ones."
        }
        AnalystKind::Sentiment => {
            "You are a social media and sentiment analyst. Analyze public posts and daily \
             sentiment about the company over the past week and what it implies for traders."
        }
        AnalystKind::News => {
            "You are a news researcher. Report on company news and the macroeconomic and \
             global events of the past week that are relevant for trading this subject."
        }
        AnalystKind::Fundamentals => {
            "You are a fundamentals researcher. Analyze financial statements, company profile, \
             financial history and insider sentiment and transactions over the past week."
        }
    }
}

/// Data fetched for an analyst before its generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolData {
    pub tool: String,
    /// Fetched text, or the reason it could not be fetched.
    pub content: Result<String, String>,
}

pub fn analyst_prompt(
    kind: AnalystKind,
    subject: &str,
    as_of_date: NaiveDate,
    tool_data: &[ToolData],
) -> Prompt {
    let system = format!(
        "{}\n\nWrite a detailed, nuanced report; do not just say trends are mixed. Append a \
         Markdown table at the end that organizes the key points. For reference, the current \
         date is {as_of_date}. The company we want to look at is {subject}.",
        analyst_brief(kind)
    );

    let mut user = format!("Produce the {} for {subject} as of {as_of_date}.", kind.report_title());
    if !tool_data.is_empty() {
        user.push_str("\n\n## DATA\n");
        for data in tool_data {
            match &data.content {
                Ok(text) => user.push_str(&format!("\n### {}\n{}\n", data.tool, text.trim())),
                Err(reason) => user.push_str(&format!(
                    "\n### {}\n(unavailable: {reason})\n",
                    data.tool
                )),
            }
        }
    }

    Prompt::new(format!("{kind}_analyst"), system, user)
}

fn transcript_or_placeholder(transcript: &str) -> &str {
    if transcript.is_empty() {
        "(no arguments yet)"
    } else {
        transcript
    }
}

/// The most recent turn in a role's history, without its speaker prefix.
/// Turns may span several lines; each one starts with `"{role}: "`.
fn last_turn<'a, R: DebateRole>(role: R, history: &'a str) -> Option<&'a str> {
    let prefix = format!("{role}: ");
    let start = history
        .rfind(&format!("\n{prefix}"))
        .map_or(0, |i| i + 1);
    let turn = &history[start..];
    (!turn.is_empty()).then(|| turn.strip_prefix(prefix.as_str()).unwrap_or(turn))
}

pub fn debater_prompt<R: DebatePersona>(
    role: R,
    state: &DebateState<R>,
    ctx: &DebateContext,
) -> Prompt {
    let others: Vec<String> = state
        .histories()
        .filter(|(r, _)| *r != role)
        .map(|(r, history)| {
            let last = last_turn(r, history).unwrap_or("(has not spoken yet)");
            format!("Last argument from {r}: {last}")
        })
        .collect();

    let user = format!(
        "Subject: {} as of {}.\n\n{}\n\nReflections from similar past situations:\n{}\n\n\
         Conversation history of the debate:\n{}\n\n{}\n\n\
         Respond to the latest arguments and make your case.",
        ctx.subject,
        ctx.as_of_date,
        ctx.material,
        ctx.recall,
        transcript_or_placeholder(state.transcript()),
        others.join("\n"),
    );

    Prompt::new(role.label(), role.brief(), user)
}

pub fn adjudicator_prompt<R: DebatePersona>(state: &DebateState<R>, ctx: &DebateContext) -> Prompt {
    let user = format!(
        "Subject: {} as of {}.\n\n{}\n\nPast reflections on mistakes:\n{}\n\n\
         Debate history:\n{}",
        ctx.subject,
        ctx.as_of_date,
        ctx.material,
        ctx.recall,
        transcript_or_placeholder(state.transcript()),
    );

    Prompt::new(R::JUDGE, R::JUDGE_BRIEF, user)
}

pub fn synthesis_prompt(
    subject: &str,
    as_of_date: NaiveDate,
    reports: &str,
    research_verdict: &str,
    recall: &str,
) -> Prompt {
    let system = format!(
        "You are a trading agent synthesizing all analyst reports, the research debate and \
         lessons from past situations into one recommendation. Structure the answer in exactly \
         these sections, in order:\n\
         {BULLISH_MARKER} the strongest case for the position\n\
         {BEARISH_MARKER} the strongest case against it\n\
         {RISK_MARKER} the key risks and how to size for them\n\
         {PLAN_MARKER} a concrete trade plan\n\
         {FINAL_DECISION_MARKER} exactly one of BUY, SELL or HOLD\n\
         {RATIONALE_MARKER} why, in a few sentences"
    );

    let user = format!(
        "Subject: {subject} as of {as_of_date}.\n\n{reports}\n\n\
         Research manager's verdict and plan:\n{research_verdict}\n\n\
         Reflections from similar past situations:\n{recall}"
    );

    Prompt::new(SYNTHESIS_ROLE, system, user)
}
