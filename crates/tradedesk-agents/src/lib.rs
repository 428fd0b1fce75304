pub mod analyst;
pub mod claude_cli;
pub mod client;
pub mod context;
pub mod coordinator;
pub mod debate;
pub mod error;
pub mod gemini;
pub mod parser;
pub mod prompts;
pub mod retry;
pub mod synthesis;

pub mod test_support;

pub use analyst::{Analyst, AnalystOutput, DataTool, LlmAnalyst, SnapshotTool};
pub use claude_cli::ClaudeCliClient;
pub use client::{Prompt, ReasoningClient};
pub use context::{Recall, NO_PRIOR_MATCHES};
pub use coordinator::{Coordinator, CoordinatorSettings, RunHandle};
pub use debate::{Adjudicator, DebateStep, TurnGenerator};
pub use error::{AgentError, NoDecisionReason, RunError};
pub use gemini::GeminiClient;
pub use retry::RetryPolicy;
pub use synthesis::{SynthesisOutput, Synthesizer};
