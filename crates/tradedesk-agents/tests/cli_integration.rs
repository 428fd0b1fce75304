//! Integration tests that invoke the real Claude CLI.
//!
//! These tests are `#[ignore]` by default. They require:
//! - The `claude` CLI installed and on PATH
//! - Valid Anthropic credentials configured
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p tradedesk-agents --test cli_integration -- --ignored
//! ```

use tradedesk_agents::claude_cli::check_cli_available;
use tradedesk_agents::parser::extract_signal;
use tradedesk_agents::{ClaudeCliClient, Prompt, ReasoningClient};
use tradedesk_models::{ActionSignal, ExtractionMethod};

const MODEL: &str = "claude-3-5-haiku-latest";

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available().await,
        "claude CLI not found on PATH, install it from https://docs.anthropic.com/en/docs/claude-code"
    );
}

/// The marker format the synthesis and portfolio manager rely on must survive
/// a real round trip through the CLI's text output.
#[tokio::test]
#[ignore]
async fn cli_output_carries_decision_marker() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let client = ClaudeCliClient::new(MODEL);
    let prompt = Prompt::new(
        "portfolio_manager",
        "You are a test agent. Reply with exactly two lines and nothing else:\n\
         **FINAL DECISION:** SELL\n\
         **RATIONALE:** test",
        "Give your decision.",
    );

    let raw = client.generate(&prompt).await.expect("Claude CLI invocation failed");
    let extracted = extract_signal(&raw);
    assert_eq!(
        extracted.signal,
        ActionSignal::Sell,
        "Unexpected CLI output:\n---\n{raw}\n---"
    );
    assert_eq!(extracted.method, ExtractionMethod::Marker);
}

/// A bad model name must surface as an error, not an empty report.
#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let client = ClaudeCliClient::new("nonexistent-model-12345");
    let result = client
        .generate(&Prompt::new("test", "You are a test.", "hello"))
        .await;

    assert!(result.is_err(), "Expected error for invalid model, got: {result:?}");
}
