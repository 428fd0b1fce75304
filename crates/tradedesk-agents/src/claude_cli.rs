use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::client::{Prompt, ReasoningClient};
use crate::error::AgentError;

const CLAUDE_BIN: &str = "claude";

/// Reasoning client that shells out to the `claude` CLI in print mode.
///
/// The per-call timeout lives in [`crate::retry::RetryPolicy`]; the child is
/// killed when the call future is dropped.
#[derive(Debug, Clone)]
pub struct ClaudeCliClient {
    model: String,
    binary: String,
}

impl ClaudeCliClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            binary: CLAUDE_BIN.to_string(),
        }
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl ReasoningClient for ClaudeCliClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, AgentError> {
        debug!(model = %self.model, role = %prompt.role, "Invoking claude CLI");

        let output = Command::new(&self.binary)
            .args([
                "-p",
                &prompt.user,
                "--system-prompt",
                &prompt.system,
                "--model",
                &self.model,
                "--output-format",
                "text",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AgentError::Fatal(format!("Failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, role = %prompt.role, stderr = %stderr, "Claude CLI failed");
            return Err(AgentError::Transient(format!(
                "{} exited {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(AgentError::Transient(
                "Claude returned empty response".to_string(),
            ));
        }

        Ok(stdout)
    }
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new(CLAUDE_BIN).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_fatal() {
        let client = ClaudeCliClient::new("claude-3-5-haiku-latest")
            .with_binary("tradedesk-no-such-binary-7f3a");
        let err = client
            .generate(&Prompt::new("test", "system", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Fatal(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn model_is_reported() {
        let client = ClaudeCliClient::new("claude-sonnet-4-5-20250929");
        assert_eq!(client.model(), "claude-sonnet-4-5-20250929");
        assert_eq!(client.binary, "claude");
    }
}
