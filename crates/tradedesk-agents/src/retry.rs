use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;
use tradedesk_models::ReasoningConfig;

use crate::client::{Prompt, ReasoningClient};
use crate::error::AgentError;

/// Per-call timeout plus bounded retries with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReasoningConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ReasoningConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
            call_timeout: Duration::from_secs(config.call_timeout_seconds),
        }
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }

    /// Call `client` until it succeeds, fails fatally, or retries run out.
    ///
    /// With a `deadline`, each attempt is cut short at the deadline and no
    /// retry is started whose backoff would cross it.
    pub async fn generate(
        &self,
        client: &dyn ReasoningClient,
        prompt: &Prompt,
        deadline: Option<Instant>,
    ) -> Result<String, AgentError> {
        let mut retry = 0;
        loop {
            let budget = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(AgentError::Timeout(0));
                    }
                    remaining.min(self.call_timeout)
                }
                None => self.call_timeout,
            };

            let err = match tokio::time::timeout(budget, client.generate(prompt)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e,
                Err(_) => AgentError::Timeout(budget.as_secs()),
            };

            if !err.is_retryable() || retry >= self.max_retries {
                return Err(err);
            }

            let delay = self.backoff(retry);
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                return Err(err);
            }

            retry += 1;
            warn!(
                role = %prompt.role,
                model = client.model(),
                retry,
                max_retries = self.max_retries,
                error = %err,
                "Generation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
