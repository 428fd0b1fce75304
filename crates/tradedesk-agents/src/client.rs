use async_trait::async_trait;

use crate::error::AgentError;

/// One generation request. `role` names the pipeline step issuing it and is
/// used for logging and by test doubles.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub role: String,
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(role: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Text-generation backend. Mockable for testing.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, AgentError>;
}
