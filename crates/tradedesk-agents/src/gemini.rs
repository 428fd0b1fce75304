use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{Prompt, ReasoningClient};
use crate::error::AgentError;

/// Reasoning client for the Gemini `generateContent` API.
///
/// Connection-pooled; one instance per model.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| AgentError::Fatal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// 429 and 5xx are worth retrying; any other non-success status is not.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> AgentError {
    let message = format!("Gemini returned {status}: {}", body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AgentError::Transient(message)
    } else {
        AgentError::Fatal(message)
    }
}

fn response_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, AgentError> {
        if self.api_key.is_empty() {
            return Err(AgentError::Fatal("Gemini API key not configured".to_string()));
        }
        debug!(model = %self.model, role = %prompt.role, "Calling Gemini API");

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &prompt.system,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &prompt.user }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Transient(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, role = %prompt.role, "Gemini API error response");
            return Err(classify_status(status, &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transient(format!("Gemini parse error: {e}")))?;

        response_text(parsed)
            .ok_or_else(|| AgentError::Transient("Empty response from Gemini".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad").is_retryable());
        assert!(!classify_status(StatusCode::FORBIDDEN, "").is_retryable());
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new(
            "https://generativelanguage.googleapis.com/v1beta/",
            "gemini-2.0-flash",
            "key",
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn joins_candidate_parts() {
        let parsed: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "HOLD "}, {"text": "for now"}]}}]
        }))
        .unwrap();
        assert_eq!(response_text(parsed).as_deref(), Some("HOLD for now"));

        let empty: GenerateResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(response_text(empty), None);
    }

    #[tokio::test]
    async fn missing_key_is_fatal() {
        let client = GeminiClient::new("http://localhost:1", "gemini-2.0-flash", "").unwrap();
        let err = client
            .generate(&Prompt::new("test", "s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Fatal(_)));
    }
}
