//! Outbound calls to the hosted completion API
//!
//! Exactly one attempt is made per relay request. The whole exchange, body
//! included, is bounded by a wall-clock timeout; when it fires the in-flight
//! request future is dropped and the late answer is never read.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Value, json};

use crate::chat::ChatMessage;
use crate::config::{ApiKey, RelayConfig};
use crate::params::GenerationParams;

/// Body posted to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Self {
        Self {
            model: params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The provider answered with a non-success status.
    #[error("provider returned status {status}")]
    Status { status: u16, body: Value },
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A hosted chat-completion API.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends one completion request and returns the provider's JSON payload.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Value, UpstreamError>;
}

/// [`CompletionProvider`] speaking the OpenAI-style chat completions protocol
/// over HTTPS with a bearer credential.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: ApiKey,
    timeout: Duration,
}

impl HttpCompletionProvider {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        api_key: ApiKey,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.upstream_url.clone(), config.api_key.clone(), config.upstream_timeout)
    }

    async fn exchange(
        &self,
        request: &CompletionRequest,
    ) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains("json"));
            let text = response.text().await.map_err(|e| self.classify(&e))?;

            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: error_body(&text, is_json),
            });
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                UpstreamError::InvalidResponse(e.to_string())
            } else {
                self.classify(&e)
            }
        })?;

        if !payload.is_object() {
            return Err(UpstreamError::InvalidResponse("expected a JSON object".to_string()));
        }

        Ok(payload)
    }

    fn classify(
        &self,
        error: &reqwest::Error,
    ) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Unreachable(error.to_string())
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Value, UpstreamError> {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => tracing::debug!(elapsed_ms, model = %request.model, "Upstream call succeeded"),
            Err(e) => tracing::debug!(elapsed_ms, model = %request.model, error = %e, "Upstream call failed"),
        }

        result
    }
}

/// Parses an error body as JSON when the provider says it is JSON, otherwise
/// wraps the raw text in a `message` field.
fn error_body(
    text: &str,
    is_json: bool,
) -> Value {
    if is_json && let Ok(value) = serde_json::from_str(text) {
        return value;
    }
    json!({ "message": text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;

    #[test]
    fn test_error_body_json() {
        let body = error_body(r#"{"message":"Unauthorized","type":"invalid_api_key"}"#, true);
        assert_eq!(body["type"], "invalid_api_key");
    }

    #[test]
    fn test_error_body_text() {
        let body = error_body("Bad Gateway", false);
        assert_eq!(body, json!({ "message": "Bad Gateway" }));
    }

    #[test]
    fn test_error_body_mislabelled_json() {
        let body = error_body("<html>oops</html>", true);
        assert_eq!(body, json!({ "message": "<html>oops</html>" }));
    }

    #[test]
    fn test_completion_request_wire_shape() {
        let request = CompletionRequest::new(
            vec![ChatMessage {
                role: ChatRole::User,
                content: "Oi".to_string(),
            }],
            GenerationParams {
                model: "mistral-large-latest".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
            },
        );

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "mistral-large-latest",
                "messages": [{ "role": "user", "content": "Oi" }],
                "temperature": 0.7,
                "max_tokens": 1000
            })
        );
    }
}
