//! Completion backend for OpenAI-compatible chat APIs

use super::{BackendError, CompletionBackend};
use crate::config::ServerSettings;
use crate::context::models::{Message, ModelTarget};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Endpoint and credentials for one provider
#[derive(Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Backend posting to `{base_url}/chat/completions` of the target provider
pub struct OpenAiCompatibleBackend {
    client: Client,
    endpoints: HashMap<String, ProviderEndpoint>,
    max_retries: usize,
}

impl OpenAiCompatibleBackend {
    /// Create a backend; `timeout` bounds every request
    pub fn new(
        endpoints: HashMap<String, ProviderEndpoint>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            max_retries,
        })
    }

    /// Build from server settings, reading API keys from the environment
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, BackendError> {
        let endpoints = settings
            .providers
            .iter()
            .map(|(name, provider)| {
                let mut endpoint = ProviderEndpoint::new(provider.base_url.clone());
                if let Some(var) = &provider.api_key_env {
                    match std::env::var(var) {
                        Ok(key) => endpoint = endpoint.with_api_key(key),
                        Err(_) => warn!("API key variable {} for provider {} is not set", var, name),
                    }
                }
                (name.clone(), endpoint)
            })
            .collect();

        Self::new(endpoints, settings.request_timeout(), settings.max_retries)
    }

    async fn send_once(
        &self,
        endpoint: &ProviderEndpoint,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<String, BackendError> {
        let mut req = self.client.post(endpoint.completions_url()).json(request);
        if let Some(api_key) = &endpoint.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::NetworkError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| BackendError::ApiError(format!("Failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::ApiError("No choices in response".to_string()))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    async fn complete(&self, target: &ModelTarget, messages: &[Message]) -> Result<String, BackendError> {
        let endpoint = self
            .endpoints
            .get(&target.provider)
            .ok_or_else(|| BackendError::UnknownProvider(target.provider.clone()))?;

        let request = ChatCompletionRequest {
            model: &target.model,
            messages,
            stream: false,
        };

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, target);
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            match self.send_once(endpoint, &request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    debug!("Completion attempt {} against {} failed: {}", attempt + 1, target, e);
                    last_error = Some(e);
                }
            }
        }

        warn!("Completion against {} failed after {} attempts", target, self.max_retries + 1);
        Err(last_error.unwrap_or_else(|| BackendError::ApiError("no attempts made".to_string())))
    }
}

/// Exponential backoff starting at 200ms, capped at 6.4s
fn backoff_delay(attempt: usize) -> Duration {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT) as u32;
    Duration::from_millis(100u64.saturating_mul(1u64 << exponent))
}

const MAX_BACKOFF_EXPONENT: usize = 6;

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_for(url: &str, retries: usize) -> OpenAiCompatibleBackend {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "local".to_string(),
            ProviderEndpoint::new(url).with_api_key("sk-test"),
        );
        OpenAiCompatibleBackend::new(endpoints, Duration::from_secs(5), retries).unwrap()
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"A summary."}}]}"#)
            .create_async()
            .await;

        let backend = backend_for(&format!("{}/v1", server.url()), 0);
        let target = ModelTarget::new("local", "qwen2.5:7b");
        let text = backend
            .complete(&target, &[Message::user("hello")])
            .await
            .unwrap();

        assert_eq!(text, "A summary.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_retries_then_fails() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), 1);
        let target = ModelTarget::new("local", "m");
        let result = backend.complete(&target, &[Message::user("hello")]).await;

        assert!(matches!(result, Err(BackendError::ApiError(_))));
        mock.assert_async().await;
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(3), Duration::from_millis(800));
        assert_eq!(backoff_delay(6), Duration::from_millis(6400));
        assert_eq!(backoff_delay(64), Duration::from_millis(6400));
        assert_eq!(backoff_delay(usize::MAX), Duration::from_millis(6400));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let backend = backend_for("http://127.0.0.1:9", 0);
        let target = ModelTarget::new("elsewhere", "m");
        let result = backend.complete(&target, &[]).await;
        assert!(matches!(result, Err(BackendError::UnknownProvider(_))));
    }
}
