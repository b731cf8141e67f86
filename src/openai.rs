//! OpenAI-compatible chat completions backend.
//!
//! Works with any server exposing `POST {base_url}/chat/completions`.
//! HTTP outcomes are classified for the retry layer:
//!
//! | Outcome | [`GenerationError`] |
//! |---------|---------------------|
//! | 429 | `RateLimited` |
//! | 408, 5xx, connect or timeout failure | `Transient` |
//! | other 4xx, unparseable or empty body | `Fatal` |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::generate::{Completion, GenerationError};
use crate::{Error, Result};

/// A [`Completion`] backend that sends each prompt as one user message.
#[derive(Clone)]
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl fmt::Debug for OpenAiCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompletion")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompletion {
    /// Create a backend from endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("precis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> GenerationError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited
    } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
        GenerationError::Transient(format!("server returned {status}"))
    } else {
        GenerationError::Fatal(format!("request rejected ({status}): {body}"))
    }
}

impl Completion for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transient(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transient(e.to_string()))?;

        if !status.is_success() {
            tracing::error!("completion request failed {status}: {text}");
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Fatal(format!("unparseable response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GenerationError::Fatal("response contained no completion".into()))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn backend(server: &MockServer) -> OpenAiCompletion {
        let config = LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        };
        OpenAiCompletion::new("sk-test", &config).unwrap()
    }

    #[tokio::test]
    async fn test_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "a summary"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = backend(&server).await.complete("summarize this").await.unwrap();
        assert_eq!(out, "a summary");
    }

    #[tokio::test]
    async fn test_status_classification() {
        for (status, expected_retryable) in [(429, true), (503, true), (400, false), (401, false)] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = backend(&server).await.complete("x").await.unwrap_err();
            assert_eq!(err.is_retryable(), expected_retryable, "status {status}");
            if status == 429 {
                assert_eq!(err, GenerationError::RateLimited);
            }
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Fatal(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let backend = OpenAiCompletion::new("sk-secret", &LlmConfig::default()).unwrap();
        let debug = format!("{backend:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
