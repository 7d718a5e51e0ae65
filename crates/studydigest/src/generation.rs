//! Chat-completions client for the generation service.
//!
//! Requests go to `{url}/v1/chat/completions` as
//! `{model, messages, max_tokens, temperature, stream: false}` and the
//! reply is read from `choices[0].message.content`. Generation calls are
//! not retried: a timeout or error status is reported to the pipeline,
//! which decides on a fallback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use studydigest_core::error::GenerationError;
use studydigest_core::generation::{GenerationClient, GenerationRequest};

use crate::config::GenerationConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct DisabledGeneration;

#[async_trait]
impl GenerationClient for DisabledGeneration {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

pub struct ChatCompletions {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

impl ChatCompletions {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required"))?;
        // A custom endpoint (local server, proxy) may not need a key.
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => Some(key),
            Err(_) if config.url.is_some() => None,
            Err(_) => return Err(anyhow!("OPENAI_API_KEY not set")),
        };
        let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key,
            model,
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        })
    }

    fn service_error(message: impl Into<String>) -> GenerationError {
        GenerationError::Service {
            provider: "openai".to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl GenerationClient for ChatCompletions {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt_chars(),
            "generation request"
        );

        let mut http = self.client.post(&self.endpoint).json(&self.request_body(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                Self::service_error(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::service_error(format!("{}: {}", status, body_text)));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                GenerationError::Malformed(e.to_string())
            }
        })?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &serde_json::Value) -> Result<String, GenerationError> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| GenerationError::Malformed("missing 'choices'".to_string()))?;

    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::Malformed("missing 'message.content'".to_string()))
}

/// Build the client selected by `generation.provider`.
pub fn create_client(config: &GenerationConfig) -> Result<Arc<dyn GenerationClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGeneration)),
        "openai" => Ok(Arc::new(ChatCompletions::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studydigest_core::generation::Message;

    #[test]
    fn test_parse_completion() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "A summary."}}]
        });
        assert_eq!(parse_completion(&json).unwrap(), "A summary.");
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let err = parse_completion(&serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn test_parse_completion_without_content() {
        let json = serde_json::json!({"choices": [{"finish_reason": "length"}]});
        assert!(matches!(
            parse_completion(&json).unwrap_err(),
            GenerationError::Malformed(_)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let config = GenerationConfig {
            provider: "openai".to_string(),
            model: Some("small-chat".to_string()),
            url: Some("http://127.0.0.1:9/".to_string()),
            ..GenerationConfig::default()
        };
        let client = ChatCompletions::new(&config).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:9/v1/chat/completions");

        let request = GenerationRequest {
            messages: vec![Message::system("be brief"), Message::user("hi")],
            max_tokens: 300,
            temperature: 0.3,
        };
        let body = client.request_body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_disabled_generation_fails() {
        let client = create_client(&GenerationConfig::default()).unwrap();
        let request = GenerationRequest {
            messages: vec![Message::user("hi")],
            max_tokens: 256,
            temperature: 0.0,
        };
        assert!(matches!(
            client.generate(&request).await.unwrap_err(),
            GenerationError::Disabled
        ));
    }
}
