//! Embedding service clients.
//!
//! | Provider | Endpoint | Request | Response |
//! |----------|----------|---------|----------|
//! | `openai` | `{url}/v1/embeddings` | `{model, input}` | `data[].embedding` |
//! | `ollama` | `{url}/api/embed` | `{model, input}` | `embeddings` |
//! | `http` | `{url}` | `{model, texts}` | `embeddings` |
//! | `disabled` | none | | every call fails with [`EmbeddingError::Disabled`] |
//!
//! Each call is one request. [`create_embedder`] caps requests at
//! `embedding.batch_size` texts through the core [`Embedder`], so a failed
//! request only degrades its own texts. Requests are retried with
//! exponential backoff (1s, 2s, 4s, … capped at 32s) on network errors,
//! HTTP 429 and 5xx; other 4xx statuses fail immediately.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use studydigest_core::embedding::{Embedder, EmbeddingClient};
use studydigest_core::error::EmbeddingError;

use crate::config::EmbeddingConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct DisabledEmbedding {
    dims: usize,
}

impl DisabledEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingClient for DisabledEmbedding {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    OpenAi,
    Ollama,
    Http,
}

impl Protocol {
    fn name(&self) -> &'static str {
        match self {
            Protocol::OpenAi => "openai",
            Protocol::Ollama => "ollama",
            Protocol::Http => "http",
        }
    }
}

/// Remote embedding service reached over HTTP.
pub struct HttpEmbedding {
    protocol: Protocol,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpEmbedding {
    fn new(protocol: Protocol, config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required"))?;

        let (endpoint, api_key) = match protocol {
            Protocol::OpenAi => {
                let key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
                let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);
                (format!("{}/v1/embeddings", base.trim_end_matches('/')), Some(key))
            }
            Protocol::Ollama => {
                let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);
                (format!("{}/api/embed", base.trim_end_matches('/')), None)
            }
            Protocol::Http => {
                let url = config
                    .url
                    .clone()
                    .ok_or_else(|| anyhow!("embedding.url required for the http provider"))?;
                (url, None)
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            protocol,
            client,
            endpoint,
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    fn service_error(&self, message: impl Into<String>) -> EmbeddingError {
        EmbeddingError::Service {
            provider: self.protocol.name().to_string(),
            message: message.into(),
        }
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        match self.protocol {
            Protocol::OpenAi | Protocol::Ollama => serde_json::json!({
                "model": self.model,
                "input": texts,
            }),
            Protocol::Http => serde_json::json!({
                "model": self.model,
                "texts": texts,
            }),
        }
    }

    async fn send(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = self.request_body(texts);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
                        return match self.protocol {
                            Protocol::OpenAi => parse_openai_response(&json),
                            Protocol::Ollama | Protocol::Http => parse_embeddings_field(&json),
                        };
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, attempt, "embedding service unavailable");
                        last_err = Some(self.service_error(format!("{}: {}", status, body_text)));
                        continue;
                    }
                    return Err(self.service_error(format!("{}: {}", status, body_text)));
                }
                Err(e) => {
                    let message = if e.is_connect() && self.protocol == Protocol::Ollama {
                        format!("{} (is Ollama running at {}?)", e, self.endpoint)
                    } else {
                        e.to_string()
                    };
                    warn!(attempt, error = %message, "embedding request failed");
                    last_err = Some(self.service_error(message));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| self.service_error("embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbedding {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.send(texts).await
    }
}

/// Parse `{"data": [{"embedding": [...]}, ...]}`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::Malformed("missing 'data' array".to_string()))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .ok_or_else(|| EmbeddingError::Malformed("missing 'embedding' field".to_string()))
                .and_then(to_vector)
        })
        .collect()
}

/// Parse `{"embeddings": [[...], ...]}`.
fn parse_embeddings_field(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::Malformed("missing 'embeddings' array".to_string()))?
        .iter()
        .map(to_vector)
        .collect()
}

fn to_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    value
        .as_array()
        .ok_or_else(|| EmbeddingError::Malformed("embedding is not an array".to_string()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::Malformed("non-numeric embedding value".to_string()))
        })
        .collect()
}

/// Build the client selected by `embedding.provider`.
pub fn create_client(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedding::new(config.dims.unwrap_or(0)))),
        "openai" => Ok(Arc::new(HttpEmbedding::new(Protocol::OpenAi, config)?)),
        "ollama" => Ok(Arc::new(HttpEmbedding::new(Protocol::Ollama, config)?)),
        "http" => Ok(Arc::new(HttpEmbedding::new(Protocol::Http, config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// Build the configured client behind an [`Embedder`] capped at
/// `embedding.batch_size` texts per request.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Embedder> {
    Ok(Embedder::new(create_client(config)?).with_batch_size(config.batch_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [
                {"embedding": [0.1, 0.2]},
                {"embedding": [0.3, 0.4]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_openai_missing_data() {
        let err = parse_openai_response(&serde_json::json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, EmbeddingError::Malformed(_)));
    }

    #[test]
    fn test_parse_embeddings_field() {
        let json = serde_json::json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]});
        assert_eq!(
            parse_embeddings_field(&json).unwrap(),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let json = serde_json::json!({"embeddings": [[1.0, "x"]]});
        assert!(parse_embeddings_field(&json).is_err());
    }

    #[test]
    fn test_http_body_uses_texts_key() {
        let config = EmbeddingConfig {
            provider: "http".to_string(),
            model: Some("mini".to_string()),
            dims: Some(4),
            url: Some("http://127.0.0.1:9/embed".to_string()),
            ..EmbeddingConfig::default()
        };
        let client = HttpEmbedding::new(Protocol::Http, &config).unwrap();
        let body = client.request_body(&["a".to_string()]);
        assert_eq!(body["texts"][0], "a");
        assert_eq!(client.endpoint, "http://127.0.0.1:9/embed");
    }

    #[test]
    fn test_embedder_takes_configured_batch_size() {
        let config = EmbeddingConfig {
            batch_size: 16,
            ..EmbeddingConfig::default()
        };
        assert_eq!(create_embedder(&config).unwrap().batch_size(), 16);
    }

    #[tokio::test]
    async fn test_disabled_client_fails() {
        let client = create_client(&EmbeddingConfig::default()).unwrap();
        assert_eq!(client.model_name(), "disabled");
        let err = client.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Disabled));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_service_error() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(8),
            url: Some("http://127.0.0.1:9".to_string()),
            max_retries: 0,
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let client = create_client(&config).unwrap();
        let err = client.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Service { .. }));
    }
}
