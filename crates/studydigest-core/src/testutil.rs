//! Deterministic service fakes shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingClient;
use crate::error::{EmbeddingError, GenerationError};
use crate::generation::{GenerationClient, GenerationRequest};

/// Embeds text onto one axis per keyword: component `i` is the number of
/// times keyword `i` occurs in the text.
pub struct FakeEmbedding {
    keywords: Vec<String>,
    fail: bool,
    fail_on_call: Option<usize>,
    malformed_marker: Option<String>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl FakeEmbedding {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            fail: false,
            fail_on_call: None,
            malformed_marker: None,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Fail only the `n`-th call (zero-based).
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Texts containing `marker` get an empty (malformed) vector.
    pub fn malformed_for(mut self, marker: &str) -> Self {
        self.malformed_marker = Some(marker.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        self.keywords
            .iter()
            .map(|k| text.matches(k.as_str()).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedding {
    fn model_name(&self) -> &str {
        "fake-embedding"
    }

    fn dims(&self) -> usize {
        self.keywords.len()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let n = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(texts.to_vec());
            batches.len() - 1
        };
        if self.fail || self.fail_on_call == Some(n) {
            return Err(EmbeddingError::Service {
                provider: "fake".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|t| match &self.malformed_marker {
                Some(m) if t.contains(m.as_str()) => Vec::new(),
                _ => self.vector_for(t),
            })
            .collect())
    }
}

type Responder = Box<dyn Fn(&GenerationRequest, usize) -> Result<String, GenerationError> + Send + Sync>;

/// Records every request and answers through a responder closure that
/// receives the request and its zero-based call number.
pub struct FakeGeneration {
    requests: Mutex<Vec<GenerationRequest>>,
    responder: Responder,
}

impl FakeGeneration {
    /// Replies `"summary <n>"` for the n-th call.
    pub fn numbered() -> Self {
        Self::with(|_, n| Ok(format!("summary {}", n)))
    }

    pub fn failing() -> Self {
        Self::with(|_, _| {
            Err(GenerationError::Service {
                provider: "fake".to_string(),
                message: "503 Service Unavailable".to_string(),
            })
        })
    }

    pub fn with<F>(responder: F) -> Self
    where
        F: Fn(&GenerationRequest, usize) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            requests: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for FakeGeneration {
    fn model_name(&self) -> &str {
        "fake-generation"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        (self.responder)(request, n)
    }
}
