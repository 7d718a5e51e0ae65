//! Chat-completion style text generation interface.
//!
//! The concrete HTTP client lives in the app crate; pipeline components
//! hold an `Arc<dyn GenerationClient>` passed in at construction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single non-streaming generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl GenerationRequest {
    /// A system instruction followed by one user message.
    pub fn instruct(
        instruction: impl Into<String>,
        content: impl Into<String>,
        max_tokens: usize,
        temperature: f32,
    ) -> Self {
        Self {
            messages: vec![Message::system(instruction), Message::user(content)],
            max_tokens,
            temperature,
        }
    }

    /// Total characters across all message contents.
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// All message contents joined, for budget estimation.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An external text generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn model_name(&self) -> &str;
    /// Run one generation call and return the generated text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruct_builds_system_then_user() {
        let req = GenerationRequest::instruct("Summarize.", "body", 600, 0.3);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.prompt_chars(), "Summarize.".len() + "body".len());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
