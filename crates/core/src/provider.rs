//! Provider trait: the abstraction over chat-completion endpoints.
//!
//! A Provider sends a message snapshot plus the declared tools to a model and
//! returns the assistant message. Sampling parameters are forwarded as-is.
//!
//! Implementations: OpenAI-compatible (OpenAI, Ollama, GitHub Models), Azure OpenAI.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// A single model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model (or Azure deployment) to use, e.g. "gpt-4o"
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool descriptor as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (unique within a registry)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    /// Classify the response as a final answer or a batch of tool calls.
    pub fn reply(&self) -> ModelReply {
        if self.message.tool_calls.is_empty() {
            ModelReply::FinalAnswer(self.message.content.clone())
        } else {
            ModelReply::ToolCalls {
                content: self.message.content.clone(),
                calls: self.message.tool_calls.clone(),
            }
        }
    }
}

/// What a model invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Free text, no further calls expected.
    FinalAnswer(String),
    /// One or more tool calls, with whatever text accompanied them.
    ToolCalls {
        content: String,
        calls: Vec<MessageToolCall>,
    },
}

impl ModelReply {
    /// The text part of the reply.
    pub fn text(&self) -> &str {
        match self {
            Self::FinalAnswer(text) => text,
            Self::ToolCalls { content, .. } => content,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalAnswer(_))
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The loop calls `complete()` without knowing which backend answers.
/// Errors are surfaced to the caller and never retried here.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "azure").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(message: Message) -> ProviderResponse {
        ProviderResponse {
            message,
            usage: None,
            model: "mock".into(),
        }
    }

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"gpt-4o","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.tools.is_empty());
        assert!(req.max_tokens.is_none());
    }

    #[test]
    fn text_only_reply_is_final() {
        let reply = response(Message::assistant("4")).reply();
        assert_eq!(reply, ModelReply::FinalAnswer("4".into()));
        assert!(reply.is_final());
    }

    #[test]
    fn reply_with_calls_is_not_final() {
        let mut msg = Message::assistant("checking");
        msg.tool_calls = vec![MessageToolCall {
            id: "c1".into(),
            name: "get_stock_quote".into(),
            arguments: r#"{"symbol":"MSFT"}"#.into(),
        }];
        let reply = response(msg).reply();
        assert!(!reply.is_final());
        assert_eq!(reply.text(), "checking");
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "execute_python".into(),
            description: "Run Python code".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("execute_python"));
        assert!(json.contains("code"));
    }
}
