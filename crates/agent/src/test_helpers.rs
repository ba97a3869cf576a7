//! Shared test helpers for loop and team tests.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use toolchat_core::error::{ProviderError, ToolError};
use toolchat_core::message::{Message, MessageToolCall};
use toolchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use toolchat_core::tool::{Tool, ToolRegistry, ToolResult};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and records
/// the request it was given. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let count = requests.len();

        if count >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{count}, have {})",
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[count].clone())
    }
}

/// Answers every request with the same text and keeps the last request.
pub struct RecordingProvider {
    answer: String,
    last: Mutex<Option<ProviderRequest>>,
}

impl RecordingProvider {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.into(),
            last: Mutex::new(None),
        }
    }

    pub fn last_request_messages(&self) -> Vec<Message> {
        self.last
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn name(&self) -> &str {
        "recording_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        *self.last.lock().unwrap() = Some(request);
        Ok(make_text_response(&self.answer))
    }
}

/// Always fails with a network error.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Echoes its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_args("echo", "Missing 'text' argument"))?;
        Ok(ToolResult::ok(text))
    }
}

/// Cancels the token it holds when executed, as a user interrupt would.
pub struct CancellingTool(pub CancellationToken);

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "cancel_now"
    }

    fn description(&self) -> &str {
        "Cancel the running loop"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.0.cancel();
        Ok(ToolResult::ok("cancelling"))
    }
}

pub fn registry_with_echo() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool)).unwrap();
    registry
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call with id `call_<name>`.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    make_tool_call_with_id(&format!("call_{name}"), name, args)
}

pub fn make_tool_call_with_id(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
