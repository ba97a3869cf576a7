//! Tools and the tool dispatcher.
//!
//! The registry is an explicit map from tool name to a [`ToolBinding`]: either
//! an in-process [`Tool`] or a [`RemoteToolServer`] that owns the tool. It is
//! built once at startup and handed to the loop behind an `Arc`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Parse a model-issued call. Empty argument text is treated as `{}`.
    pub fn parse(call: &MessageToolCall) -> Result<Self, ToolError> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|e| ToolError::invalid_args(&call.name, format!("malformed JSON: {e}")))?
        };

        if !arguments.is_object() {
            return Err(ToolError::invalid_args(
                &call.name,
                "arguments must be a JSON object",
            ));
        }

        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result. The dispatcher fills in `call_id`.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A failed result the model should see.
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(output)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Stamp the id of the call this result answers.
    pub fn for_call(mut self, call_id: &str) -> Self {
        self.call_id = call_id.to_string();
        self
    }
}

/// An in-process tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "execute_python").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// An external process exposing tools over a request/response channel.
#[async_trait]
pub trait RemoteToolServer: Send + Sync {
    /// The configured name of the server (used in errors and logs).
    fn server_name(&self) -> &str;

    /// Descriptors of every tool the server exposes.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError>;

    /// Call one tool on the server.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// Where a registered tool runs.
pub enum ToolBinding {
    Local(Box<dyn Tool>),
    Remote(Arc<dyn RemoteToolServer>),
}

impl ToolBinding {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

struct ToolEntry {
    definition: ToolDefinition,
    binding: ToolBinding,
}

/// The tool dispatcher.
///
/// The loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Resolve and execute tool calls, always producing a `ToolResult`
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn insert(&mut self, definition: ToolDefinition, binding: ToolBinding) -> Result<(), ToolError> {
        if self.tools.contains_key(&definition.name) {
            return Err(ToolError::Duplicate(definition.name));
        }
        debug!(tool = %definition.name, remote = binding.is_remote(), "Registering tool");
        self.order.push(definition.name.clone());
        self.tools
            .insert(definition.name.clone(), ToolEntry { definition, binding });
        Ok(())
    }

    /// Register a local tool. Names are unique; a second registration is rejected.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let definition = tool.to_definition();
        self.insert(definition, ToolBinding::Local(tool))
    }

    /// Register one tool owned by a remote server.
    pub fn register_remote(
        &mut self,
        definition: ToolDefinition,
        server: Arc<dyn RemoteToolServer>,
    ) -> Result<(), ToolError> {
        self.insert(definition, ToolBinding::Remote(server))
    }

    /// Register every tool a remote server advertises. Returns how many were added.
    ///
    /// All or nothing: a name clash leaves the registry untouched.
    pub async fn register_server(
        &mut self,
        server: Arc<dyn RemoteToolServer>,
    ) -> Result<usize, ToolError> {
        let definitions = server.list_tools().await?;
        let mut seen = std::collections::HashSet::new();
        for definition in &definitions {
            if self.tools.contains_key(&definition.name) || !seen.insert(definition.name.as_str()) {
                return Err(ToolError::Duplicate(definition.name.clone()));
            }
        }
        let count = definitions.len();
        for definition in definitions {
            self.register_remote(definition, server.clone())?;
        }
        Ok(count)
    }

    /// Resolve a tool by exact name.
    pub fn resolve(&self, name: &str) -> Option<&ToolBinding> {
        self.tools.get(name).map(|e| &e.binding)
    }

    /// Get a tool's descriptor by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|e| &e.definition)
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.get(name).cloned())
            .collect()
    }

    /// Definitions for the named subset; unknown names are skipped.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names.iter().filter_map(|n| self.get(n).cloned()).collect()
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Execute a tool call, surfacing errors.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let result = match &entry.binding {
            ToolBinding::Local(tool) => tool.execute(call.arguments.clone()).await?,
            ToolBinding::Remote(server) => {
                server.call_tool(&call.name, call.arguments.clone()).await?
            }
        };
        Ok(result.for_call(&call.id))
    }

    /// Execute a tool call, folding every error into a failed result.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        match self.execute(call).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                self.failure_for(&call.id, &e)
            }
        }
    }

    /// Parse and execute a call exactly as the model issued it.
    pub async fn dispatch(&self, call: &MessageToolCall) -> ToolResult {
        match ToolCall::parse(call) {
            Ok(parsed) => self.invoke(&parsed).await,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Rejected tool arguments");
                self.failure_for(&call.id, &e)
            }
        }
    }

    /// The failed result reported back to the model for `error`.
    pub fn failure_for(&self, call_id: &str, error: &ToolError) -> ToolResult {
        let output = match error {
            ToolError::NotFound(_) => format!(
                "Error: {error}. Available tools: {}",
                if self.is_empty() { "none".to_string() } else { self.names().join(", ") }
            ),
            _ => format!("Error: {error}"),
        };
        ToolResult::failure(output).for_call(call_id)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
