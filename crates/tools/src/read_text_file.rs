//! Read-only text file tool, e.g. `get_eval_criteria` for a debate judge.
//!
//! The file is fixed by configuration; the model cannot choose the path.

use async_trait::async_trait;
use std::path::PathBuf;
use toolchat_config::TextFileConfig;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolResult};

pub struct TextFileTool {
    name: String,
    description: String,
    path: PathBuf,
}

impl TextFileTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            path: path.into(),
        }
    }

    pub fn from_config(config: &TextFileConfig) -> Self {
        let description = if config.description.is_empty() {
            format!("Read the contents of {}", config.path)
        } else {
            config.description.clone()
        };
        Self::new(&config.name, description, &config.path)
    }
}

#[async_trait]
impl Tool for TextFileTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map(ToolResult::ok)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("cannot read {}: {e}", self.path.display()),
            })
    }
}
