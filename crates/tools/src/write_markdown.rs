//! Markdown writer tool: append model output to a named document.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolResult};

const TOOL_NAME: &str = "write_markdown";

pub struct MarkdownWriterTool {
    dir: PathBuf,
}

impl MarkdownWriterTool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// File name for a document: `.md` appended when missing, lower-cased,
/// spaces turned into dashes.
pub fn markdown_file_name(name: &str) -> String {
    let name = name.trim();
    let name = if name.ends_with(".md") {
        name.to_string()
    } else {
        format!("{name}.md")
    };
    name.to_lowercase().replace(' ', "-")
}

#[async_trait]
impl Tool for MarkdownWriterTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Write the provided contents to a markdown file with the given name. \
         Appends when the file already exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_name": {
                    "type": "string",
                    "description": "The name of the markdown file to write the contents to"
                },
                "contents": {
                    "type": "string",
                    "description": "The contents to write to the file"
                }
            },
            "required": ["file_name", "contents"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_name = arguments["file_name"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_args(TOOL_NAME, "Missing 'file_name' argument"))?;
        let contents = arguments["contents"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_args(TOOL_NAME, "Missing 'contents' argument"))?;

        let file_name = markdown_file_name(file_name);
        if file_name == ".md"
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: format!("'{file_name}' must be a plain file name"),
            });
        }

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| failed(format!("cannot create {}: {e}", self.dir.display())))?;

        let path = self.dir.join(&file_name);
        let created = !tokio::fs::try_exists(&path).await.unwrap_or(false);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| failed(format!("cannot open {}: {e}", path.display())))?;
        file.write_all(format!("{contents}\n").as_bytes())
            .await
            .map_err(|e| failed(format!("cannot write {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| failed(format!("cannot write {}: {e}", path.display())))?;

        let message = if created {
            format!("Created a new markdown file '{}'. Content written successfully to it.", path.display())
        } else {
            format!("Content appended successfully to {}", path.display())
        };
        Ok(ToolResult::ok(message).with_data(serde_json::json!({
            "path": path.display().to_string(),
            "created": created,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_normalization() {
        assert_eq!(markdown_file_name("URL Shortener"), "url-shortener.md");
        assert_eq!(markdown_file_name("design.md"), "design.md");
        assert_eq!(markdown_file_name("Chat App.MD"), "chat-app.md.md");
    }

    #[tokio::test]
    async fn creates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MarkdownWriterTool::new(dir.path().join("designs"));

        let first = tool
            .execute(serde_json::json!({"file_name": "URL Shortener", "contents": "# Overview"}))
            .await
            .unwrap();
        assert!(first.success);
        assert!(first.output.starts_with("Created a new markdown file"));

        let second = tool
            .execute(serde_json::json!({"file_name": "url shortener", "contents": "## API"}))
            .await
            .unwrap();
        assert!(second.output.starts_with("Content appended"));

        let written = std::fs::read_to_string(dir.path().join("designs/url-shortener.md")).unwrap();
        assert_eq!(written, "# Overview\n## API\n");
    }

    #[tokio::test]
    async fn rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MarkdownWriterTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"file_name": "../escape", "contents": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_contents_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MarkdownWriterTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"file_name": "a"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
