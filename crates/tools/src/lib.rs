//! Built-in tool implementations for toolchat.
//!
//! Tools give the model a way to act: run Python, write markdown documents,
//! read fixed reference files, search the web, and pull financial data.
//! Which of them are registered is decided by configuration.

pub mod financial;
pub mod python_exec;
pub mod read_text_file;
pub mod web_search;
pub mod write_markdown;

use std::time::Duration;
use toolchat_config::AppConfig;
use toolchat_core::error::ToolError;
use toolchat_core::tool::ToolRegistry;
use tracing::warn;

pub use financial::{FinancialDataTool, FinancialEndpoint, financial_tools};
pub use python_exec::PythonExecTool;
pub use read_text_file::TextFileTool;
pub use web_search::WebSearchTool;
pub use write_markdown::MarkdownWriterTool;

pub const FMP_KEY_VAR: &str = "FINANCIAL_MODELING_PREP_API_KEY";

/// Ceiling on one outbound HTTP request made by a tool.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// The error a failed HTTP request becomes.
pub(crate) fn request_error(tool_name: &str, timeout: Duration, e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::Timeout {
            tool_name: tool_name.into(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        }
    }
}

/// Create a registry with the built-in tools enabled in `config`.
///
/// Tools that need an API key are skipped with a warning when the key is
/// missing. Remote tool servers are registered separately.
pub fn build_registry(config: &AppConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    if config.sandbox.enabled {
        registry.register(Box::new(PythonExecTool::from_config(&config.sandbox)))?;
    }

    if let Some(dir) = &config.tools.markdown_dir {
        registry.register(Box::new(MarkdownWriterTool::new(dir)))?;
    }

    for file in &config.tools.text_files {
        registry.register(Box::new(TextFileTool::from_config(file)))?;
    }

    if config.tools.web_search {
        match WebSearchTool::from_env() {
            Some(tool) => registry.register(Box::new(tool))?,
            None => warn!("web_search enabled but SERPER_API_KEY is not set; skipping"),
        }
    }

    if config.tools.financial_data {
        register_financial(&mut registry)?;
    }

    Ok(registry)
}

/// Register the financial data tools using `FINANCIAL_MODELING_PREP_API_KEY`.
pub fn register_financial(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    match std::env::var(FMP_KEY_VAR).ok().filter(|k| !k.is_empty()) {
        Some(key) => {
            for tool in financial_tools(&key) {
                registry.register(Box::new(tool))?;
            }
        }
        None => warn!("financial data tools enabled but {FMP_KEY_VAR} is not set; skipping"),
    }
    Ok(())
}
