//! Error types for the toolchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Model invocation and tool dispatch each get their own error enum.

use thiserror::Error;

/// The top-level error type for all toolchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the model endpoint. Never retried by the loop.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures on the tool side of the loop.
///
/// The dispatcher turns every one of these into a failed `ToolResult` so the
/// model can read the error and recover.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    NotFound(String),

    #[error("Invalid arguments for tool '{tool_name}': {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Tool server '{server}' unavailable: {reason}")]
    Transport { server: String, reason: String },

    #[error("Tool '{0}' is already registered")]
    Duplicate(String),
}

impl ToolError {
    /// Shorthand for argument validation failures inside tool implementations.
    pub fn invalid_args(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn unknown_tool_names_the_tool() {
        let err = ToolError::NotFound("foo".into());
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn invalid_args_helper() {
        let err = ToolError::invalid_args("write_markdown", "missing 'file_name'");
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(err.to_string().contains("write_markdown"));
        assert!(err.to_string().contains("file_name"));
    }
}
