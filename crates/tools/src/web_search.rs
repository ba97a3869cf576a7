//! Web search tool backed by the Serper Google Search API.
//!
//! The raw JSON response is returned to the model as text. A non-200
//! response becomes a failed result carrying the status and body.

use async_trait::async_trait;
use std::time::Duration;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

const TOOL_NAME: &str = "web_search";
pub const SERPER_URL: &str = "https://google.serper.dev/search";

pub struct WebSearchTool {
    api_key: String,
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: SERPER_URL.into(),
            timeout: crate::HTTP_TIMEOUT,
            client: crate::http_client(crate::HTTP_TIMEOUT),
        }
    }

    /// Build from `SERPER_API_KEY`; `None` when it is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("SERPER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self::new)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = crate::http_client(timeout);
        self
    }
}

/// Request body for a query. `gl` is the optional country code.
fn search_payload(query: &str, gl: Option<&str>) -> serde_json::Value {
    let mut payload = serde_json::json!({ "q": query });
    if let Some(gl) = gl {
        payload["gl"] = serde_json::json!(gl);
    }
    payload
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web with Google and return the organic results, knowledge graph and related questions as JSON."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "gl": {
                    "type": "string",
                    "description": "Two-letter country code to localize results (e.g. \"us\", \"in\")"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_args(TOOL_NAME, "Missing 'query' argument"))?;
        let gl = arguments["gl"].as_str();

        debug!(query = %query, "Searching the web");
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&search_payload(query, gl))
            .send()
            .await
            .map_err(|e| crate::request_error(TOOL_NAME, self.timeout, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status != 200 {
            warn!(status, "Search request failed");
            return Ok(ToolResult::failure(format!("Error: {status} - {body}")));
        }
        Ok(ToolResult::ok(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_includes_country_only_when_given() {
        assert_eq!(search_payload("rust", None), serde_json::json!({"q": "rust"}));
        assert_eq!(
            search_payload("ipl schedule", Some("in")),
            serde_json::json!({"q": "ipl schedule", "gl": "in"})
        );
    }

    #[test]
    fn definition_requires_query() {
        let def = WebSearchTool::new("key").to_definition();
        assert_eq!(def.name, "web_search");
        assert_eq!(def.parameters["required"][0], "query");
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let tool = WebSearchTool::new("key");
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_execution_failure() {
        let tool = WebSearchTool::new("key").with_endpoint("http://127.0.0.1:9/search");
        let err = tool
            .execute(serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer.
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let tool = WebSearchTool::new("key")
            .with_endpoint(format!("http://{addr}/search"))
            .with_timeout(Duration::from_millis(200));
        let err = tool
            .execute(serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }), "got {err:?}");
    }
}
