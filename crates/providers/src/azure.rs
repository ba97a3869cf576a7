//! Azure OpenAI provider.
//!
//! Same body as the OpenAI-compatible provider, but the deployment is part of
//! the URL, the API version is a query parameter, and auth uses `api-key`.

use async_trait::async_trait;
use toolchat_core::error::ProviderError;
use toolchat_core::provider::{ProviderRequest, ProviderResponse};
use tracing::debug;
use crate::openai_compat::{http_client, parse_response, request_body, send_error};

pub const DEFAULT_API_VERSION: &str = "2024-06-01";

/// An Azure OpenAI deployment-backed provider.
pub struct AzureOpenAiProvider {
    endpoint: String,
    api_key: String,
    api_version: String,
    client: reqwest::Client,
}

impl AzureOpenAiProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: Option<&str>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: api_version.unwrap_or(DEFAULT_API_VERSION).to_string(),
            client: http_client(),
        }
    }

    /// URL for a deployment. The request's model name is the deployment name.
    pub fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }
}

#[async_trait]
impl toolchat_core::Provider for AzureOpenAiProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if self.endpoint.is_empty() {
            return Err(ProviderError::NotConfigured(
                "azure: set AZURE_OPENAI_ENDPOINT or providers.azure.api_url".into(),
            ));
        }

        let url = self.completions_url(&request.model);
        let body = request_body(&request, false);

        debug!(deployment = %request.model, api_version = %self.api_version, "Sending Azure completion request");

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        parse_response(response, &request.model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::{Message, Provider};

    #[test]
    fn deployment_url_layout() {
        let provider =
            AzureOpenAiProvider::new("https://contoso.openai.azure.com/", "key", Some("2024-02-15-preview"));
        assert_eq!(
            provider.completions_url("gpt-4o-mini"),
            "https://contoso.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn default_api_version() {
        let provider = AzureOpenAiProvider::new("https://x.openai.azure.com", "key", None);
        assert!(provider.completions_url("d").ends_with(DEFAULT_API_VERSION));
        assert_eq!(provider.name(), "azure");
    }

    #[tokio::test]
    async fn missing_endpoint_is_not_configured() {
        let provider = AzureOpenAiProvider::new("", "key", None);
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
            stop: vec![],
        };
        let err = provider.complete(request).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
