//! Provider router: selects the correct provider based on config.

use std::collections::HashMap;
use std::sync::Arc;
use toolchat_config::{AppConfig, ProviderConfig};
use toolchat_core::provider::Provider;
use crate::azure::AzureOpenAiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table becomes a provider, and the default
/// provider is created from top-level settings when it has no table.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        router.register(name.clone(), build_one(name, provider_config, config));
    }

    if router.get(&config.default_provider).is_none() {
        let provider = build_one(&config.default_provider, &ProviderConfig::default(), config);
        router.register(config.default_provider.clone(), provider);
    }

    router
}

fn build_one(name: &str, provider_config: &ProviderConfig, config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = provider_config
        .api_key
        .clone()
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();

    match name {
        "azure" => Arc::new(AzureOpenAiProvider::new(
            provider_config.api_url.clone().unwrap_or_default(),
            api_key,
            provider_config.api_version.as_deref(),
        )),
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(provider_config.api_url.as_deref())),
        _ => {
            let base_url = provider_config
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
        }
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "github" => "https://models.inference.ai.azure.com".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
