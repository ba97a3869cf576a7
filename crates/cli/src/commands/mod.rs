//! Subcommand implementations and the setup they share.

pub mod ask;
pub mod chat;
pub mod onboard;
pub mod serve;
pub mod team;
pub mod tools;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolchat_config::AppConfig;
use toolchat_core::event::{DomainEvent, EventBus};
use toolchat_core::provider::Provider;
use toolchat_core::tool::ToolRegistry;
use toolchat_mcp::McpClient;
use tracing::{info, warn};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    AppConfig::load(path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// The default provider, with setup hints when no key is configured.
pub fn default_provider(config: &AppConfig) -> CliResult<Arc<dyn Provider>> {
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY        (OpenAI)");
        eprintln!("    AZURE_OPENAI_API_KEY  (Azure OpenAI, with AZURE_OPENAI_ENDPOINT)");
        eprintln!("    GITHUB_TOKEN          (GitHub Models)");
        eprintln!("    TOOLCHAT_API_KEY      (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = toolchat_providers::build_from_config(config);
    router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider).into())
}

/// Built-in tools plus every enabled tool server.
///
/// A tool server that fails to start or list its tools, or whose tool names
/// clash with ones already registered, is reported and skipped.
pub async fn build_tools(config: &AppConfig) -> CliResult<Arc<ToolRegistry>> {
    let mut registry = toolchat_tools::build_registry(config)?;

    for server in config.tool_servers.iter().filter(|s| s.enabled) {
        let client = match McpClient::spawn(server).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(server = %server.name, error = %e, "Tool server unavailable");
                eprintln!("  [Warning] tool server '{}' skipped: {e}", server.name);
                continue;
            }
        };
        match registry.register_server(client).await {
            Ok(added) => info!(server = %server.name, tools = added, "Registered remote tools"),
            Err(e) => {
                warn!(server = %server.name, error = %e, "Tool server rejected");
                eprintln!("  [Warning] tool server '{}' skipped: {e}", server.name);
            }
        }
    }

    Ok(Arc::new(registry))
}

/// A token cancelled by Ctrl+C. Abort the handle once the run is over.
pub fn cancel_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let watcher = token.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });
    (token, handle)
}

/// Print a line to stderr for every tool the loop runs.
pub fn show_tool_activity(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if let DomainEvent::ToolExecuted {
                tool_name,
                success,
                duration_ms,
                ..
            } = event.as_ref()
            {
                let status = if *success { "ok" } else { "failed" };
                eprintln!("  [tool] {tool_name} {status} ({duration_ms} ms)");
            }
        }
    })
}

/// Mention any charts the assistant says it saved.
pub fn print_artifacts(config: &AppConfig, text: &str) {
    for name in toolchat_agent::png_artifacts(text) {
        let path = Path::new(&config.sandbox.work_dir).join(&name);
        if path.exists() {
            println!("  Chart: {}", path.display());
        }
    }
}
