//! Configuration loading, validation, and management for toolchat.
//!
//! Loads configuration from `~/.toolchat/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.toolchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model (Azure: deployment name)
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// System prompt for single-agent chat sessions
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Loop termination and history settings
    #[serde(default, rename = "loop")]
    pub chat_loop: LoopConfig,

    /// External stdio tool servers
    #[serde(default)]
    pub tool_servers: Vec<ToolServerConfig>,

    /// Code execution sandbox
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Built-in tool switches
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Multi-agent team definitions
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_system_prompt() -> String {
    "You are a helpful assistant with access to tools. Use a tool only when the \
     question needs it. If you do not have enough data to answer, say so."
        .into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("chat_loop", &self.chat_loop)
            .field("tool_servers", &self.tool_servers)
            .field("sandbox", &self.sandbox)
            .field("tools", &self.tools)
            .field("teams", &self.teams)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Azure OpenAI `api-version` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// When a chat loop stops, and how much history it submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Ceiling on model invocations per run
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Text that ends the run when the model emits it (e.g. "TERMINATE")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<String>,

    /// Submit at most this many recent messages to the model. Unset = all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_messages: Option<usize>,
}

fn default_max_turns() -> u32 {
    10
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            sentinel: None,
            max_history_messages: None,
        }
    }
}

/// A tool server launched as a child process and spoken to over stdio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Name used in logs and errors
    pub name: String,

    /// Executable to launch
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the child
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-request timeout
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_server_timeout() -> u64 {
    60
}

/// Limits for the Python code execution tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Register the `execute_python` tool
    #[serde(default)]
    pub enabled: bool,

    /// Working directory for scripts and their outputs
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Cap applied to stdout and stderr separately
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_work_dir() -> String {
    "code_executor".into()
}
fn default_interpreter() -> String {
    "python3".into()
}
fn default_sandbox_timeout() -> u64 {
    60
}
fn default_max_output_bytes() -> usize {
    16 * 1024
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            work_dir: default_work_dir(),
            interpreter: default_interpreter(),
            timeout_secs: default_sandbox_timeout(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Which built-in tools to register.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory for `write_markdown`; unset = tool not registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_dir: Option<String>,

    /// Fixed text files exposed as read-only tools
    #[serde(default)]
    pub text_files: Vec<TextFileConfig>,

    /// Register `web_search` (needs SERPER_API_KEY)
    #[serde(default)]
    pub web_search: bool,

    /// Register the financial data tools in-process (needs FINANCIAL_MODELING_PREP_API_KEY)
    #[serde(default)]
    pub financial_data: bool,
}

/// A text file the model can read through a named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFileConfig {
    /// Tool name, e.g. "get_eval_criteria"
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
}

/// How agents in a team take turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMode {
    #[default]
    RoundRobin,
    /// The speaker changes only through handoff tools
    Swarm,
}

/// A named multi-agent team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,

    #[serde(default)]
    pub mode: TeamMode,

    /// Stop once this many agent messages have been produced
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<String>,

    pub agents: Vec<TeamAgentConfig>,
}

fn default_max_messages() -> usize {
    10
}

/// One agent of a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAgentConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub system_prompt: String,

    /// Tool names this agent may call
    #[serde(default)]
    pub tools: Vec<String>,

    /// Agents this one may hand off to (swarm mode)
    #[serde(default)]
    pub handoffs: Vec<String>,
}

impl AppConfig {
    /// Load configuration from `path`, or the default location when `None`,
    /// then apply environment overrides:
    /// - `TOOLCHAT_API_KEY`, `OPENAI_API_KEY`
    /// - `AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_VERSION`
    /// - `GITHUB_TOKEN` (GitHub Models)
    /// - `TOOLCHAT_PROVIDER`, `TOOLCHAT_MODEL`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLCHAT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        let azure_key = lookup("AZURE_OPENAI_API_KEY");
        let azure_endpoint = lookup("AZURE_OPENAI_ENDPOINT");
        let azure_version = lookup("AZURE_OPENAI_API_VERSION");
        if azure_key.is_some() || azure_endpoint.is_some() || azure_version.is_some() {
            let azure = self.providers.entry("azure".into()).or_default();
            azure.api_key = azure.api_key.take().or(azure_key);
            azure.api_url = azure.api_url.take().or(azure_endpoint);
            azure.api_version = azure.api_version.take().or(azure_version);
        }

        if let Some(token) = lookup("GITHUB_TOKEN") {
            let github = self.providers.entry("github".into()).or_default();
            github.api_key = github.api_key.take().or(Some(token));
        }

        if let Some(provider) = lookup("TOOLCHAT_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("TOOLCHAT_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.chat_loop.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_turns must be > 0".into(),
            ));
        }

        if self.chat_loop.max_history_messages == Some(0) {
            return Err(ConfigError::ValidationError(
                "loop.max_history_messages must be > 0 when set".into(),
            ));
        }

        for server in &self.tool_servers {
            if server.name.trim().is_empty() || server.command.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "tool_servers entries need a name and a command".into(),
                ));
            }
        }

        for team in &self.teams {
            team.validate()?;
        }

        Ok(())
    }

    /// Look up a team by name.
    pub fn team(&self, name: &str) -> Option<&TeamConfig> {
        self.teams.iter().find(|t| t.name == name)
    }

    /// Check if an API key is available for the default provider.
    pub fn has_api_key(&self) -> bool {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.api_key.as_ref())
            .or(self.api_key.as_ref())
            .is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl TeamConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "team '{}' has no agents",
                self.name
            )));
        }
        if self.max_messages == 0 {
            return Err(ConfigError::ValidationError(format!(
                "team '{}': max_messages must be > 0",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if !names.insert(agent.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "team '{}': duplicate agent name '{}'",
                    self.name, agent.name
                )));
            }
        }

        for agent in &self.agents {
            if let Some(target) = agent.handoffs.iter().find(|h| !names.contains(h.as_str())) {
                return Err(ConfigError::ValidationError(format!(
                    "team '{}': agent '{}' hands off to unknown agent '{}'",
                    self.name, agent.name, target
                )));
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            providers: HashMap::new(),
            chat_loop: LoopConfig::default(),
            tool_servers: vec![],
            sandbox: SandboxConfig::default(),
            tools: ToolsConfig::default(),
            teams: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.chat_loop.max_turns, 10);
        assert!(!config.sandbox.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.chat_loop.max_turns, config.chat_loop.max_turns);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_turn_ceiling_rejected() {
        let mut config = AppConfig::default();
        config.chat_loop.max_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "ollama"
default_model = "llama3.2"

[loop]
max_turns = 4
sentinel = "TERMINATE"
max_history_messages = 40

[[tool_servers]]
name = "financial_data"
command = "toolchat"
args = ["serve", "--financial-data"]
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.chat_loop.max_turns, 4);
        assert_eq!(config.chat_loop.sentinel.as_deref(), Some("TERMINATE"));
        assert_eq!(config.chat_loop.max_history_messages, Some(40));
        assert_eq!(config.tool_servers.len(), 1);
        assert_eq!(config.tool_servers[0].args, ["serve", "--financial-data"]);
        assert!(config.tool_servers[0].enabled);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_temperature = \"hot\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_fill_azure_provider() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("AZURE_OPENAI_API_KEY", "az-key"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_API_VERSION", "2024-06-01"),
            ("TOOLCHAT_PROVIDER", "azure"),
        ]));
        let azure = &config.providers["azure"];
        assert_eq!(azure.api_key.as_deref(), Some("az-key"));
        assert_eq!(azure.api_version.as_deref(), Some("2024-06-01"));
        assert_eq!(config.default_provider, "azure");
        assert!(config.has_api_key());
    }

    #[test]
    fn file_values_win_over_env() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "github".into(),
            ProviderConfig {
                api_key: Some("from-file".into()),
                ..ProviderConfig::default()
            },
        );
        config.apply_env_overrides(env(&[("GITHUB_TOKEN", "from-env")]));
        assert_eq!(config.providers["github"].api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn generic_key_from_env() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn team_config_parsing() {
        let toml_str = r#"
[[teams]]
name = "debate"
mode = "swarm"
max_messages = 10
sentinel = "TERMINATE"

[[teams.agents]]
name = "ResearchAgent"
system_prompt = "Gather facts."
tools = ["web_search"]
handoffs = ["EvaluationAgent"]

[[teams.agents]]
name = "EvaluationAgent"
system_prompt = "Score the arguments."
tools = ["get_eval_criteria"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        let team = config.team("debate").unwrap();
        assert_eq!(team.mode, TeamMode::Swarm);
        assert_eq!(team.agents.len(), 2);
        assert_eq!(team.agents[0].handoffs, ["EvaluationAgent"]);
    }

    #[test]
    fn team_with_unknown_handoff_rejected() {
        let toml_str = r#"
[[teams]]
name = "broken"

[[teams.agents]]
name = "A"
system_prompt = "x"
handoffs = ["Nobody"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Nobody"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("max_turns"));
    }
}
