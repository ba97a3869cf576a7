//! `toolchat serve`: Host the built-in tools as a stdio tool server.

use std::path::Path;
use std::sync::Arc;
use toolchat_mcp::{ServerInfo, serve};
use super::{CliResult, load_config};

pub async fn run(config_path: Option<&Path>, financial_data: bool) -> CliResult {
    let config = load_config(config_path)?;
    let mut registry = toolchat_tools::build_registry(&config)?;
    if financial_data && !config.tools.financial_data {
        toolchat_tools::register_financial(&mut registry)?;
    }

    serve(
        Arc::new(registry),
        ServerInfo::default(),
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await?;
    Ok(())
}
