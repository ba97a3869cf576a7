//! `toolchat tools`: List the tools the model can call.

use std::path::Path;
use super::{CliResult, build_tools, load_config};

pub async fn run(config_path: Option<&Path>) -> CliResult {
    let config = load_config(config_path)?;
    let tools = build_tools(&config).await?;

    if tools.is_empty() {
        println!("No tools enabled. Configure [sandbox], [tools] or [[tool_servers]] in the config file.");
        return Ok(());
    }

    println!("Available tools ({}):", tools.len());
    for definition in tools.definitions() {
        let origin = match tools.resolve(&definition.name) {
            Some(binding) if binding.is_remote() => " [remote]",
            _ => "",
        };
        println!("  {}{origin}", definition.name);
        println!("      {}", definition.description);
    }
    Ok(())
}
