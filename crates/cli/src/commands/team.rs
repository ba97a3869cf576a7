//! `toolchat team`: Run a configured team of agents on a task.

use std::path::Path;
use std::sync::Arc;
use toolchat_agent::Team;
use toolchat_core::event::EventBus;
use super::{CliResult, build_tools, cancel_on_ctrl_c, default_provider, load_config, print_artifacts, show_tool_activity};

pub async fn run(config_path: Option<&Path>, name: &str, task: String) -> CliResult {
    let config = load_config(config_path)?;
    let team_config = match config.team(name) {
        Some(team) => team.clone(),
        None => {
            let known: Vec<&str> = config.teams.iter().map(|t| t.name.as_str()).collect();
            let known = if known.is_empty() { "none".to_string() } else { known.join(", ") };
            return Err(format!("Unknown team '{name}' (configured: {known})").into());
        }
    };

    let provider = default_provider(&config)?;
    let tools = build_tools(&config).await?;
    let event_bus = Arc::new(EventBus::default());
    let activity = show_tool_activity(&event_bus);
    let team = Team::from_config(&config, &team_config, provider, tools)?.with_event_bus(event_bus);

    println!();
    println!("  Team:   {} ({:?})", team_config.name, team_config.mode);
    for agent in team.agents() {
        println!("    - {} {}", agent.name, agent.description);
    }
    println!();

    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    let result = team.run(task, &cancel).await;
    ctrl_c.abort();
    activity.abort();
    let outcome = result?;

    for message in outcome.transcript.iter().skip(1) {
        let speaker = message.name.as_deref().unwrap_or("?");
        println!("  [{speaker}]");
        for line in message.content.lines() {
            println!("    {line}");
        }
        println!();
        print_artifacts(&config, &message.content);
    }
    println!("  Finished: {} after {} messages", outcome.stop_reason, outcome.messages);
    Ok(())
}
