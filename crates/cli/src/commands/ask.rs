//! `toolchat ask`: Single-message mode.

use std::path::Path;
use toolchat_agent::ChatLoop;
use toolchat_core::session::Session;
use super::{CliResult, build_tools, cancel_on_ctrl_c, default_provider, load_config, print_artifacts};

pub async fn run(config_path: Option<&Path>, message: String) -> CliResult {
    let config = load_config(config_path)?;
    let provider = default_provider(&config)?;
    let tools = build_tools(&config).await?;
    let chat = ChatLoop::from_config(provider, tools, &config);

    let mut session = Session::with_system_prompt(&config.system_prompt);
    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    eprint!("  Thinking...");
    let result = chat.ask(&mut session, message, &cancel).await;
    ctrl_c.abort();
    eprint!("\r              \r");

    let outcome = result?;
    match &outcome.answer {
        Some(answer) => {
            println!("{answer}");
            print_artifacts(&config, answer);
        }
        None => return Err(format!("No answer ({})", outcome.stop_reason).into()),
    }
    Ok(())
}
