//! `toolchat chat`: Interactive chat mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolchat_agent::ChatLoop;
use toolchat_core::event::EventBus;
use toolchat_core::session::Session;
use super::{CliResult, build_tools, cancel_on_ctrl_c, default_provider, load_config, print_artifacts, show_tool_activity};

/// What a line of user input asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Quit,
    Reset,
    Skip,
    Message(&'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Skip,
        "quit" | "exit" => Input::Quit,
        "/reset" => Input::Reset,
        text => Input::Message(text),
    }
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

pub async fn run(config_path: Option<&Path>) -> CliResult {
    let config = load_config(config_path)?;
    let provider = default_provider(&config)?;
    let tools = build_tools(&config).await?;

    let event_bus = Arc::new(EventBus::default());
    let activity = show_tool_activity(&event_bus);
    let tool_names = if tools.is_empty() {
        "none".to_string()
    } else {
        tools.names().join(", ")
    };
    let chat = ChatLoop::from_config(provider, tools, &config).with_event_bus(event_bus);

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         toolchat — Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Tools:     {tool_names}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type '/reset' to start over, 'exit' or 'quit' to leave.");
    println!();

    let mut session = Session::with_system_prompt(&config.system_prompt);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let text = match parse_input(&line) {
            Input::Quit => break,
            Input::Skip => {
                prompt()?;
                continue;
            }
            Input::Reset => {
                session = session.reset();
                println!("  Session reset.");
                println!();
                prompt()?;
                continue;
            }
            Input::Message(text) => text,
        };

        // A finished run starts the next one from the same history.
        if session.state().is_done() {
            session = session.fork();
        }

        let (cancel, ctrl_c) = cancel_on_ctrl_c();
        eprint!("  ...");
        let result = chat.ask(&mut session, text, &cancel).await;
        ctrl_c.abort();
        eprint!("\r     \r");

        match result {
            Ok(outcome) => {
                println!();
                match &outcome.answer {
                    Some(answer) => {
                        for line in answer.lines() {
                            println!("  Assistant > {line}");
                        }
                        print_artifacts(&config, answer);
                    }
                    None => println!("  Assistant > (no answer: {})", outcome.stop_reason),
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        prompt()?;
    }

    activity.abort();
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
