//! Multi-agent teams over a shared transcript.
//!
//! Every agent turn runs a [`ChatLoop`] on a private session built from the
//! shared transcript: the agent's own system prompt first, its own earlier
//! messages as assistant messages, everyone else's as user messages tagged
//! `[name]`. The agent's final text is appended to the transcript under its
//! name.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolchat_config::{AppConfig, TeamAgentConfig, TeamConfig, TeamMode};
use toolchat_core::event::EventBus;
use toolchat_core::message::{Message, Role};
use toolchat_core::provider::Provider;
use toolchat_core::session::{Session, StopReason};
use toolchat_core::tool::ToolRegistry;
use toolchat_core::{Error, Result};
use tracing::{debug, info};
use crate::loop_runner::{ChatLoop, last_assistant_text};

/// One participant of a team.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Registry tools this agent may call.
    pub tools: Vec<String>,
    /// Agents this one may hand the floor to in swarm mode.
    pub handoffs: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            handoffs: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_handoffs(mut self, targets: &[&str]) -> Self {
        self.handoffs = targets.iter().map(|t| t.to_string()).collect();
        self
    }
}

impl From<&TeamAgentConfig> for AgentSpec {
    fn from(config: &TeamAgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            system_prompt: config.system_prompt.clone(),
            tools: config.tools.clone(),
            handoffs: config.handoffs.clone(),
        }
    }
}

/// What a team run produced.
#[derive(Debug, Clone)]
pub struct TeamOutcome {
    /// The task followed by every agent message, in order.
    pub transcript: Vec<Message>,
    pub stop_reason: StopReason,
    /// Agent messages produced, excluding the task.
    pub messages: usize,
}

impl TeamOutcome {
    /// Text of the last agent message.
    pub fn last_text(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

pub struct Team {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    agents: Vec<AgentSpec>,
    mode: TeamMode,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_turns: u32,
    max_messages: usize,
    sentinel: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl Team {
    /// Build a team, checking that every agent's tools are registered and
    /// every handoff names a member.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        agents: Vec<AgentSpec>,
        mode: TeamMode,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(Error::Config {
                message: "a team needs at least one agent".into(),
            });
        }
        for agent in &agents {
            if let Some(missing) = agent.tools.iter().find(|t| tools.get(t).is_none()) {
                return Err(Error::Config {
                    message: format!("agent '{}' uses unknown tool '{missing}'", agent.name),
                });
            }
            if let Some(missing) = agent
                .handoffs
                .iter()
                .find(|h| !agents.iter().any(|a| &a.name == *h))
            {
                return Err(Error::Config {
                    message: format!("agent '{}' hands off to unknown agent '{missing}'", agent.name),
                });
            }
        }

        Ok(Self {
            provider,
            tools,
            agents,
            mode,
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: None,
            max_turns: 10,
            max_messages: 10,
            sentinel: None,
            event_bus: None,
        })
    }

    /// Build the team named in config, using its model and loop settings.
    pub fn from_config(
        config: &AppConfig,
        team: &TeamConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let agents = team.agents.iter().map(AgentSpec::from).collect();
        let mut built = Self::new(provider, tools, agents, team.mode)?
            .with_model(&config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_turns(config.chat_loop.max_turns)
            .with_max_messages(team.max_messages);
        if let Some(sentinel) = &team.sentinel {
            built = built.with_sentinel(sentinel);
        }
        Ok(built)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Ceiling on model invocations within a single agent turn.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into()).filter(|s| !s.is_empty());
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn agents(&self) -> &[AgentSpec] {
        &self.agents
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.name == name)
    }

    fn loop_for(&self, agent: &AgentSpec) -> ChatLoop {
        let mut chat = ChatLoop::new(self.provider.clone(), &self.model, self.tools.clone())
            .with_temperature(self.temperature)
            .with_max_turns(self.max_turns)
            .with_agent_name(&agent.name)
            .with_tool_subset(agent.tools.clone());
        if let Some(max) = self.max_tokens {
            chat = chat.with_max_tokens(max);
        }
        if let Some(sentinel) = &self.sentinel {
            chat = chat.with_sentinel(sentinel);
        }
        if let Some(bus) = &self.event_bus {
            chat = chat.with_event_bus(bus.clone());
        }
        if self.mode == TeamMode::Swarm {
            chat = chat.with_handoffs(agent.handoffs.clone());
        }
        chat
    }

    /// The private session an agent speaks from.
    fn session_for(agent: &AgentSpec, transcript: &[Message]) -> Session {
        let mut session = Session::with_system_prompt(&agent.system_prompt);
        for message in transcript {
            match message.name.as_deref() {
                Some(name) if name == agent.name => {
                    session.append(Message::assistant(&message.content));
                }
                Some(name) => {
                    session.append(Message::user(format!("[{name}] {}", message.content)));
                }
                None => session.append(Message::user(&message.content)),
            }
        }
        session
    }

    /// Run the team on `task` until the message budget is spent, an agent
    /// says the sentinel, or `cancel` fires.
    pub async fn run(&self, task: impl Into<String>, cancel: &CancellationToken) -> Result<TeamOutcome> {
        let mut transcript = vec![Message::user(task)];
        let mut speaker = 0;
        let mut messages = 0;

        info!(agents = self.agents.len(), mode = ?self.mode, "Starting team run");

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if messages >= self.max_messages {
                break StopReason::TurnLimit;
            }

            let agent = &self.agents[speaker];
            debug!(agent = %agent.name, message = messages + 1, "Agent speaking");
            let mut session = Self::session_for(agent, &transcript);
            let start = session.conversation().len();
            let outcome = self.loop_for(agent).run(&mut session, cancel).await?;

            let produced = &session.conversation().messages()[start..];
            let text = match (last_assistant_text(produced), &outcome.handoff) {
                (Some(text), _) => text.to_string(),
                (None, Some(target)) => format!("Transferred to {target}"),
                (None, None) => format!("(no reply: {})", outcome.stop_reason),
            };

            let said_sentinel = self.sentinel.as_deref().is_some_and(|s| text.contains(s));
            transcript.push(Message::assistant(text).named(&agent.name));
            messages += 1;

            if outcome.stop_reason == StopReason::Cancelled {
                break StopReason::Cancelled;
            }
            if said_sentinel {
                break StopReason::Sentinel;
            }

            speaker = match self.mode {
                TeamMode::RoundRobin => (speaker + 1) % self.agents.len(),
                TeamMode::Swarm => outcome
                    .handoff
                    .as_deref()
                    .and_then(|target| self.index_of(target))
                    .unwrap_or(speaker),
            };
        };

        info!(%stop_reason, messages, "Team run finished");
        Ok(TeamOutcome {
            transcript,
            stop_reason,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn speakers(outcome: &TeamOutcome) -> Vec<&str> {
        outcome
            .transcript
            .iter()
            .filter_map(|m| m.name.as_deref())
            .collect()
    }

    #[tokio::test]
    async fn round_robin_alternates_until_message_limit() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Remote work boosts productivity."),
            make_text_response("Collaboration suffers remotely."),
            make_text_response("Tools close that gap."),
            make_text_response("Not entirely."),
        ]));
        let team = Team::new(
            provider.clone(),
            Arc::new(ToolRegistry::new()),
            vec![
                AgentSpec::new("Advocate", "Argue for remote work."),
                AgentSpec::new("Critic", "Argue against remote work."),
            ],
            TeamMode::RoundRobin,
        )
        .unwrap()
        .with_max_messages(4);

        let outcome = team.run("Debate remote work.", &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.stop_reason, StopReason::TurnLimit);
        assert_eq!(outcome.messages, 4);
        assert_eq!(outcome.transcript.len(), 5);
        assert_eq!(speakers(&outcome), ["Advocate", "Critic", "Advocate", "Critic"]);
        assert_eq!(outcome.last_text(), Some("Not entirely."));
    }

    #[tokio::test]
    async fn other_agents_appear_as_tagged_user_messages() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("first point"),
            make_text_response("rebuttal"),
        ]));
        let team = Team::new(
            provider.clone(),
            Arc::new(ToolRegistry::new()),
            vec![AgentSpec::new("A", "You are A."), AgentSpec::new("B", "You are B.")],
            TeamMode::RoundRobin,
        )
        .unwrap()
        .with_max_messages(2);

        team.run("topic", &CancellationToken::new()).await.unwrap();

        let second = &provider.requests()[1].messages;
        assert_eq!(second[0].content, "You are B.");
        assert_eq!(second[1].content, "topic");
        assert_eq!(second[2].role, Role::User);
        assert_eq!(second[2].content, "[A] first point");
    }

    #[tokio::test]
    async fn sentinel_ends_the_run() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Here is the design."),
            make_text_response("Looks good. TERMINATE"),
        ]));
        let team = Team::new(
            provider,
            Arc::new(ToolRegistry::new()),
            vec![AgentSpec::new("Architect", "Design."), AgentSpec::new("Reviewer", "Review.")],
            TeamMode::RoundRobin,
        )
        .unwrap()
        .with_sentinel("TERMINATE");

        let outcome = team.run("Design a URL shortener", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Sentinel);
        assert_eq!(outcome.messages, 2);
    }

    #[tokio::test]
    async fn swarm_keeps_speaker_until_handoff() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            // Planner, turn one: plain answer, keeps the floor.
            make_text_response("Plan drafted."),
            // Planner, turn two: hands off.
            make_tool_call_response(vec![make_tool_call("transfer_to_Analyst", serde_json::json!({}))], ""),
            // Analyst runs its tool, then answers.
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "42"}))], ""),
            make_text_response("The answer is 42. TERMINATE"),
        ]));
        let team = Team::new(
            provider.clone(),
            Arc::new(registry_with_echo()),
            vec![
                AgentSpec::new("Planner", "Plan.").with_handoffs(&["Analyst"]),
                AgentSpec::new("Analyst", "Analyze.").with_tools(&["echo"]).with_handoffs(&["Planner"]),
            ],
            TeamMode::Swarm,
        )
        .unwrap()
        .with_sentinel("TERMINATE");

        let outcome = team.run("What is six times seven?", &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Sentinel);
        assert_eq!(speakers(&outcome), ["Planner", "Planner", "Analyst"]);
        assert_eq!(outcome.transcript[2].content, "Transferred to Analyst");
        // The planner cannot see the analyst's tools.
        let planner_tools: Vec<_> = provider.requests()[0].tools.iter().map(|t| t.name.clone()).collect();
        assert_eq!(planner_tools, ["transfer_to_Analyst"]);
    }

    #[tokio::test]
    async fn agent_without_text_leaves_a_note() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            // A spends its only model call on a tool and never answers.
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "x"}))], ""),
            make_text_response("Carrying on."),
        ]));
        let team = Team::new(
            provider.clone(),
            Arc::new(registry_with_echo()),
            vec![AgentSpec::new("A", "You are A.").with_tools(&["echo"]), AgentSpec::new("B", "You are B.")],
            TeamMode::RoundRobin,
        )
        .unwrap()
        .with_max_turns(1)
        .with_max_messages(2);

        let outcome = team.run("topic", &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.transcript[1].content, "(no reply: turn limit reached)");
        let seen_by_b = &provider.requests()[1].messages;
        assert_eq!(seen_by_b[2].content, "[A] (no reply: turn limit reached)");
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_at_build_time() {
        let err = Team::new(
            Arc::new(FailingProvider),
            Arc::new(ToolRegistry::new()),
            vec![AgentSpec::new("A", "a").with_tools(&["python_exec"])],
            TeamMode::RoundRobin,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("python_exec"));
    }

    #[tokio::test]
    async fn unknown_handoff_is_rejected() {
        let err = Team::new(
            Arc::new(FailingProvider),
            Arc::new(ToolRegistry::new()),
            vec![AgentSpec::new("A", "a").with_handoffs(&["Ghost"])],
            TeamMode::Swarm,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("Ghost"));
    }

    #[tokio::test]
    async fn cancelled_team_produces_no_messages() {
        let token = CancellationToken::new();
        token.cancel();
        let team = Team::new(
            Arc::new(FailingProvider),
            Arc::new(ToolRegistry::new()),
            vec![AgentSpec::new("A", "a")],
            TeamMode::RoundRobin,
        )
        .unwrap();

        let outcome = team.run("task", &token).await.unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.messages, 0);
    }

    #[test]
    fn agent_spec_from_config() {
        let config = TeamAgentConfig {
            name: "Analyst".into(),
            description: "Crunches numbers".into(),
            system_prompt: "Analyze.".into(),
            tools: vec!["python_exec".into()],
            handoffs: vec![],
        };
        let spec = AgentSpec::from(&config);
        assert_eq!(spec.name, "Analyst");
        assert_eq!(spec.tools, ["python_exec"]);
    }
}
