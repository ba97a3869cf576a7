//! The chat loop: model invocation, termination check, tool dispatch, repeat.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use toolchat_config::AppConfig;
use toolchat_core::error::ToolError;
use toolchat_core::event::{DomainEvent, EventBus};
use toolchat_core::message::{Message, MessageToolCall, Role};
use toolchat_core::provider::{ModelReply, Provider, ProviderRequest, ToolDefinition};
use toolchat_core::session::{Session, StopReason};
use toolchat_core::tool::{ToolRegistry, ToolResult};
use tracing::{debug, info, warn};
use crate::artifacts::strip_sentinel;
use crate::termination::TerminationCheck;

/// Prefix of the synthetic tools that pass the floor to another agent.
pub const HANDOFF_PREFIX: &str = "transfer_to_";

/// What one `run` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Text of the last assistant message, sentinel removed. `None` when the
    /// run ended without any assistant text.
    pub answer: Option<String>,
    pub stop_reason: StopReason,
    /// Model invocations made in the session.
    pub turns: u32,
    /// Tool calls dispatched during this run.
    pub tool_calls: usize,
    /// Agent the floor was handed to, if a handoff tool was called.
    pub handoff: Option<String>,
}

/// Drives one session from its current history to DONE.
pub struct ChatLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    /// When set, only these registry tools are offered and callable.
    tool_subset: Option<Vec<String>>,
    /// Agents this loop may hand off to.
    handoffs: Vec<String>,
    max_turns: Option<u32>,
    sentinel: Option<String>,
    history_window: Option<usize>,
    system_prompt: Option<String>,
    agent_name: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl ChatLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            tool_subset: None,
            handoffs: Vec::new(),
            max_turns: Some(10),
            sentinel: None,
            history_window: None,
            system_prompt: None,
            agent_name: None,
            event_bus: None,
        }
    }

    /// A loop using the model, sampling and `[loop]` settings from config.
    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let mut chat = Self::new(provider, &config.default_model, tools)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_turns(config.chat_loop.max_turns)
            .with_system_prompt(&config.system_prompt);
        if let Some(sentinel) = &config.chat_loop.sentinel {
            chat = chat.with_sentinel(sentinel);
        }
        if let Some(window) = config.chat_loop.max_history_messages {
            chat = chat.with_history_window(window);
        }
        chat
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Ceiling on model invocations per session.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = Some(max);
        self
    }

    /// Remove the turn ceiling.
    pub fn without_turn_limit(mut self) -> Self {
        self.max_turns = None;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }

    /// Submit at most `max` recent messages per invocation.
    pub fn with_history_window(mut self, max: usize) -> Self {
        self.history_window = Some(max);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Prepended as a system message when the session is empty.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Tag assistant messages and events with an agent name.
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Restrict the loop to the named registry tools.
    pub fn with_tool_subset(mut self, names: Vec<String>) -> Self {
        self.tool_subset = Some(names);
        self
    }

    /// Offer a `transfer_to_<agent>` tool for each target.
    pub fn with_handoffs(mut self, targets: Vec<String>) -> Self {
        self.handoffs = targets;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn sentinel(&self) -> Option<&str> {
        self.sentinel.as_deref()
    }

    /// Tool descriptors sent with every invocation.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = match &self.tool_subset {
            Some(names) => self.tools.definitions_for(names),
            None => self.tools.definitions(),
        };
        definitions.extend(self.handoffs.iter().map(|target| handoff_definition(target)));
        definitions
    }

    fn is_callable(&self, name: &str) -> bool {
        match &self.tool_subset {
            Some(names) => names.iter().any(|n| n == name) && self.tools.get(name).is_some(),
            None => self.tools.get(name).is_some(),
        }
    }

    fn handoff_target(&self, name: &str) -> Option<&str> {
        let target = name.strip_prefix(HANDOFF_PREFIX)?;
        self.handoffs.iter().find(|h| h.as_str() == target).map(|h| h.as_str())
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Append a user message, then run.
    pub async fn ask(
        &self,
        session: &mut Session,
        text: impl Into<String>,
        cancel: &CancellationToken,
    ) -> toolchat_core::Result<LoopOutcome> {
        if !session.state().is_done() {
            self.ensure_system_prompt(session);
            session.append(Message::user(text));
        }
        self.run(session, cancel).await
    }

    fn ensure_system_prompt(&self, session: &mut Session) {
        if session.conversation().is_empty()
            && let Some(prompt) = &self.system_prompt
        {
            session.append(Message::system(prompt));
        }
    }

    /// Run until the termination check fires.
    ///
    /// A session that is already DONE is returned as-is without calling the
    /// model. Provider errors are returned and leave the session RUNNING.
    pub async fn run(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> toolchat_core::Result<LoopOutcome> {
        if let Some(reason) = session.state().stop_reason() {
            debug!(conversation_id = %session.id(), %reason, "Session already finished");
            let from = session
                .conversation()
                .messages()
                .iter()
                .rposition(|m| m.role == Role::User)
                .map_or(0, |i| i + 1);
            return Ok(self.outcome(session, from, reason, 0, None));
        }

        self.ensure_system_prompt(session);
        info!(
            conversation_id = %session.id(),
            agent = self.agent_name.as_deref().unwrap_or("assistant"),
            messages = session.conversation().len(),
            "Running chat loop"
        );

        let start = session.conversation().len();
        let definitions = self.definitions();
        let mut check = TerminationCheck::new(self.max_turns, self.sentinel.clone());
        let mut tool_calls = 0;
        let mut handoff = None;

        while !check.is_done() {
            if cancel.is_cancelled() {
                check.cancel();
                break;
            }

            let turn = session.begin_turn();
            let messages = match self.history_window {
                Some(max) => session.conversation().window(max),
                None => session.conversation().snapshot(),
            };
            debug!(conversation_id = %session.id(), turn, messages = messages.len(), "Invoking model");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
                stop: vec![],
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(conversation_id = %session.id(), "Cancelled during model invocation");
                    check.cancel();
                    break;
                }
                response = self.provider.complete(request) => response?,
            };

            let reply = response.reply();
            self.publish(DomainEvent::ResponseGenerated {
                conversation_id: session.id().to_string(),
                agent: self.agent_name.clone(),
                model: response.model.clone(),
                tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
                tool_calls: response.message.tool_calls.len(),
                timestamp: Utc::now(),
            });

            let mut message = response.message;
            if let Some(name) = &self.agent_name {
                message = message.named(name);
            }
            session.append(message);
            check.observe(&reply, turn);

            if let ModelReply::ToolCalls { calls, .. } = &reply {
                tool_calls += calls.len();
                let batch = self.dispatch_batch(session, calls, cancel).await;
                if batch.cancelled {
                    check.cancel();
                } else if let Some(target) = batch.handoff {
                    handoff = Some(target);
                    check.stop(StopReason::Handoff);
                }
            }
        }

        let reason = check.state().stop_reason().unwrap_or(StopReason::Cancelled);
        let reason = session.finish(reason);
        self.publish(DomainEvent::LoopFinished {
            conversation_id: session.id().to_string(),
            stop_reason: reason,
            turns: session.turns(),
            timestamp: Utc::now(),
        });
        info!(conversation_id = %session.id(), %reason, turns = session.turns(), tool_calls, "Chat loop finished");

        Ok(self.outcome(session, start, reason, tool_calls, handoff))
    }

    /// `from` is the index of the first message the run produced.
    fn outcome(
        &self,
        session: &Session,
        from: usize,
        stop_reason: StopReason,
        tool_calls: usize,
        handoff: Option<String>,
    ) -> LoopOutcome {
        let produced = session.conversation().messages().get(from..).unwrap_or_default();
        let answer = last_assistant_text(produced).map(|text| match &self.sentinel {
            Some(s) => strip_sentinel(text, s),
            None => text.to_string(),
        });

        LoopOutcome {
            answer,
            stop_reason,
            turns: session.turns(),
            tool_calls,
            handoff,
        }
    }

    /// Resolve every call of a batch, in order, appending one tool message
    /// per call. After cancellation the remaining calls get failed results.
    async fn dispatch_batch(
        &self,
        session: &mut Session,
        calls: &[MessageToolCall],
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for call in calls {
            self.publish(DomainEvent::ToolRequested {
                agent: self.agent_name.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                timestamp: Utc::now(),
            });

            let start = Instant::now();
            let result = if outcome.cancelled || cancel.is_cancelled() {
                outcome.cancelled = true;
                ToolResult::failure("Error: cancelled before execution").for_call(&call.id)
            } else if let Some(target) = self.handoff_target(&call.name) {
                debug!(from = ?self.agent_name, to = %target, "Handoff requested");
                outcome.handoff.get_or_insert_with(|| target.to_string());
                ToolResult::ok(format!("Transferred to {target}")).for_call(&call.id)
            } else if !self.is_callable(&call.name) {
                self.unknown_tool(call)
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(tool = %call.name, call_id = %call.id, "Cancelled during tool call");
                        outcome.cancelled = true;
                        ToolResult::failure("Error: cancelled").for_call(&call.id)
                    }
                    result = self.tools.dispatch(call) => result,
                }
            };

            self.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
                success: result.success,
                duration_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            session.append(Message::tool_result(&call.id, result.output));
        }

        outcome
    }

    fn unknown_tool(&self, call: &MessageToolCall) -> ToolResult {
        let error = ToolError::NotFound(call.name.clone());
        warn!(tool = %call.name, call_id = %call.id, "Model called an unavailable tool");
        let mut available: Vec<String> = self.definitions().into_iter().map(|d| d.name).collect();
        let mut seen = HashSet::new();
        available.retain(|n| seen.insert(n.clone()));
        let listed = if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        };
        ToolResult::failure(format!("Error: {error}. Available tools: {listed}")).for_call(&call.id)
    }
}

#[derive(Default)]
struct BatchOutcome {
    cancelled: bool,
    handoff: Option<String>,
}

/// Trimmed text of the last assistant message with any text in `messages`.
pub fn last_assistant_text(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.content.trim())
        .find(|text| !text.is_empty())
}

fn handoff_definition(target: &str) -> ToolDefinition {
    ToolDefinition {
        name: format!("{HANDOFF_PREFIX}{target}"),
        description: format!("Hand off the conversation to {target}."),
        parameters: serde_json::json!({ "type": "object", "properties": {} }),
    }
}
