//! Session: one conversation plus its termination state.
//!
//! Sessions are passed explicitly into the loop; there is no ambient
//! per-user store. `reset()` replaces the session wholesale.

use serde::{Deserialize, Serialize};
use crate::message::{Conversation, ConversationId, Message};

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting tools.
    FinalAnswer,
    /// The model's text contained the sentinel token.
    Sentinel,
    /// The turn / message ceiling was reached.
    TurnLimit,
    /// The caller cancelled the run.
    Cancelled,
    /// The agent handed the conversation to another agent.
    Handoff,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FinalAnswer => "final answer",
            Self::Sentinel => "sentinel token",
            Self::TurnLimit => "turn limit reached",
            Self::Cancelled => "cancelled",
            Self::Handoff => "handed off",
        };
        f.write_str(s)
    }
}

/// RUNNING / DONE. DONE is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TerminationState {
    #[default]
    Running,
    Done(StopReason),
}

impl TerminationState {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Self::Running => None,
            Self::Done(reason) => Some(*reason),
        }
    }
}

/// One continuous conversation between a user and the chat loop.
#[derive(Debug, Clone)]
pub struct Session {
    conversation: Conversation,
    state: TerminationState,
    turns: u32,
    system_prompt: Option<String>,
}

impl Session {
    /// A fresh session with an empty conversation.
    pub fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            state: TerminationState::Running,
            turns: 0,
            system_prompt: None,
        }
    }

    /// A fresh session whose conversation starts with a system message.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let mut session = Self::new();
        session.conversation.append(Message::system(prompt.clone()));
        session.system_prompt = Some(prompt);
        session
    }

    pub fn id(&self) -> &ConversationId {
        &self.conversation.id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Append a message to the session's history.
    pub fn append(&mut self, message: Message) {
        self.conversation.append(message);
    }

    pub fn state(&self) -> TerminationState {
        self.state
    }

    /// Number of model invocations made in this session.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Count a model invocation and return the new total.
    pub fn begin_turn(&mut self) -> u32 {
        self.turns += 1;
        self.turns
    }

    /// Move the session to DONE. Has no effect if it is already DONE.
    pub fn finish(&mut self, reason: StopReason) -> StopReason {
        match self.state {
            TerminationState::Done(existing) => existing,
            TerminationState::Running => {
                self.state = TerminationState::Done(reason);
                reason
            }
        }
    }

    /// A new RUNNING session seeded with a copy of this session's history.
    ///
    /// Interactive chat uses this to carry context into the next user turn
    /// without re-opening a finished session.
    pub fn fork(&self) -> Self {
        let mut conversation = Conversation::new();
        for message in self.conversation.messages() {
            conversation.append(message.clone());
        }
        Self {
            conversation,
            state: TerminationState::Running,
            turns: 0,
            system_prompt: self.system_prompt.clone(),
        }
    }

    /// Discard this session and return a brand-new one with the same system prompt.
    pub fn reset(&self) -> Self {
        match &self.system_prompt {
            Some(prompt) => Self::with_system_prompt(prompt.clone()),
            None => Self::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn new_session_is_running() {
        let session = Session::new();
        assert_eq!(session.state(), TerminationState::Running);
        assert_eq!(session.turns(), 0);
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn system_prompt_is_first_message() {
        let session = Session::with_system_prompt("be brief");
        let first = &session.conversation().messages()[0];
        assert_eq!(first.role, Role::System);
        assert_eq!(first.content, "be brief");
    }

    #[test]
    fn finish_is_idempotent() {
        let mut session = Session::new();
        assert_eq!(session.finish(StopReason::FinalAnswer), StopReason::FinalAnswer);
        assert_eq!(session.finish(StopReason::TurnLimit), StopReason::FinalAnswer);
        assert_eq!(session.state(), TerminationState::Done(StopReason::FinalAnswer));
    }

    #[test]
    fn reset_creates_new_conversation() {
        let mut session = Session::with_system_prompt("sys");
        session.append(Message::user("hi"));
        session.begin_turn();
        session.finish(StopReason::FinalAnswer);

        let fresh = session.reset();
        assert_ne!(fresh.id(), session.id());
        assert_eq!(fresh.conversation().len(), 1);
        assert_eq!(fresh.state(), TerminationState::Running);
        assert_eq!(fresh.turns(), 0);
        // The old session is untouched.
        assert_eq!(session.conversation().len(), 2);
    }

    #[test]
    fn fork_keeps_history_but_not_state() {
        let mut session = Session::new();
        session.append(Message::user("hi"));
        session.begin_turn();
        session.finish(StopReason::FinalAnswer);

        let next = session.fork();
        assert_eq!(next.state(), TerminationState::Running);
        assert_eq!(next.turns(), 0);
        assert_eq!(next.conversation().len(), 1);
        assert_ne!(next.id(), session.id());
        assert!(session.state().is_done());
    }
}
