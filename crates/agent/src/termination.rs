//! Termination check: decides when a loop run is DONE.
//!
//! RUNNING moves to DONE when the model answers without tool calls, when its
//! text contains the sentinel, or when the turn ceiling is reached. DONE is
//! absorbing: later observations never change the recorded reason.

use toolchat_core::provider::ModelReply;
use toolchat_core::session::{StopReason, TerminationState};

#[derive(Debug, Clone)]
pub struct TerminationCheck {
    max_turns: Option<u32>,
    sentinel: Option<String>,
    state: TerminationState,
}

impl TerminationCheck {
    pub fn new(max_turns: Option<u32>, sentinel: Option<String>) -> Self {
        Self {
            max_turns,
            sentinel: sentinel.filter(|s| !s.is_empty()),
            state: TerminationState::Running,
        }
    }

    pub fn state(&self) -> TerminationState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Whether `text` contains the configured sentinel.
    pub fn mentions_sentinel(&self, text: &str) -> bool {
        self.sentinel.as_deref().is_some_and(|s| text.contains(s))
    }

    /// Evaluate one model reply. `turns` is the number of invocations so far,
    /// including the one that produced `reply`.
    pub fn observe(&mut self, reply: &ModelReply, turns: u32) -> TerminationState {
        if self.state.is_done() {
            return self.state;
        }

        let reason = if self.mentions_sentinel(reply.text()) {
            Some(StopReason::Sentinel)
        } else if reply.is_final() {
            Some(StopReason::FinalAnswer)
        } else if self.max_turns.is_some_and(|max| turns >= max) {
            Some(StopReason::TurnLimit)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.state = TerminationState::Done(reason);
        }
        self.state
    }

    /// Force DONE with `reason` unless already DONE.
    pub fn stop(&mut self, reason: StopReason) -> TerminationState {
        if !self.state.is_done() {
            self.state = TerminationState::Done(reason);
        }
        self.state
    }

    pub fn cancel(&mut self) -> TerminationState {
        self.stop(StopReason::Cancelled)
    }
}
