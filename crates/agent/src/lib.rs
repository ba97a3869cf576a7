//! The chat loop and multi-agent teams.
//!
//! A run follows an **Invoke → Check → Dispatch** cycle:
//!
//! 1. **Invoke** the model with the conversation and the tool descriptors
//! 2. **Check** termination: final answer, sentinel, or turn ceiling
//! 3. **Dispatch** every requested tool call and append the results
//!
//! The cycle repeats until the check fires or the run is cancelled. A
//! [`Team`] runs one loop per agent turn over a shared transcript.

pub mod artifacts;
pub mod loop_runner;
pub mod team;
pub mod termination;

#[cfg(test)]
mod test_helpers;

pub use artifacts::{png_artifacts, strip_sentinel};
pub use loop_runner::{ChatLoop, HANDOFF_PREFIX, LoopOutcome};
pub use team::{AgentSpec, Team, TeamOutcome};
pub use termination::TerminationCheck;
