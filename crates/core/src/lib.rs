//! # toolchat core
//!
//! Domain types, traits, and error definitions for the tool-augmented chat
//! loop. Everything the loop touches is defined here as a plain type or a
//! trait; providers, tool servers and built-in tools implement against it.
//!
//! - [`Conversation`]: ordered, append-only message history
//! - [`Provider`]: one model invocation
//! - [`ToolRegistry`]: the tool dispatcher (local and remote tools)
//! - [`Session`]: one conversation plus its termination state

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{ModelReply, Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use session::{Session, StopReason, TerminationState};
pub use tool::{RemoteToolServer, Tool, ToolBinding, ToolCall, ToolRegistry, ToolResult};
