//! Stdio tool servers for toolchat.
//!
//! Tool servers are child processes speaking JSON-RPC 2.0 as newline-delimited
//! JSON over stdin/stdout, using the `initialize`, `tools/list` and
//! `tools/call` methods of the Model Context Protocol.
//!
//! - [`McpClient`] connects to a server and exposes its tools through
//!   `toolchat_core::RemoteToolServer`.
//! - [`serve`] hosts a `ToolRegistry` on any reader/writer pair, so
//!   `toolchat serve` can act as a tool server for another process.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::McpClient;
pub use server::{ServerInfo, serve};
