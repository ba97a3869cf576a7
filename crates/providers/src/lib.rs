//! Chat-completion providers for toolchat.
//!
//! All providers implement the `toolchat_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod azure;
pub mod openai_compat;
pub mod router;

pub use azure::AzureOpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
