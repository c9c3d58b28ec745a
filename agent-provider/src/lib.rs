#![deny(missing_docs)]
//! LLM provider abstraction for the research-agent runtime.
//!
//! The LLM itself is out of scope for this crate — providers are opaque
//! `complete(request) -> response` clients. This crate only defines the
//! shared wire vocabulary (`ProviderMessage`, `ContentPart`, `ProviderRequest`,
//! `ProviderResponse`) and the [`Provider`] trait every concrete client
//! (Anthropic, OpenAI, a test double) implements.

pub mod provider;
pub mod types;

pub use provider::{Provider, ProviderError};
pub use types::*;
