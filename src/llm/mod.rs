//! Text generation backends
//!
//! This module provides the collaborator contract used for session titling,
//! along with HTTP implementations for Ollama and OpenAI-compatible servers.

pub mod errors;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::*;
pub use provider::*;
pub use types::*;
