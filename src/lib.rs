//! Conversation sessions between pairs of participants.
//!
//! Sessions are created or reused through [`session::SessionManager`], their
//! messages live in a [`session::MessageLog`], and a
//! [`session::SessionScheduler`] deactivates idle sessions and asks a
//! [`llm::TextGenerator`] for titles in the background. Everything is stored
//! in a single SQLite database.

pub mod cli;
pub mod commands;
pub mod config;
pub mod llm;
pub mod session;
