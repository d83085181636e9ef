//! Session management and conversation persistence
//!
//! This module provides session lifecycle management, the per-session message
//! log, background title generation, search and bulk deletion, all backed by
//! a single SQLite store.

mod database;
mod error;
mod events;
mod message_log;
mod scheduler;
mod search;
mod session;
mod title;
mod types;

pub use database::*;
pub use error::*;
pub use events::*;
pub use message_log::*;
pub use scheduler::*;
pub use search::*;
pub use session::*;
pub use title::*;
pub use types::*;
