//! Append-only message history addressed by chat log id

use std::sync::Arc;
use tracing::debug;

use super::{
    database::Database,
    error::SessionResult,
    types::{Message, NewMessage},
};

/// Access to chat logs by id.
///
/// Unknown log ids are reported as `NotFound`; a log only comes into being
/// together with its session.
#[derive(Clone)]
pub struct MessageLog {
    db: Arc<Database>,
}

impl MessageLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message, assigning an id and timestamp if it has none
    pub async fn add_message(&self, chat_log_id: &str, message: NewMessage) -> SessionResult<Message> {
        let message = self
            .db
            .append_message(chat_log_id, message.into_message())
            .await?;
        debug!(chat_log_id, message_id = %message.id, "Appended message");
        Ok(message)
    }

    pub async fn get_messages(
        &self,
        chat_log_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> SessionResult<Vec<Message>> {
        self.db.get_messages(chat_log_id, limit, offset).await
    }

    pub async fn get_recent_messages(&self, chat_log_id: &str, count: usize) -> SessionResult<Vec<Message>> {
        self.db.get_recent_messages(chat_log_id, count).await
    }

    /// Case-insensitive substring search over message content
    pub async fn search_messages(&self, chat_log_id: &str, term: &str) -> SessionResult<Vec<Message>> {
        let needle = term.to_lowercase();
        let messages = self.db.get_messages(chat_log_id, None, 0).await?;
        Ok(messages
            .into_iter()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect())
    }
}
