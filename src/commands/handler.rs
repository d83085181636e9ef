//! Executes session commands and renders their results

use chrono::{DateTime, Utc};
use std::{fmt::Write as _, sync::Arc, time::Duration};
use tracing::{debug, error};

use super::{DeleteTarget, SessionCommand};
use crate::session::{
    now, Session, SessionError, SessionIndex, SessionManager, SessionResult, TitleGenerator,
};

/// Sessions listed by `history` when no count is given
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Caller state a command may depend on
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub current_session_id: Option<String>,
}

impl CommandContext {
    pub fn with_current_session(session_id: impl Into<String>) -> Self {
        Self {
            current_session_id: Some(session_id.into()),
        }
    }

    fn current(&self) -> SessionResult<&str> {
        self.current_session_id
            .as_deref()
            .ok_or_else(|| SessionError::validation("There is no current session."))
    }
}

/// Result of a command, ready for display
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Text(String),
    /// A serialized export the host should offer as a download
    Export { file_name: String, json: String },
    Error(String),
}

/// Runs session commands against the store
pub struct CommandHandler {
    manager: Arc<SessionManager>,
    index: SessionIndex,
    titles: Option<Arc<TitleGenerator>>,
    history_limit: usize,
}

impl CommandHandler {
    pub fn new(manager: Arc<SessionManager>, titles: Option<Arc<TitleGenerator>>) -> Self {
        let index = SessionIndex::new(manager.database().clone()).with_events(manager.events().clone());
        Self {
            manager,
            index,
            titles,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Parse and execute a command line. Errors become `CommandOutput::Error`.
    pub async fn run(&self, input: &str, context: &CommandContext) -> CommandOutput {
        let result = match SessionCommand::parse(input) {
            Ok(command) => self.execute(command, context).await,
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            error!(command = %input.trim(), error = %e, "Session command failed");
            CommandOutput::Error(e.user_message())
        })
    }

    pub async fn execute(&self, command: SessionCommand, context: &CommandContext) -> SessionResult<CommandOutput> {
        debug!(?command, "Executing session command");

        match command {
            SessionCommand::History { limit } => {
                let sessions = self
                    .index
                    .recent_sessions(Some(limit.unwrap_or(self.history_limit)))
                    .await?;
                if sessions.is_empty() {
                    return Ok(CommandOutput::Text("No saved sessions.".to_string()));
                }
                Ok(CommandOutput::Text(render_sessions(&sessions, now())))
            }
            SessionCommand::Search { query } => {
                let sessions = self.index.search_sessions(&query).await?;
                if sessions.is_empty() {
                    return Ok(CommandOutput::Text(format!("No sessions match \"{}\".", query)));
                }
                Ok(CommandOutput::Text(render_sessions(&sessions, now())))
            }
            SessionCommand::Save => {
                self.manager.database().flush().await?;
                Ok(CommandOutput::Text("Sessions saved.".to_string()))
            }
            SessionCommand::Export => {
                let payload = self.manager.database().export_all().await?;
                let file_name = format!("sessions-{}.json", payload.exported_at.format("%Y%m%d-%H%M%S"));
                let json = serde_json::to_string_pretty(&payload)?;
                Ok(CommandOutput::Export { file_name, json })
            }
            SessionCommand::Delete(target) => self.delete(target, context).await,
            SessionCommand::Retitle { session_id } => {
                let titles = self
                    .titles
                    .as_ref()
                    .ok_or_else(|| SessionError::validation("Title generation is disabled."))?;
                let session_id = match session_id {
                    Some(id) => id,
                    None => context.current()?.to_string(),
                };
                titles.retitle(&session_id).await?;
                Ok(CommandOutput::Text(
                    "The session will get a new title shortly.".to_string(),
                ))
            }
        }
    }

    async fn delete(&self, target: DeleteTarget, context: &CommandContext) -> SessionResult<CommandOutput> {
        let message = match target {
            DeleteTarget::Current => {
                let session = self.index.delete_session(context.current()?).await?;
                format!("Deleted session \"{}\".", session.display_title())
            }
            DeleteTarget::Session(id) => {
                let session = self.index.delete_session(&id).await?;
                format!("Deleted session \"{}\".", session.display_title())
            }
            DeleteTarget::All => plural(self.index.delete_all().await?, "Deleted"),
            DeleteTarget::Range { start, end } => {
                plural(self.index.delete_range(start, end).await?, "Deleted")
            }
            DeleteTarget::OlderThan { days } => format!(
                "{} older than {} days.",
                plural(self.index.delete_older_than(days).await?, "Deleted").trim_end_matches('.'),
                days
            ),
        };
        Ok(CommandOutput::Text(message))
    }
}

fn plural(count: usize, verb: &str) -> String {
    match count {
        1 => format!("{} 1 session.", verb),
        n => format!("{} {} sessions.", verb, n),
    }
}

/// Time elapsed since `then`, to whole seconds
fn ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - then).to_std().unwrap_or(Duration::ZERO);
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

/// Numbered list in the order given, matching `delete range` numbering
pub fn render_sessions(sessions: &[Session], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for (i, session) in sessions.iter().enumerate() {
        let _ = write!(
            out,
            "{}. {} ({} messages, {}, {} ago)",
            i + 1,
            session.display_title(),
            session.message_count,
            session.state,
            ago(session.last_activity_at, now)
        );
        if !session.keywords.is_empty() {
            let _ = write!(out, " [{}]", session.keywords.join(", "));
        }
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}
