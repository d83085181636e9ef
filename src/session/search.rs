//! Session search and bulk deletion

use chrono::{DateTime, Duration, Utc};
use std::{collections::HashSet, sync::Arc};
use tracing::info;

use super::{
    database::Database,
    error::{SessionError, SessionResult},
    events::{EventSender, SessionEvent},
    types::{now, Session},
};

/// Keyword terms shorter than this are ignored
const MIN_KEYWORD_TERM_LEN: usize = 3;

/// Whether a session's display title or keywords match a free-text query
pub fn matches_query(session: &Session, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return false;
    }

    if session.display_title().to_lowercase().contains(&query) {
        return true;
    }

    let keywords: Vec<String> = session.keywords.iter().map(|k| k.to_lowercase()).collect();
    query
        .split_whitespace()
        .filter(|term| term.chars().count() >= MIN_KEYWORD_TERM_LEN)
        .any(|term| keywords.iter().any(|keyword| keyword.contains(term)))
}

/// Keep the sessions matching `query`, de-duplicated by id, order preserved
pub fn filter_sessions(sessions: Vec<Session>, query: &str) -> Vec<Session> {
    let mut seen = HashSet::new();
    sessions
        .into_iter()
        .filter(|session| matches_query(session, query))
        .filter(|session| seen.insert(session.id.clone()))
        .collect()
}

/// Pick a 1-based inclusive range out of a recency-ordered list.
///
/// `end` is clamped to the list; a `start` past the end selects nothing.
pub fn select_range(sessions: &[Session], start: usize, end: usize) -> SessionResult<&[Session]> {
    if start == 0 {
        return Err(SessionError::validation("session numbers start at 1"));
    }
    if end < start {
        return Err(SessionError::validation(format!(
            "range end {} is before range start {}",
            end, start
        )));
    }
    if start > sessions.len() {
        return Ok(&[]);
    }
    Ok(&sessions[start - 1..end.min(sessions.len())])
}

/// Search and bulk operations over the session store
#[derive(Clone)]
pub struct SessionIndex {
    db: Arc<Database>,
    events: EventSender,
}

impl SessionIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            events: EventSender::default(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub async fn search_sessions(&self, query: &str) -> SessionResult<Vec<Session>> {
        self.db.search_sessions(query).await
    }

    /// Sessions ordered the way range deletion numbers them
    pub async fn recent_sessions(&self, limit: Option<usize>) -> SessionResult<Vec<Session>> {
        let mut sessions = self.db.get_all_sessions().await?;
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    pub async fn delete_session(&self, id: &str) -> SessionResult<Session> {
        let session = self.db.delete_session(id).await?;
        self.events.emit(SessionEvent::Deleted {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    /// Delete sessions `start..=end` (1-based) of the recency-ordered list
    pub async fn delete_range(&self, start: usize, end: usize) -> SessionResult<usize> {
        let sessions = self.db.get_all_sessions().await?;
        let ids: Vec<String> = select_range(&sessions, start, end)?
            .iter()
            .map(|s| s.id.clone())
            .collect();

        let deleted = self.db.delete_sessions(&ids).await?;
        for id in ids {
            self.events.emit(SessionEvent::Deleted { session_id: id });
        }
        info!(start, end, deleted, "Deleted session range");
        Ok(deleted)
    }

    /// Delete sessions with no activity in the last `days` days
    pub async fn delete_older_than(&self, days: u32) -> SessionResult<usize> {
        self.delete_older_than_at(days, now()).await
    }

    pub async fn delete_older_than_at(&self, days: u32, now: DateTime<Utc>) -> SessionResult<usize> {
        let cutoff = Duration::try_days(i64::from(days))
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| SessionError::validation("day count is too large"))?;

        let deleted = self.db.delete_sessions_inactive_since(cutoff).await?;
        self.emit_deleted(&deleted);
        info!(days, deleted = deleted.len(), "Deleted old sessions");
        Ok(deleted.len())
    }

    pub async fn delete_all(&self) -> SessionResult<usize> {
        let deleted = self.db.delete_all_sessions().await?;
        self.emit_deleted(&deleted);
        info!(deleted = deleted.len(), "Deleted all sessions");
        Ok(deleted.len())
    }

    fn emit_deleted(&self, ids: &[String]) {
        for id in ids {
            self.events.emit(SessionEvent::Deleted {
                session_id: id.clone(),
            });
        }
    }
}
