//! Database layer for session persistence

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::{path::Path, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    error::{SessionError, SessionResult},
    search,
    types::{
        now, ChatLog, ExportPayload, ImportSummary, Message, ParticipantPair, Session, SessionState,
        TitleState, EXPORT_VERSION,
    },
};

const SESSION_COLUMNS: &str = "id, participants, state, created_at, last_activity_at, \
     message_count, label, title, keywords, chat_log_id, title_state";

const MESSAGE_COLUMNS: &str =
    "id, sender_id, content, timestamp, message_type, images, metadata";

/// SQLite-backed store for sessions and their chat logs.
///
/// The connection sits behind a single async mutex, so every call runs to
/// completion before the next one starts. Operations touching more than one
/// record run inside one transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SessionResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        debug!("Opened session database at {}", db_path.display());

        Self::from_connection(conn).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> SessionResult<Self> {
        Self::from_connection(Connection::open_in_memory()?).await
    }

    async fn from_connection(conn: Connection) -> SessionResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables().await?;
        db.recover_interrupted_titles().await?;
        Ok(db)
    }

    /// Create the necessary database tables
    async fn create_tables(&self) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                participants TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_activity_at INTEGER NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                label TEXT NOT NULL,
                title TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                chat_log_id TEXT NOT NULL,
                title_state TEXT NOT NULL DEFAULT 'idle'
            );

            CREATE TABLE IF NOT EXISTS session_participants (
                session_id TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                display_tag TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (session_id, position)
            );

            CREATE TABLE IF NOT EXISTS chat_logs (
                id TEXT PRIMARY KEY,
                session_id TEXT,
                created_at INTEGER NOT NULL,
                last_message_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                chat_log_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                message_type TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (chat_log_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_last_activity ON sessions (last_activity_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions (created_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_chat_log_id ON sessions (chat_log_id);
            CREATE INDEX IF NOT EXISTS idx_session_participants_participant
                ON session_participants (participant_id);
            CREATE INDEX IF NOT EXISTS idx_chat_logs_session_id ON chat_logs (session_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_log_message_id
                ON messages (chat_log_id, id);",
        )?;
        Ok(())
    }

    /// A session left in `generating` belongs to a process that died mid-call
    async fn recover_interrupted_titles(&self) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        let reset = conn.execute(
            "UPDATE sessions SET title_state = ?1 WHERE title_state = ?2",
            params![TitleState::Idle, TitleState::Generating],
        )?;
        if reset > 0 {
            warn!(sessions = reset, "Reset interrupted title generation");
        }
        Ok(())
    }

    /// Insert a new session together with its empty chat log
    pub async fn insert_session(&self, session: &Session, log: &ChatLog) -> SessionResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        write_session(&tx, session)?;
        write_chat_log(&tx, log)?;
        tx.commit()?;

        debug!(session_id = %session.id, chat_log_id = %log.id, "Inserted session");
        Ok(())
    }

    /// Insert or replace a session record
    pub async fn save_session(&self, session: &Session) -> SessionResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        write_session(&tx, session)?;
        tx.commit()?;
        Ok(())
    }

    /// Get a session by ID
    pub async fn load_session(&self, id: &str) -> SessionResult<Session> {
        self.find_session(id)
            .await?
            .ok_or_else(|| SessionError::not_found("session", id))
    }

    pub async fn find_session(&self, id: &str) -> SessionResult<Option<Session>> {
        let conn = self.conn.lock().await;
        Ok(select_session(&conn, id)?)
    }

    /// All sessions, most recently active first
    pub async fn get_all_sessions(&self) -> SessionResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM sessions ORDER BY last_activity_at DESC, created_at DESC, rowid DESC",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// All sessions, newest first by creation time
    pub async fn sessions_by_creation(&self) -> SessionResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC, rowid DESC",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub async fn sessions_in_state(&self, state: SessionState) -> SessionResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM sessions WHERE state = ?1 ORDER BY last_activity_at ASC",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([state], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Sessions a participant takes part in, most recently active first
    pub async fn sessions_for_participant(&self, participant_id: &str) -> SessionResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM sessions WHERE id IN (
                 SELECT session_id FROM session_participants WHERE participant_id = ?1
             ) ORDER BY last_activity_at DESC",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([participant_id], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Ids of sessions that may have a title generated right now
    pub async fn sessions_eligible_for_title(&self, min_messages: u32) -> SessionResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id FROM sessions
             WHERE title IS NULL AND message_count >= ?1 AND title_state = ?2
             ORDER BY last_activity_at DESC",
        )?;
        let ids = stmt
            .query_map(params![min_messages, TitleState::Idle], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Set a session title, and its keywords when given
    pub async fn update_session_title(
        &self,
        id: &str,
        title: &str,
        keywords: Option<&[String]>,
    ) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        let updated = match keywords {
            Some(keywords) => conn.execute(
                "UPDATE sessions SET title = ?1, keywords = ?2 WHERE id = ?3",
                params![title, serde_json::to_string(keywords)?, id],
            )?,
            None => conn.execute(
                "UPDATE sessions SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?,
        };
        if updated == 0 {
            return Err(SessionError::not_found("session", id));
        }
        Ok(())
    }

    pub async fn set_session_state(&self, id: &str, state: SessionState) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE sessions SET state = ?1 WHERE id = ?2",
            params![state, id],
        )?;
        if updated == 0 {
            return Err(SessionError::not_found("session", id));
        }
        Ok(())
    }

    /// Move an active session to inactive if it has been idle since `cutoff`.
    ///
    /// Returns `false` when the session is no longer active or saw activity at
    /// or after `cutoff`.
    pub async fn deactivate_if_idle(&self, id: &str, cutoff: DateTime<Utc>) -> SessionResult<bool> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE sessions SET state = ?1
             WHERE id = ?2 AND state = ?3 AND last_activity_at < ?4",
            params![
                SessionState::Inactive,
                id,
                SessionState::Active,
                cutoff.timestamp_millis()
            ],
        )?;
        Ok(updated == 1)
    }

    /// Take over a session for `participants` if it still has no messages.
    ///
    /// With `relabel` the label follows the new pair and any title is cleared.
    /// Returns the updated session, or `None` once the session is gone or has
    /// received a message.
    pub async fn claim_empty_session(
        &self,
        id: &str,
        participants: &ParticipantPair,
        relabel: bool,
        at: DateTime<Utc>,
    ) -> SessionResult<Option<Session>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let participants_json = serde_json::to_string(participants)?;
        let claimed = if relabel {
            tx.execute(
                "UPDATE sessions SET participants = ?1, label = ?2, state = ?3,
                     last_activity_at = MAX(last_activity_at, ?4),
                     title = NULL, keywords = '[]', title_state = ?5
                 WHERE id = ?6 AND message_count = 0",
                params![
                    participants_json,
                    participants.label(),
                    SessionState::Active,
                    at.timestamp_millis(),
                    TitleState::Idle,
                    id
                ],
            )?
        } else {
            tx.execute(
                "UPDATE sessions SET participants = ?1, state = ?2,
                     last_activity_at = MAX(last_activity_at, ?3)
                 WHERE id = ?4 AND message_count = 0",
                params![participants_json, SessionState::Active, at.timestamp_millis(), id],
            )?
        };
        if claimed == 0 {
            return Ok(None);
        }

        write_participants(&tx, id, participants)?;
        let session = select_session(&tx, id)?;
        tx.commit()?;
        Ok(session)
    }

    /// Atomically claim a session for title generation.
    ///
    /// Returns `false` when the session is not eligible, including when another
    /// caller already holds the claim.
    pub async fn begin_title_generation(&self, id: &str, min_messages: u32) -> SessionResult<bool> {
        let conn = self.conn.lock().await;
        let claimed = conn.execute(
            "UPDATE sessions SET title_state = ?1
             WHERE id = ?2 AND title IS NULL AND message_count >= ?3 AND title_state = ?4",
            params![TitleState::Generating, id, min_messages, TitleState::Idle],
        )?;
        Ok(claimed == 1)
    }

    /// Release a generation claim, storing the title and keywords on success
    pub async fn finish_title_generation(
        &self,
        id: &str,
        generated: Option<(&str, &[String])>,
    ) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        let updated = match generated {
            Some((title, keywords)) => conn.execute(
                "UPDATE sessions SET title = ?1, keywords = ?2, title_state = ?3 WHERE id = ?4",
                params![title, serde_json::to_string(keywords)?, TitleState::Done, id],
            )?,
            None => conn.execute(
                "UPDATE sessions SET title_state = ?1 WHERE id = ?2",
                params![TitleState::Done, id],
            )?,
        };
        if updated == 0 {
            return Err(SessionError::not_found("session", id));
        }
        Ok(())
    }

    /// Clear a session's title so the next tick generates a new one
    pub async fn reset_title_generation(&self, id: &str) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        let state: Option<TitleState> = conn
            .query_row(
                "SELECT title_state FROM sessions WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        match state {
            None => Err(SessionError::not_found("session", id)),
            Some(TitleState::Generating) => Err(SessionError::validation(
                "a title is being generated for this session right now",
            )),
            Some(_) => {
                conn.execute(
                    "UPDATE sessions SET title = NULL, keywords = '[]', title_state = ?1 WHERE id = ?2",
                    params![TitleState::Idle, id],
                )?;
                Ok(())
            }
        }
    }

    /// Delete a session and its chat log
    pub async fn delete_session(&self, id: &str) -> SessionResult<Session> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let session = select_session(&tx, id)?.ok_or_else(|| SessionError::not_found("session", id))?;
        remove_session_rows(&tx, &session.id, &session.chat_log_id)?;
        tx.commit()?;

        info!(session_id = %id, "Deleted session");
        Ok(session)
    }

    /// Delete several sessions in one transaction; unknown ids are skipped
    pub async fn delete_sessions(&self, ids: &[String]) -> SessionResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in ids {
            if let Some(session) = select_session(&tx, id)? {
                remove_session_rows(&tx, &session.id, &session.chat_log_id)?;
                deleted += 1;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Delete every session whose last activity precedes `cutoff`, returning their ids
    pub async fn delete_sessions_inactive_since(&self, cutoff: DateTime<Utc>) -> SessionResult<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let targets = {
            let mut stmt =
                tx.prepare("SELECT id, chat_log_id FROM sessions WHERE last_activity_at < ?1")?;
            let rows = stmt
                .query_map([cutoff.timestamp_millis()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        for (id, chat_log_id) in &targets {
            remove_session_rows(&tx, id, chat_log_id)?;
        }
        tx.commit()?;
        Ok(targets.into_iter().map(|(id, _)| id).collect())
    }

    /// Delete every session and every chat log, returning the session ids
    pub async fn delete_all_sessions(&self) -> SessionResult<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let ids = {
            let mut stmt = tx.prepare("SELECT id FROM sessions")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            rows
        };
        tx.execute_batch(
            "DELETE FROM messages;
             DELETE FROM chat_logs;
             DELETE FROM session_participants;
             DELETE FROM sessions;",
        )?;
        tx.commit()?;
        Ok(ids)
    }

    /// Insert or replace a chat log, including all of its messages
    pub async fn save_chat_log(&self, log: &ChatLog) -> SessionResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        write_chat_log(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    pub async fn load_chat_log(&self, id: &str) -> SessionResult<ChatLog> {
        let conn = self.conn.lock().await;
        let mut log = select_chat_log_header(&conn, id)?
            .ok_or_else(|| SessionError::not_found("chat log", id))?;
        log.messages = select_messages(&conn, id, None, 0)?;
        Ok(log)
    }

    /// Delete a chat log that no session refers to any more
    pub async fn delete_chat_log(&self, id: &str) -> SessionResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        if select_chat_log_header(&tx, id)?.is_none() {
            return Err(SessionError::not_found("chat log", id));
        }
        let owner: Option<String> = tx
            .query_row("SELECT id FROM sessions WHERE chat_log_id = ?1", [id], |row| row.get(0))
            .optional()?;
        if let Some(owner) = owner {
            return Err(SessionError::validation(format!(
                "chat log {} still belongs to session {}; delete the session instead",
                id, owner
            )));
        }
        tx.execute("DELETE FROM messages WHERE chat_log_id = ?1", [id])?;
        tx.execute("DELETE FROM chat_logs WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    /// Append a message to a chat log.
    ///
    /// The log's `last_message_at` and the owning session's message count,
    /// activity time and state change in the same transaction.
    pub async fn append_message(&self, chat_log_id: &str, message: Message) -> SessionResult<Message> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        if select_chat_log_header(&tx, chat_log_id)?.is_none() {
            return Err(SessionError::not_found("chat log", chat_log_id));
        }

        let duplicate: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE chat_log_id = ?1 AND id = ?2)",
            params![chat_log_id, message.id],
            |row| row.get(0),
        )?;
        if duplicate {
            return Err(SessionError::validation(format!(
                "message {} is already in chat log {}",
                message.id, chat_log_id
            )));
        }

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE chat_log_id = ?1",
            [chat_log_id],
            |row| row.get(0),
        )?;
        insert_message(&tx, chat_log_id, seq, &message)?;

        let at = message.timestamp.timestamp_millis();
        tx.execute(
            "UPDATE chat_logs SET last_message_at = MAX(last_message_at, ?1) WHERE id = ?2",
            params![at, chat_log_id],
        )?;
        tx.execute(
            "UPDATE sessions
             SET message_count = message_count + 1,
                 last_activity_at = MAX(last_activity_at, ?1),
                 state = ?2
             WHERE chat_log_id = ?3",
            params![at, SessionState::Active, chat_log_id],
        )?;
        tx.commit()?;

        Ok(message)
    }

    /// Messages in sequence order; `limit = None` returns everything after `offset`
    pub async fn get_messages(
        &self,
        chat_log_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> SessionResult<Vec<Message>> {
        let conn = self.conn.lock().await;
        if select_chat_log_header(&conn, chat_log_id)?.is_none() {
            return Err(SessionError::not_found("chat log", chat_log_id));
        }
        Ok(select_messages(&conn, chat_log_id, limit, offset)?)
    }

    /// The last `count` messages, oldest first
    pub async fn get_recent_messages(&self, chat_log_id: &str, count: usize) -> SessionResult<Vec<Message>> {
        let conn = self.conn.lock().await;
        if select_chat_log_header(&conn, chat_log_id)?.is_none() {
            return Err(SessionError::not_found("chat log", chat_log_id));
        }
        let sql = format!(
            "SELECT {} FROM (
                 SELECT seq, {} FROM messages WHERE chat_log_id = ?1 ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
            MESSAGE_COLUMNS, MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params![chat_log_id, to_sql_limit(count)], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    pub async fn get_message_count(&self, chat_log_id: &str) -> SessionResult<u32> {
        let conn = self.conn.lock().await;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_log_id = ?1",
            [chat_log_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Sessions whose title or keywords match `query`, most recently active first
    pub async fn search_sessions(&self, query: &str) -> SessionResult<Vec<Session>> {
        let sessions = self.get_all_sessions().await?;
        Ok(search::filter_sessions(sessions, query))
    }

    /// Dump every session and chat log
    pub async fn export_all(&self) -> SessionResult<ExportPayload> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "SELECT {} FROM sessions ORDER BY created_at ASC, id ASC",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, session_id, created_at, last_message_at
             FROM chat_logs ORDER BY created_at ASC, id ASC",
        )?;
        let mut chat_logs = stmt
            .query_map([], chat_log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for log in &mut chat_logs {
            log.messages = select_messages(&conn, &log.id, None, 0)?;
        }

        debug!(
            sessions = sessions.len(),
            chat_logs = chat_logs.len(),
            "Exported session store"
        );

        Ok(ExportPayload {
            version: EXPORT_VERSION,
            exported_at: now(),
            sessions,
            chat_logs,
        })
    }

    /// Upsert every record of an export payload in one transaction
    pub async fn import_all(&self, payload: ExportPayload) -> SessionResult<ImportSummary> {
        if payload.version != EXPORT_VERSION {
            return Err(SessionError::UnsupportedVersion(payload.version));
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        for log in &payload.chat_logs {
            write_chat_log(&tx, log)?;
        }

        for session in &payload.sessions {
            let mut session = session.clone();
            if session.title_state == TitleState::Generating {
                session.title_state = TitleState::Idle;
            }

            // An overwritten session whose log changed leaves the old log behind
            if let Some(existing) = select_session(&tx, &session.id)? {
                let replaced = existing.chat_log_id != session.chat_log_id;
                let imported = payload.chat_logs.iter().any(|log| log.id == existing.chat_log_id);
                if replaced && !imported {
                    remove_chat_log_rows(&tx, &existing.chat_log_id)?;
                    debug!(
                        session_id = %session.id,
                        chat_log_id = %existing.chat_log_id,
                        "Dropped chat log replaced by import"
                    );
                }
            }
            write_session(&tx, &session)?;

            if select_chat_log_header(&tx, &session.chat_log_id)?.is_none() {
                write_chat_log(&tx, &ChatLog::for_session(&session))?;
            }
            tx.execute(
                "UPDATE sessions SET message_count =
                     (SELECT COUNT(*) FROM messages WHERE messages.chat_log_id = sessions.chat_log_id)
                 WHERE id = ?1",
                [&session.id],
            )?;
        }

        tx.commit()?;

        let summary = ImportSummary {
            sessions: payload.sessions.len(),
            chat_logs: payload.chat_logs.len(),
        };
        info!(
            sessions = summary.sessions,
            chat_logs = summary.chat_logs,
            "Imported sessions"
        );
        Ok(summary)
    }

    /// Hold the connection so tests can queue calls in a known order
    #[cfg(test)]
    pub(crate) async fn lock_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Checkpoint the write-ahead log into the main database file
    pub async fn flush(&self) -> SessionResult<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        debug!("Flushed session database");
        Ok(())
    }
}

fn write_session(conn: &Connection, session: &Session) -> SessionResult<()> {
    conn.execute(
        "INSERT INTO sessions (
            id, participants, state, created_at, last_activity_at,
            message_count, label, title, keywords, chat_log_id, title_state
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            participants = excluded.participants,
            state = excluded.state,
            created_at = excluded.created_at,
            last_activity_at = excluded.last_activity_at,
            message_count = excluded.message_count,
            label = excluded.label,
            title = excluded.title,
            keywords = excluded.keywords,
            chat_log_id = excluded.chat_log_id,
            title_state = excluded.title_state",
        params![
            session.id,
            serde_json::to_string(&session.participants)?,
            session.state,
            session.created_at.timestamp_millis(),
            session.last_activity_at.timestamp_millis(),
            session.message_count,
            session.label,
            session.title,
            serde_json::to_string(&session.keywords)?,
            session.chat_log_id,
            session.title_state,
        ],
    )?;

    write_participants(conn, &session.id, &session.participants)
}

fn write_participants(conn: &Connection, session_id: &str, participants: &ParticipantPair) -> SessionResult<()> {
    conn.execute(
        "DELETE FROM session_participants WHERE session_id = ?1",
        [session_id],
    )?;
    for (position, participant) in participants.iter().enumerate() {
        conn.execute(
            "INSERT INTO session_participants (session_id, participant_id, display_tag, position)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, participant.id, participant.display_tag, position as i64],
        )?;
    }
    Ok(())
}

fn write_chat_log(conn: &Connection, log: &ChatLog) -> SessionResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO chat_logs (id, session_id, created_at, last_message_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            log.id,
            log.session_id,
            log.created_at.timestamp_millis(),
            log.last_message_at.timestamp_millis(),
        ],
    )?;
    conn.execute("DELETE FROM messages WHERE chat_log_id = ?1", [&log.id])?;
    for (seq, message) in log.messages.iter().enumerate() {
        insert_message(conn, &log.id, seq as i64, message)?;
    }
    Ok(())
}

fn insert_message(conn: &Connection, chat_log_id: &str, seq: i64, message: &Message) -> SessionResult<()> {
    conn.execute(
        "INSERT INTO messages (
            chat_log_id, seq, id, sender_id, content, timestamp, message_type, images, metadata
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            chat_log_id,
            seq,
            message.id,
            message.sender_id,
            message.content,
            message.timestamp.timestamp_millis(),
            message.message_type,
            serde_json::to_string(&message.images)?,
            serde_json::to_string(&message.metadata)?,
        ],
    )?;
    Ok(())
}

/// Log rows go before the session row so an interrupted delete never leaves a
/// session pointing at a missing log.
fn remove_session_rows(conn: &Connection, session_id: &str, chat_log_id: &str) -> rusqlite::Result<()> {
    remove_chat_log_rows(conn, chat_log_id)?;
    conn.execute(
        "DELETE FROM session_participants WHERE session_id = ?1",
        [session_id],
    )?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
    Ok(())
}

fn remove_chat_log_rows(conn: &Connection, chat_log_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM messages WHERE chat_log_id = ?1", [chat_log_id])?;
    conn.execute("DELETE FROM chat_logs WHERE id = ?1", [chat_log_id])?;
    Ok(())
}

fn select_session(conn: &Connection, id: &str) -> rusqlite::Result<Option<Session>> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS);
    conn.query_row(&sql, [id], session_from_row).optional()
}

fn select_chat_log_header(conn: &Connection, id: &str) -> rusqlite::Result<Option<ChatLog>> {
    conn.query_row(
        "SELECT id, session_id, created_at, last_message_at FROM chat_logs WHERE id = ?1",
        [id],
        chat_log_from_row,
    )
    .optional()
}

fn select_messages(
    conn: &Connection,
    chat_log_id: &str,
    limit: Option<usize>,
    offset: usize,
) -> rusqlite::Result<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE chat_log_id = ?1 ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
        MESSAGE_COLUMNS
    );
    // SQLite treats a negative LIMIT as "no limit"
    let limit = limit.map(to_sql_limit).unwrap_or(-1);
    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map(params![chat_log_id, limit, to_sql_limit(offset)], message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

fn to_sql_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        participants: json_column(row, 1)?,
        state: row.get(2)?,
        created_at: millis_column(row, 3)?,
        last_activity_at: millis_column(row, 4)?,
        message_count: row.get(5)?,
        label: row.get(6)?,
        title: row.get(7)?,
        keywords: json_column(row, 8)?,
        chat_log_id: row.get(9)?,
        title_state: row.get(10)?,
    })
}

fn chat_log_from_row(row: &Row) -> rusqlite::Result<ChatLog> {
    Ok(ChatLog {
        id: row.get(0)?,
        session_id: row.get(1)?,
        created_at: millis_column(row, 2)?,
        last_message_at: millis_column(row, 3)?,
        messages: Vec::new(),
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        content: row.get(2)?,
        timestamp: millis_column(row, 3)?,
        message_type: row.get(4)?,
        images: json_column(row, 5)?,
        metadata: json_column(row, 6)?,
    })
}

fn millis_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{new_id, NewMessage, ParticipantPair, ParticipantRef};
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn pair(a: &str, b: &str) -> ParticipantPair {
        ParticipantPair::new(ParticipantRef::new(a, a), ParticipantRef::new(b, b)).unwrap()
    }

    async fn seeded(db: &Database, a: &str, b: &str) -> Session {
        let session = Session::new(pair(a, b));
        db.insert_session(&session, &ChatLog::for_session(&session))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_insert_and_load_session() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;

        let loaded = db.load_session(&session.id).await.unwrap();
        assert_eq!(loaded, session);

        let log = db.load_chat_log(&session.chat_log_id).await.unwrap();
        assert_eq!(log.session_id.as_deref(), Some(session.id.as_str()));
        assert!(log.messages.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_session_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let error = db.load_session("missing").await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_append_keeps_count_in_step_with_log() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;

        for i in 0..5 {
            db.append_message(
                &session.chat_log_id,
                NewMessage::user("player", format!("message {}", i)).into_message(),
            )
            .await
            .unwrap();

            let stored = db.load_session(&session.id).await.unwrap();
            let log = db.load_chat_log(&session.chat_log_id).await.unwrap();
            assert_eq!(stored.message_count as usize, log.messages.len());
        }

        let log = db.load_chat_log(&session.chat_log_id).await.unwrap();
        let contents: Vec<_> = log.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["message 0", "message 1", "message 2", "message 3", "message 4"]
        );
    }

    #[tokio::test]
    async fn test_append_reactivates_and_touches_session() {
        let db = Database::in_memory().await.unwrap();
        let mut session = seeded(&db, "player", "origin").await;
        session.state = SessionState::Inactive;
        session.last_activity_at = now() - ChronoDuration::hours(1);
        db.save_session(&session).await.unwrap();

        let message = db
            .append_message(&session.chat_log_id, NewMessage::user("player", "back").into_message())
            .await
            .unwrap();

        let stored = db.load_session(&session.id).await.unwrap();
        assert_eq!(stored.state, SessionState::Active);
        assert_eq!(stored.last_activity_at, message.timestamp);
    }

    #[tokio::test]
    async fn test_append_to_unknown_log_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let error = db
            .append_message("nope", NewMessage::user("a", "hi").into_message())
            .await
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_message_id_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;
        let message = NewMessage::user("player", "hi").with_id("m1").into_message();

        db.append_message(&session.chat_log_id, message.clone()).await.unwrap();
        let error = db.append_message(&session.chat_log_id, message).await.unwrap_err();

        assert!(matches!(error, SessionError::Validation(_)));
        assert_eq!(db.load_session(&session.id).await.unwrap().message_count, 1);
    }

    #[tokio::test]
    async fn test_delete_session_cascades_to_log() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;
        db.append_message(&session.chat_log_id, NewMessage::user("player", "hi").into_message())
            .await
            .unwrap();

        db.delete_session(&session.id).await.unwrap();

        assert!(db.load_session(&session.id).await.unwrap_err().is_not_found());
        assert!(db.load_chat_log(&session.chat_log_id).await.unwrap_err().is_not_found());
        assert_eq!(db.get_message_count(&session.chat_log_id).await.unwrap(), 0);
        assert!(db.sessions_for_participant("player").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_chat_log_refuses_owned_log() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;

        let error = db.delete_chat_log(&session.chat_log_id).await.unwrap_err();
        assert!(matches!(error, SessionError::Validation(_)));

        let orphan = ChatLog {
            id: "orphan".to_string(),
            session_id: None,
            created_at: now(),
            last_message_at: now(),
            messages: vec![NewMessage::system("host", "hello").into_message()],
        };
        db.save_chat_log(&orphan).await.unwrap();
        db.delete_chat_log("orphan").await.unwrap();
        assert!(db.load_chat_log("orphan").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_message_paging() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;
        for i in 0..6 {
            db.append_message(
                &session.chat_log_id,
                NewMessage::user("player", i.to_string()).into_message(),
            )
            .await
            .unwrap();
        }

        let page = db.get_messages(&session.chat_log_id, Some(2), 1).await.unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["1", "2"]);

        let rest = db.get_messages(&session.chat_log_id, None, 4).await.unwrap();
        let contents: Vec<_> = rest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["4", "5"]);

        let recent = db.get_recent_messages(&session.chat_log_id, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_title_claim_is_exclusive() {
        let db = Database::in_memory().await.unwrap();
        let mut session = seeded(&db, "player", "origin").await;
        session.message_count = 3;
        db.save_session(&session).await.unwrap();

        assert!(db.begin_title_generation(&session.id, 3).await.unwrap());
        assert!(!db.begin_title_generation(&session.id, 3).await.unwrap());

        db.finish_title_generation(&session.id, None).await.unwrap();
        let stored = db.load_session(&session.id).await.unwrap();
        assert!(stored.title_generation_attempted());
        assert!(stored.title.is_none());
        assert!(!db.begin_title_generation(&session.id, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_title_generation() {
        let db = Database::in_memory().await.unwrap();
        let mut session = seeded(&db, "player", "origin").await;
        session.message_count = 3;
        db.save_session(&session).await.unwrap();

        assert!(db.begin_title_generation(&session.id, 3).await.unwrap());
        let error = db.reset_title_generation(&session.id).await.unwrap_err();
        assert!(matches!(error, SessionError::Validation(_)));

        let keywords = vec!["alpha".to_string()];
        db.finish_title_generation(&session.id, Some(("Alpha", &keywords)))
            .await
            .unwrap();
        db.reset_title_generation(&session.id).await.unwrap();

        let stored = db.load_session(&session.id).await.unwrap();
        assert_eq!(stored.title_state, TitleState::Idle);
        assert!(stored.title.is_none());
        assert!(stored.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_generation_is_recovered_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.db");

        let session = {
            let db = Database::new(&path).await.unwrap();
            let mut session = seeded(&db, "player", "origin").await;
            session.message_count = 3;
            session.title_state = TitleState::Generating;
            db.save_session(&session).await.unwrap();
            session
        };

        let db = Database::new(&path).await.unwrap();
        let stored = db.load_session(&session.id).await.unwrap();
        assert_eq!(stored.title_state, TitleState::Idle);
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let source = Database::in_memory().await.unwrap();
        let first = seeded(&source, "player", "origin").await;
        let second = seeded(&source, "player", "scout").await;
        source
            .append_message(
                &first.chat_log_id,
                NewMessage::user("player", "status?")
                    .with_metadata("channel", serde_json::json!("radio"))
                    .into_message(),
            )
            .await
            .unwrap();
        let keywords = vec!["rocket".to_string(), "launch".to_string()];
        source
            .update_session_title(&second.id, "Launch Prep", Some(&keywords))
            .await
            .unwrap();

        let exported = source.export_all().await.unwrap();

        let target = Database::in_memory().await.unwrap();
        let summary = target.import_all(exported.clone()).await.unwrap();
        assert_eq!(summary, ImportSummary { sessions: 2, chat_logs: 2 });

        let reexported = target.export_all().await.unwrap();
        assert_eq!(reexported.sessions, exported.sessions);
        assert_eq!(reexported.chat_logs, exported.chat_logs);
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_version() {
        let db = Database::in_memory().await.unwrap();
        let payload = ExportPayload {
            version: 7,
            exported_at: now(),
            sessions: Vec::new(),
            chat_logs: Vec::new(),
        };
        assert!(matches!(
            db.import_all(payload).await,
            Err(SessionError::UnsupportedVersion(7))
        ));
    }

    #[tokio::test]
    async fn test_import_repairs_counts_and_missing_logs() {
        let db = Database::in_memory().await.unwrap();
        let mut session = Session::new(pair("player", "origin"));
        session.message_count = 42;
        session.title_state = TitleState::Generating;

        let payload = ExportPayload {
            version: EXPORT_VERSION,
            exported_at: now(),
            sessions: vec![session.clone()],
            chat_logs: Vec::new(),
        };
        db.import_all(payload).await.unwrap();

        let stored = db.load_session(&session.id).await.unwrap();
        assert_eq!(stored.message_count, 0);
        assert_eq!(stored.title_state, TitleState::Idle);
        assert!(db.load_chat_log(&session.chat_log_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_import_drops_replaced_chat_log() {
        let db = Database::in_memory().await.unwrap();
        let existing = seeded(&db, "player", "origin").await;
        db.append_message(&existing.chat_log_id, NewMessage::user("player", "old line").into_message())
            .await
            .unwrap();

        let mut incoming = existing.clone();
        incoming.chat_log_id = new_id();
        let mut log = ChatLog::for_session(&incoming);
        log.messages
            .push(NewMessage::user("player", "new line").into_message());

        db.import_all(ExportPayload {
            version: EXPORT_VERSION,
            exported_at: now(),
            sessions: vec![incoming.clone()],
            chat_logs: vec![log],
        })
        .await
        .unwrap();

        let stored = db.load_session(&existing.id).await.unwrap();
        assert_eq!(stored.chat_log_id, incoming.chat_log_id);
        assert_eq!(stored.message_count, 1);
        assert!(db.load_chat_log(&existing.chat_log_id).await.unwrap_err().is_not_found());

        let payload = db.export_all().await.unwrap();
        assert_eq!(payload.chat_logs.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_import_leaves_store_untouched() {
        let db = Database::in_memory().await.unwrap();
        let session = Session::new(pair("player", "origin"));
        let mut log = ChatLog::for_session(&session);
        let message = NewMessage::user("player", "hi").with_id("dup").into_message();
        log.messages = vec![message.clone(), message];

        let payload = ExportPayload {
            version: EXPORT_VERSION,
            exported_at: now(),
            sessions: vec![session.clone()],
            chat_logs: vec![log],
        };
        assert!(matches!(
            db.import_all(payload).await,
            Err(SessionError::Persistence(_))
        ));
        assert!(db.get_all_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_inactive_since() {
        let db = Database::in_memory().await.unwrap();
        let mut old = seeded(&db, "player", "origin").await;
        old.last_activity_at = now() - ChronoDuration::days(10);
        db.save_session(&old).await.unwrap();
        let recent = seeded(&db, "player", "scout").await;

        let deleted = db
            .delete_sessions_inactive_since(now() - ChronoDuration::days(7))
            .await
            .unwrap();

        assert_eq!(deleted, vec![old.id.clone()]);
        assert!(db.find_session(&old.id).await.unwrap().is_none());
        assert!(db.find_session(&recent.id).await.unwrap().is_some());
        assert!(db.load_chat_log(&old.chat_log_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_all_returns_ids() {
        let db = Database::in_memory().await.unwrap();
        let first = seeded(&db, "player", "origin").await;
        let second = seeded(&db, "player", "scout").await;

        let mut deleted = db.delete_all_sessions().await.unwrap();
        deleted.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(db.get_all_sessions().await.unwrap().is_empty());
        assert!(db.delete_all_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_empty_session() {
        let db = Database::in_memory().await.unwrap();
        let mut session = seeded(&db, "player", "origin").await;
        session.state = SessionState::Inactive;
        session.title = Some("Old Title".to_string());
        session.title_state = TitleState::Done;
        db.save_session(&session).await.unwrap();

        let claimed = db
            .claim_empty_session(&session.id, &pair("player", "scout"), true, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.label, "player ⟷ scout");
        assert_eq!(claimed.state, SessionState::Active);
        assert_eq!(claimed.title, None);
        assert_eq!(claimed.title_state, TitleState::Idle);
        let scouts = db.sessions_for_participant("scout").await.unwrap();
        assert_eq!(scouts.len(), 1);
        assert!(db.sessions_for_participant("origin").await.unwrap().is_empty());

        // keeps the label when the pair is the same
        let kept = db
            .claim_empty_session(&session.id, &pair("scout", "player"), false, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.label, "player ⟷ scout");
    }

    #[tokio::test]
    async fn test_claim_skips_session_that_received_a_message() {
        let db = Database::in_memory().await.unwrap();
        let session = seeded(&db, "player", "origin").await;

        // the caller still holds the empty snapshot when the append lands
        db.append_message(&session.chat_log_id, NewMessage::user("player", "hello").into_message())
            .await
            .unwrap();

        let claimed = db
            .claim_empty_session(&session.id, &pair("player", "scout"), true, now())
            .await
            .unwrap();
        assert!(claimed.is_none());

        let stored = db.load_session(&session.id).await.unwrap();
        assert_eq!(stored.message_count, 1);
        assert_eq!(stored.label, "player ⟷ origin");
        assert!(db
            .claim_empty_session("missing", &pair("player", "scout"), true, now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deactivate_if_idle_rechecks_activity() {
        let db = Database::in_memory().await.unwrap();
        let mut session = seeded(&db, "player", "origin").await;
        session.last_activity_at = now() - ChronoDuration::minutes(10);
        db.save_session(&session).await.unwrap();
        let cutoff = now() - ChronoDuration::minutes(5);

        // a message after the caller's snapshot keeps the session alive
        db.append_message(&session.chat_log_id, NewMessage::user("player", "still here").into_message())
            .await
            .unwrap();
        assert!(!db.deactivate_if_idle(&session.id, cutoff).await.unwrap());
        assert_eq!(db.load_session(&session.id).await.unwrap().state, SessionState::Active);

        // the same check once the session really went quiet
        let mut quiet = seeded(&db, "player", "scout").await;
        quiet.last_activity_at = now() - ChronoDuration::minutes(10);
        db.save_session(&quiet).await.unwrap();
        assert!(db.deactivate_if_idle(&quiet.id, cutoff).await.unwrap());
        assert!(!db.deactivate_if_idle(&quiet.id, cutoff).await.unwrap());
        assert_eq!(db.load_session(&quiet.id).await.unwrap().state, SessionState::Inactive);
    }

    #[tokio::test]
    async fn test_sessions_for_participant() {
        let db = Database::in_memory().await.unwrap();
        seeded(&db, "player", "origin").await;
        seeded(&db, "player", "scout").await;
        seeded(&db, "origin", "scout").await;

        assert_eq!(db.sessions_for_participant("player").await.unwrap().len(), 2);
        assert_eq!(db.sessions_for_participant("scout").await.unwrap().len(), 2);
        assert!(db.sessions_for_participant("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_database_persists_and_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");

        let session = {
            let db = Database::new(&path).await.unwrap();
            let session = seeded(&db, "player", "origin").await;
            db.flush().await.unwrap();
            session
        };

        let db = Database::new(&path).await.unwrap();
        assert_eq!(db.load_session(&session.id).await.unwrap(), session);
    }
}
