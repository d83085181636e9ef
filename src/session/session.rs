//! Session lifecycle: creation, reuse, activation and the inactivity sweep

use chrono::{DateTime, Utc};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    database::Database,
    error::{SessionError, SessionResult},
    events::{EventSender, SessionEvent},
    message_log::MessageLog,
    types::{
        now, ChatLog, Message, MessageType, NewMessage, ParticipantPair, ParticipantRef, Session,
        SessionLookup, SessionState,
    },
};

/// Tunables for the session subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub inactivity_timeout: Duration,
    pub tick_interval: Duration,
    pub title_min_messages: u32,
    pub title_context_messages: usize,
    /// Hand out empty sessions that belonged to a different pair
    pub reuse_foreign_empty_sessions: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(5 * 60),
            tick_interval: Duration::from_secs(5),
            title_min_messages: 3,
            title_context_messages: 6,
            reuse_foreign_empty_sessions: true,
        }
    }
}

/// Session manager for handling session persistence and operations
pub struct SessionManager {
    db: Arc<Database>,
    log: MessageLog,
    settings: SessionSettings,
    events: EventSender,
    /// Serializes find-or-create so two callers cannot both create a session
    lifecycle: Mutex<()>,
}

impl SessionManager {
    /// Create a session manager over `sessions.db` in `data_dir`
    pub async fn new<P: AsRef<Path>>(data_dir: P, settings: SessionSettings) -> SessionResult<Self> {
        let db_path = data_dir.as_ref().join("sessions.db");
        let db = Arc::new(Database::new(db_path).await?);
        Ok(Self::with_database(db, settings))
    }

    pub fn with_database(db: Arc<Database>, settings: SessionSettings) -> Self {
        Self {
            log: MessageLog::new(db.clone()),
            db,
            settings,
            events: EventSender::default(),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Return an empty session for the pair, creating one only when no empty
    /// session can be reused.
    pub async fn find_or_create_session(
        &self,
        a: &ParticipantRef,
        b: &ParticipantRef,
    ) -> SessionResult<SessionLookup> {
        let participants = ParticipantPair::new(a.clone(), b.clone())?;
        let _guard = self.lifecycle.lock().await;

        let sessions = self.db.sessions_by_creation().await?;

        // Appends bypass the lifecycle lock, so a candidate can fill up after
        // the snapshot; the store only hands over sessions that are still empty.
        let same_pair = sessions.iter().filter(|s| {
            s.is_empty() && s.label.contains(&a.display_tag) && s.label.contains(&b.display_tag)
        });
        for candidate in same_pair {
            let Some(session) = self
                .db
                .claim_empty_session(&candidate.id, &participants, false, now())
                .await?
            else {
                continue;
            };

            debug!(session_id = %session.id, "Reusing empty session for the same pair");
            self.events.emit(SessionEvent::Reused {
                session_id: session.id.clone(),
            });
            return Ok(SessionLookup {
                session,
                reused: true,
            });
        }

        if self.settings.reuse_foreign_empty_sessions {
            for candidate in sessions.iter().filter(|s| s.is_empty()) {
                let Some(session) = self
                    .db
                    .claim_empty_session(&candidate.id, &participants, true, now())
                    .await?
                else {
                    continue;
                };

                info!(
                    session_id = %session.id,
                    from = %candidate.label,
                    to = %session.label,
                    "Repurposed empty session for a new pair"
                );
                self.events.emit(SessionEvent::Reused {
                    session_id: session.id.clone(),
                });
                return Ok(SessionLookup {
                    session,
                    reused: true,
                });
            }
        }

        let session = self.insert_new_session(participants).await?;
        Ok(SessionLookup {
            session,
            reused: false,
        })
    }

    /// Create a new session with an empty chat log
    pub async fn create_session(&self, a: &ParticipantRef, b: &ParticipantRef) -> SessionResult<Session> {
        let participants = ParticipantPair::new(a.clone(), b.clone())?;
        let _guard = self.lifecycle.lock().await;
        self.insert_new_session(participants).await
    }

    async fn insert_new_session(&self, participants: ParticipantPair) -> SessionResult<Session> {
        let session = Session::new(participants);
        self.db
            .insert_session(&session, &ChatLog::for_session(&session))
            .await?;

        info!(session_id = %session.id, label = %session.label, "Created session");
        self.events.emit(SessionEvent::Created {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> SessionResult<Session> {
        self.db.load_session(id).await
    }

    /// Most recently active sessions first
    pub async fn list_recent(&self, limit: Option<usize>) -> SessionResult<Vec<Session>> {
        let mut sessions = self.db.get_all_sessions().await?;
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    pub async fn activate_session(&self, id: &str) -> SessionResult<()> {
        self.db.set_session_state(id, SessionState::Active).await?;
        self.events.emit(SessionEvent::Activated {
            session_id: id.to_string(),
        });
        Ok(())
    }

    pub async fn deactivate_session(&self, id: &str) -> SessionResult<()> {
        self.db.set_session_state(id, SessionState::Inactive).await?;
        self.events.emit(SessionEvent::Deactivated {
            session_id: id.to_string(),
        });
        Ok(())
    }

    /// Add a message to a session
    pub async fn add_message(&self, session_id: &str, message: NewMessage) -> SessionResult<Message> {
        let session = self.db.load_session(session_id).await?;
        // system lines come from the host, not from either participant
        if message.message_type != MessageType::System
            && !session.participants.contains(&message.sender_id)
        {
            return Err(SessionError::validation(format!(
                "{} is not a participant of session {}",
                message.sender_id, session_id
            )));
        }

        let message = self.log.add_message(&session.chat_log_id, message).await?;
        self.events.emit(SessionEvent::MessageAppended {
            session_id: session.id,
            message_id: message.id.clone(),
        });
        Ok(message)
    }

    /// Messages of a session in order
    pub async fn get_messages(&self, session_id: &str, limit: Option<usize>) -> SessionResult<Vec<Message>> {
        let session = self.db.load_session(session_id).await?;
        self.log.get_messages(&session.chat_log_id, limit, 0).await
    }

    /// Deactivate every active session idle for longer than `timeout`.
    ///
    /// Works from a snapshot of the active set; a failure on one session is
    /// logged and the sweep moves on. Returns the ids that were deactivated.
    pub async fn sweep(&self, now: DateTime<Utc>, timeout: Duration) -> SessionResult<Vec<String>> {
        let snapshot = self.db.sessions_in_state(SessionState::Active).await?;
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| SessionError::validation(format!("inactivity timeout out of range: {}", e)))?;

        let cutoff = now
            .checked_sub_signed(timeout)
            .ok_or_else(|| SessionError::validation("inactivity timeout is too large"))?;

        let mut deactivated = Vec::new();
        for session in snapshot {
            if session.last_activity_at >= cutoff {
                continue;
            }
            // Re-checked in the store: a message may have arrived since the snapshot
            match self.db.deactivate_if_idle(&session.id, cutoff).await {
                Ok(true) => {
                    self.events.emit(SessionEvent::Deactivated {
                        session_id: session.id.clone(),
                    });
                    deactivated.push(session.id);
                }
                Ok(false) => debug!(session_id = %session.id, "Session became active during sweep"),
                Err(e) => warn!(session_id = %session.id, error = %e, "Failed to deactivate idle session"),
            }
        }

        if !deactivated.is_empty() {
            info!(count = deactivated.len(), "Deactivated idle sessions");
        }
        Ok(deactivated)
    }

    /// Sweep with the configured timeout
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> SessionResult<Vec<String>> {
        self.sweep(now, self.settings.inactivity_timeout).await
    }
}
