//! Session, message and chat log records

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use uuid::Uuid;

use super::error::{SessionError, SessionResult};

/// Current wall-clock time at the precision the store persists
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reference to a participant owned by the host's entity registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRef {
    pub id: String,
    pub display_tag: String,
}

impl ParticipantRef {
    pub fn new(id: impl Into<String>, display_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_tag: display_tag.into(),
        }
    }
}

/// Exactly two distinct participants. Equality ignores order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParticipantRef>", into = "Vec<ParticipantRef>")]
pub struct ParticipantPair {
    first: ParticipantRef,
    second: ParticipantRef,
}

impl ParticipantPair {
    pub fn new(first: ParticipantRef, second: ParticipantRef) -> SessionResult<Self> {
        if first.id == second.id {
            return Err(SessionError::validation(format!(
                "a session needs two distinct participants, got {} twice",
                first.id
            )));
        }
        Ok(Self { first, second })
    }

    pub fn first(&self) -> &ParticipantRef {
        &self.first
    }

    pub fn second(&self) -> &ParticipantRef {
        &self.second
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantRef> {
        [&self.first, &self.second].into_iter()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.first.id == participant_id || self.second.id == participant_id
    }

    pub fn get(&self, participant_id: &str) -> Option<&ParticipantRef> {
        self.iter().find(|p| p.id == participant_id)
    }

    /// Default session label built from both display tags
    pub fn label(&self) -> String {
        format!("{} ⟷ {}", self.first.display_tag, self.second.display_tag)
    }
}

impl PartialEq for ParticipantPair {
    fn eq(&self, other: &Self) -> bool {
        (self.first == other.first && self.second == other.second)
            || (self.first == other.second && self.second == other.first)
    }
}

impl Eq for ParticipantPair {}

impl TryFrom<Vec<ParticipantRef>> for ParticipantPair {
    type Error = SessionError;

    fn try_from(participants: Vec<ParticipantRef>) -> Result<Self, Self::Error> {
        let count = participants.len();
        let mut iter = participants.into_iter();
        match (iter.next(), iter.next(), iter.next()) {
            (Some(first), Some(second), None) => Self::new(first, second),
            _ => Err(SessionError::validation(format!(
                "a session needs exactly two participants, got {}",
                count
            ))),
        }
    }
}

impl From<ParticipantPair> for Vec<ParticipantRef> {
    fn from(pair: ParticipantPair) -> Self {
        vec![pair.first, pair.second]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Inactive,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Inactive => "inactive",
        }
    }
}

impl FromStr for SessionState {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionState::Active),
            "inactive" => Ok(SessionState::Inactive),
            other => Err(SessionError::validation(format!("unknown session state '{}'", other))),
        }
    }
}

/// Progress of title generation for one session.
///
/// `Idle -> Generating -> Done` is driven by the store; only an explicit
/// retitle request moves `Done` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleState {
    #[default]
    Idle,
    Generating,
    Done,
}

impl TitleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleState::Idle => "idle",
            TitleState::Generating => "generating",
            TitleState::Done => "done",
        }
    }
}

impl FromStr for TitleState {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(TitleState::Idle),
            "generating" => Ok(TitleState::Generating),
            "done" => Ok(TitleState::Done),
            other => Err(SessionError::validation(format!("unknown title state '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Agent,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Agent => "agent",
            MessageType::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageType::User),
            "agent" => Ok(MessageType::Agent),
            "system" => Ok(MessageType::System),
            other => Err(SessionError::validation(format!("unknown message type '{}'", other))),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for SessionState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for SessionState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: SessionError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for TitleState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TitleState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: SessionError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for MessageType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for MessageType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: SessionError| FromSqlError::Other(Box::new(e)))
    }
}

/// Opaque image attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub media_type: String,
    /// base64 encoded payload
    pub data: String,
}

/// A message stored in a chat log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A message about to be appended; id and timestamp are filled in when absent
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: Option<String>,
    pub sender_id: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub message_type: MessageType,
    pub images: Vec<ImageAttachment>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewMessage {
    pub fn new(message_type: MessageType, sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id: sender_id.into(),
            content: content.into(),
            timestamp: None,
            message_type,
            images: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn user(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageType::User, sender_id, content)
    }

    pub fn agent(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageType::Agent, sender_id, content)
    }

    pub fn system(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageType::System, sender_id, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp.trunc_subsecs(3));
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Resolve into a stored message, assigning whatever is missing
    pub fn into_message(self) -> Message {
        Message {
            id: self.id.unwrap_or_else(new_id),
            sender_id: self.sender_id,
            content: self.content,
            timestamp: self.timestamp.unwrap_or_else(now),
            message_type: self.message_type,
            images: self.images,
            metadata: self.metadata,
        }
    }
}

/// A conversation between exactly two participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub participants: ParticipantPair,
    pub state: SessionState,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_at: DateTime<Utc>,
    pub message_count: u32,
    pub label: String,
    pub title: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub chat_log_id: String,
    #[serde(default)]
    pub title_state: TitleState,
}

impl Session {
    /// Create a new, empty, active session for a pair
    pub fn new(participants: ParticipantPair) -> Self {
        let now = now();
        Self {
            id: new_id(),
            label: participants.label(),
            participants,
            state: SessionState::Active,
            created_at: now,
            last_activity_at: now,
            message_count: 0,
            title: None,
            keywords: Vec::new(),
            chat_log_id: new_id(),
            title_state: TitleState::Idle,
        }
    }

    /// Generated title if there is one, otherwise the pair label
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.label)
    }

    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn title_generation_attempted(&self) -> bool {
        self.title_state == TitleState::Done
    }

    pub fn is_generating_title(&self) -> bool {
        self.title_state == TitleState::Generating
    }

    pub fn is_eligible_for_title(&self, min_messages: u32) -> bool {
        self.title.is_none()
            && self.message_count >= min_messages
            && self.title_state == TitleState::Idle
    }
}

/// Ordered message history for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLog {
    pub id: String,
    pub session_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ChatLog {
    /// Empty log owned by `session`
    pub fn for_session(session: &Session) -> Self {
        Self {
            id: session.chat_log_id.clone(),
            session_id: Some(session.id.clone()),
            created_at: session.created_at,
            last_message_at: session.created_at,
            messages: Vec::new(),
        }
    }
}

/// Result of asking for a session between two participants
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLookup {
    pub session: Session,
    pub reused: bool,
}

pub const EXPORT_VERSION: u32 = 1;

/// Portable dump of every session and chat log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub exported_at: DateTime<Utc>,
    pub sessions: Vec<Session>,
    pub chat_logs: Vec<ChatLog>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub sessions: usize,
    pub chat_logs: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.sessions + self.chat_logs
    }
}
