//! Background title and keyword generation for sessions

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::{
    database::Database,
    error::{SessionError, SessionResult},
    events::{EventSender, SessionEvent},
    session::SessionSettings,
    types::{Message, Session},
};
use crate::llm::{GenerateOptions, TextGenerator};

const SYSTEM_PROMPT: &str =
    "You summarize conversations between a player and characters in a game world. \
     Answer with plain text only.";

/// Knobs for title generation
#[derive(Debug, Clone, PartialEq)]
pub struct TitleSettings {
    /// Messages a session needs before it gets a title
    pub min_messages: u32,
    /// Leading messages fed to the generator
    pub context_messages: usize,
    pub max_title_words: usize,
    pub max_keywords: usize,
}

impl Default for TitleSettings {
    fn default() -> Self {
        Self {
            min_messages: 3,
            context_messages: 6,
            max_title_words: 8,
            max_keywords: 5,
        }
    }
}

impl From<&SessionSettings> for TitleSettings {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            min_messages: settings.title_min_messages,
            context_messages: settings.title_context_messages,
            ..Self::default()
        }
    }
}

/// Result of one generation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TitleOutcome {
    Generated { title: String, keywords: Vec<String> },
    /// The attempt ran and failed; the session will not be retried
    Failed(String),
    /// The session was not eligible or another task already claimed it
    Skipped,
}

/// Counts from one pass over the eligible sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TitleTickReport {
    pub generated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Derives session titles and keywords through a text generator
pub struct TitleGenerator {
    db: Arc<Database>,
    generator: Arc<dyn TextGenerator>,
    settings: TitleSettings,
    events: EventSender,
}

impl TitleGenerator {
    pub fn new(db: Arc<Database>, generator: Arc<dyn TextGenerator>, settings: TitleSettings) -> Self {
        Self {
            db,
            generator,
            settings,
            events: EventSender::default(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &TitleSettings {
        &self.settings
    }

    /// Attempt a title for every eligible session. Never fails; problems are
    /// logged and counted.
    pub async fn tick(&self) -> TitleTickReport {
        let mut report = TitleTickReport::default();

        let ids = match self.db.sessions_eligible_for_title(self.settings.min_messages).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to list sessions awaiting a title");
                return report;
            }
        };

        for id in ids {
            match self.generate_for(&id).await {
                Ok(TitleOutcome::Generated { .. }) => report.generated += 1,
                Ok(TitleOutcome::Failed(_)) => report.failed += 1,
                Ok(TitleOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Title generation bookkeeping failed");
                    report.failed += 1;
                }
            }
        }

        if report != TitleTickReport::default() {
            debug!(
                generated = report.generated,
                failed = report.failed,
                skipped = report.skipped,
                "Title tick finished"
            );
        }
        report
    }

    /// Claim a session and generate its title.
    ///
    /// The claim is released whatever happens during generation; only store
    /// errors on claiming or releasing are returned.
    pub async fn generate_for(&self, session_id: &str) -> SessionResult<TitleOutcome> {
        if !self
            .db
            .begin_title_generation(session_id, self.settings.min_messages)
            .await?
        {
            return Ok(TitleOutcome::Skipped);
        }

        let attempt = self.attempt(session_id).await;

        let generated = attempt
            .as_ref()
            .ok()
            .map(|(title, keywords)| (title.as_str(), keywords.as_slice()));
        self.db.finish_title_generation(session_id, generated).await?;

        match attempt {
            Ok((title, keywords)) => {
                info!(session_id, title = %title, "Generated session title");
                self.events.emit(SessionEvent::Titled {
                    session_id: session_id.to_string(),
                    title: Some(title.clone()),
                });
                Ok(TitleOutcome::Generated { title, keywords })
            }
            Err(e) => {
                warn!(session_id, error = %e, "Title generation failed");
                self.events.emit(SessionEvent::Titled {
                    session_id: session_id.to_string(),
                    title: None,
                });
                Ok(TitleOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Forget a session's title so the next tick generates a fresh one
    pub async fn retitle(&self, session_id: &str) -> SessionResult<()> {
        self.db.reset_title_generation(session_id).await?;
        info!(session_id, "Session queued for a new title");
        Ok(())
    }

    async fn attempt(&self, session_id: &str) -> SessionResult<(String, Vec<String>)> {
        let session = self.db.load_session(session_id).await?;
        let messages = self
            .db
            .get_messages(&session.chat_log_id, Some(self.settings.context_messages), 0)
            .await?;
        let context = build_context(&session, &messages);

        let options = GenerateOptions::default()
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(48);

        let raw_title = self.generator.generate(&title_prompt(&context), &options).await?;
        let title = clean_title(&raw_title, self.settings.max_title_words)
            .ok_or_else(|| SessionError::Generation(format!("unusable title: {:?}", raw_title)))?;

        let raw_keywords = self.generator.generate(&keyword_prompt(&context), &options).await?;
        let keywords = clean_keywords(&raw_keywords, self.settings.max_keywords);

        Ok((title, keywords))
    }
}

/// One `sender: content` line per message, senders shown by display tag
pub fn build_context(session: &Session, messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| {
            let sender = session
                .participants
                .get(&message.sender_id)
                .map(|p| p.display_tag.as_str())
                .unwrap_or(message.sender_id.as_str());
            format!("{}: {}", sender, message.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn title_prompt(context: &str) -> String {
    format!(
        "Write a short title of at most 8 words for the conversation below. \
         Reply with the title only.\n\n{}",
        context
    )
}

fn keyword_prompt(context: &str) -> String {
    format!(
        "List 3 to 5 keywords for the conversation below, separated by commas. \
         Reply with the keywords only.\n\n{}",
        context
    )
}

fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    match text.get(..label.len()) {
        Some(head) if head.eq_ignore_ascii_case(label) => text[label.len()..].trim_start(),
        _ => text,
    }
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '“' | '”' | '‘' | '’'))
        .trim()
}

fn list_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").ok())
        .as_ref()
}

/// Reduce a model reply to a single short title
pub fn clean_title(raw: &str, max_words: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = strip_quotes(strip_label(line, "title:"));
    let line = line.trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ':' | ';' | ','));
    let line = strip_quotes(line);

    let title = line.split_whitespace().take(max_words).collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Split a model reply into distinct keywords
pub fn clean_keywords(raw: &str, max_keywords: usize) -> Vec<String> {
    let raw = strip_label(raw.trim(), "keywords:");
    let mut keywords: Vec<String> = Vec::new();

    for piece in raw.split(|c| matches!(c, ',' | ';' | '\n')) {
        let mut piece = piece.trim();
        if let Some(marker) = list_marker() {
            if let Some(found) = marker.find(piece) {
                piece = &piece[found.end()..];
            }
        }
        let keyword = strip_quotes(piece.trim_end_matches('.'));
        if keyword.is_empty() {
            continue;
        }

        let lowered = keyword.to_lowercase();
        if keywords.iter().any(|k| k.to_lowercase() == lowered) {
            continue;
        }
        keywords.push(keyword.to_string());
        if keywords.len() == max_keywords {
            break;
        }
    }
    keywords
}
