//! Error types for the session subsystem

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported export version {0}")]
    UnsupportedVersion(u32),

    #[error("Title generation failed: {0}")]
    Generation(String),
}

impl SessionError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Message suitable for showing to an end user in the chat surface
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { entity, id } => format!("No {} found with id {}.", entity, id),
            Self::Validation(message) => message.clone(),
            Self::Persistence(_) | Self::Io(_) => {
                "Session storage is unavailable right now; nothing was changed.".to_string()
            }
            Self::Serialization(_) => "That export file could not be read.".to_string(),
            Self::UnsupportedVersion(version) => {
                format!("Export version {} is not supported.", version)
            }
            Self::Generation(_) => "Could not generate a title for this session.".to_string(),
        }
    }
}

impl From<LlmError> for SessionError {
    fn from(error: LlmError) -> Self {
        Self::Generation(error.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_storage_details() {
        let error = SessionError::from(rusqlite::Error::InvalidQuery);
        assert!(!error.user_message().contains("InvalidQuery"));
    }

    #[test]
    fn test_generation_error_from_llm_error() {
        let error: SessionError = LlmError::TimeoutError("60s".to_string()).into();
        assert!(matches!(error, SessionError::Generation(ref m) if m.contains("60s")));
    }

    #[test]
    fn test_not_found_display() {
        let error = SessionError::not_found("session", "abc");
        assert_eq!(error.to_string(), "session not found: abc");
        assert!(error.is_not_found());
    }
}
