//! Error types for text generation backends

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

impl LlmError {
    /// Classify a transport failure, separating timeouts from other HTTP errors
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LlmError::TimeoutError(error.to_string())
        } else {
            LlmError::HttpError(error)
        }
    }
}

pub type LlmResult<T> = Result<T, LlmError>;
