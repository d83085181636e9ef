//! Generator trait and factory for text generation backends

use async_trait::async_trait;
use std::sync::Arc;

use crate::llm::{
    errors::{LlmError, LlmResult},
    ollama::OllamaGenerator,
    openai::OpenAiGenerator,
    types::{GenerateOptions, ProviderConfig},
};

/// A collaborator that turns a prompt into text.
///
/// Implementations may fail for any network or model reason; callers in this
/// crate treat every failure as terminal for the attempt that triggered it.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> LlmResult<String>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Validate the configuration
    fn validate_config(&self) -> LlmResult<()>;
}

/// Factory for creating generators
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a generator from configuration.
    ///
    /// Returns `Ok(None)` for the `none` provider, which disables titling.
    pub fn create_generator(config: ProviderConfig) -> LlmResult<Option<Arc<dyn TextGenerator>>> {
        let generator: Arc<dyn TextGenerator> = match config.provider_type.as_str() {
            "none" => return Ok(None),
            "ollama" => Arc::new(OllamaGenerator::new(config)?),
            "openai" => Arc::new(OpenAiGenerator::new(config)?),
            other => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported provider type: {}",
                    other
                )))
            }
        };

        generator.validate_config()?;
        Ok(Some(generator))
    }

    /// Get available provider types
    pub fn available_providers() -> Vec<&'static str> {
        vec!["ollama", "openai", "none"]
    }
}

/// Utility functions for generator implementations
pub mod utils {
    use std::time::Duration;

    /// Build an HTTP client with the configured request timeout
    pub fn http_client(timeout_seconds: u64) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("colloquy/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    /// Strip control characters other than newlines and tabs
    pub fn sanitize_content(content: &str) -> String {
        content
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }

    /// Extract error message from HTTP response
    pub async fn extract_error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.text().await {
            Ok(text) => {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                    if let Some(error) = json.get("error") {
                        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                            return format!("{}: {}", status, message);
                        }
                        if let Some(message) = error.as_str() {
                            return format!("{}: {}", status, message);
                        }
                    }
                }
                format!("{}: {}", status, text)
            }
            Err(_) => format!("{}: Failed to read error response", status),
        }
    }
}
