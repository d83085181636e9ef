use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    errors::{LlmError, LlmResult},
    provider::{utils, TextGenerator},
    types::{GenerateOptions, ProviderConfig},
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Text generator backed by a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

/// Ollama generate request (for single prompts)
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama response format for generate
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaGenerator {
    /// Create a new Ollama generator from configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = utils::http_client(config.timeout_seconds)
            .map_err(|e| LlmError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> LlmResult<String> {
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            system: options.system.as_deref(),
            options: OllamaOptions {
                temperature: options.temperature.or(self.temperature),
                num_predict: options.max_tokens.or(self.max_tokens),
            },
        };

        debug!("Sending generate request to Ollama at {}", self.base_url);

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_transport)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimitError(
                utils::extract_error_message(response).await,
            ));
        }
        if !status.is_success() {
            return Err(LlmError::ApiError(
                utils::extract_error_message(response).await,
            ));
        }

        let body: OllamaGenerateResponse = response.json().await.map_err(LlmError::from_transport)?;
        if !body.done {
            debug!("Ollama reported an unfinished generation; using partial response");
        }

        let text = utils::sanitize_content(body.response.trim());
        if text.is_empty() {
            return Err(LlmError::EmptyResponse(self.name().to_string()));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn validate_config(&self) -> LlmResult<()> {
        if self.model.trim().is_empty() {
            return Err(LlmError::ConfigError("Ollama model name is required".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(LlmError::ConfigError(format!(
                "Ollama base URL must be http(s): {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let generator = OllamaGenerator::new(ProviderConfig::default()).unwrap();
        assert_eq!(generator.endpoint(), "http://localhost:11434/api/generate");
        assert!(generator.validate_config().is_ok());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = ProviderConfig {
            base_url: Some("http://gpu-box:11434/".to_string()),
            ..ProviderConfig::default()
        };
        let generator = OllamaGenerator::new(config).unwrap();
        assert_eq!(generator.endpoint(), "http://gpu-box:11434/api/generate");
    }

    #[test]
    fn test_request_omits_unset_options() {
        let request = OllamaGenerateRequest {
            model: "llama3.2",
            prompt: "hi",
            stream: false,
            system: None,
            options: OllamaOptions {
                temperature: None,
                num_predict: Some(32),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["options"]["num_predict"], 32);
        assert!(json["options"].get("temperature").is_none());
    }
}
