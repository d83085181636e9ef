//! OpenAI-compatible generator implementation

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::llm::{
    errors::{LlmError, LlmResult},
    provider::{utils, TextGenerator},
    types::{GenerateOptions, ProviderConfig},
};

/// Text generator for the OpenAI chat completions API and compatible servers
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    /// Create a new OpenAI generator
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let mut headers = HeaderMap::new();

        if let Some(api_key) = &config.api_key {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::ConfigError(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        } else {
            return Err(LlmError::ConfigError("API key is required".to_string()));
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("colloquy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> String {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');
        format!("{}/chat/completions", base_url)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> LlmResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: options.max_tokens.or(self.config.max_tokens),
            temperature: options.temperature.or(self.config.temperature),
        };

        debug!("Sending chat completion request to {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_transport)?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                return Err(LlmError::AuthError(
                    utils::extract_error_message(response).await,
                ))
            }
            429 => {
                return Err(LlmError::RateLimitError(
                    utils::extract_error_message(response).await,
                ))
            }
            _ if !status.is_success() => {
                return Err(LlmError::ApiError(
                    utils::extract_error_message(response).await,
                ))
            }
            _ => {}
        }

        let body: ChatCompletionResponse = response.json().await.map_err(LlmError::from_transport)?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| utils::sanitize_content(content.trim()))
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse(self.name().to_string()));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn validate_config(&self) -> LlmResult<()> {
        if self.config.model.trim().is_empty() {
            return Err(LlmError::ConfigError("Model is required".to_string()));
        }
        Ok(())
    }
}
