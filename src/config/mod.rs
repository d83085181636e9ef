use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tracing::debug;

use crate::commands::DEFAULT_HISTORY_LIMIT;
use crate::llm::{ProviderConfig, ProviderFactory};
use crate::session::SessionSettings;

/// Application configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Directory holding `sessions.db`
    pub data_dir: PathBuf,

    /// Title generation provider (`ollama`, `openai` or `none`)
    pub provider: String,

    /// API key
    pub api_key: Option<String>,

    /// Base URL for the API
    pub base_url: Option<String>,

    /// Model to use
    pub model: String,

    /// Maximum tokens per generated reply
    pub max_tokens: Option<u32>,

    /// Temperature for sampling
    pub temperature: Option<f32>,

    /// Request timeout for the generator
    pub timeout: Duration,

    /// Idle time after which an active session is deactivated
    pub inactivity_timeout: Duration,

    /// Time between scheduler ticks
    pub tick_interval: Duration,

    pub title_min_messages: u32,
    pub title_context_messages: usize,

    /// Repurpose empty sessions of other pairs before creating new ones
    pub reuse_foreign_empty_sessions: bool,

    /// Sessions shown by `history` without an explicit count
    pub history_limit: usize,
}

/// On-disk form of the configuration; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Durations use humantime syntax, e.g. `"90s"` or `"5m"`
    pub timeout: Option<String>,
    pub inactivity_timeout: Option<String>,
    pub tick_interval: Option<String>,
    pub title_min_messages: Option<u32>,
    pub title_context_messages: Option<usize>,
    pub reuse_foreign_empty_sessions: Option<bool>,
    pub history_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = SessionSettings::default();
        let provider = ProviderConfig::default();
        Self {
            data_dir: default_data_dir(),
            provider: provider.provider_type,
            api_key: None,
            base_url: None,
            model: provider.model,
            max_tokens: provider.max_tokens,
            temperature: provider.temperature,
            timeout: Duration::from_secs(provider.timeout_seconds),
            inactivity_timeout: settings.inactivity_timeout,
            tick_interval: settings.tick_interval,
            title_min_messages: settings.title_min_messages,
            title_context_messages: settings.title_context_messages,
            reuse_foreign_empty_sessions: settings.reuse_foreign_empty_sessions,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("colloquy"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn parse_duration(name: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} must be a duration like \"5m\", got {:?}", name, raw))
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("{} has an invalid value: {:?}", name, raw))
}

impl Config {
    /// Initialize configuration from various sources
    pub async fn init() -> Result<Self> {
        debug!("Initializing configuration");

        let mut config = Self::default();

        // Load from environment variables
        config.load_from_env()?;

        // Try to load from configuration files
        if let Some(file_config) = Self::load_from_file().await? {
            config.merge_with(file_config)?;
        }

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(&mut self) -> Result<()> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Apply environment-style settings from `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_dir) = lookup("COLLOQUY_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Some(provider) = lookup("COLLOQUY_PROVIDER") {
            self.provider = provider.trim().to_lowercase();
        }

        // Provider-specific fallbacks
        if self.provider == "openai" && self.api_key.is_none() {
            self.api_key = lookup("OPENAI_API_KEY");
        }
        if self.provider == "ollama" {
            if let Some(host) = lookup("OLLAMA_HOST") {
                self.base_url = Some(host);
            }
        }

        if let Some(key) = lookup("COLLOQUY_API_KEY") {
            self.api_key = Some(key);
        }

        if let Some(base_url) = lookup("COLLOQUY_BASE_URL") {
            self.base_url = Some(base_url);
        }

        if let Some(model) = lookup("COLLOQUY_MODEL") {
            self.model = model;
        }

        if let Some(raw) = lookup("COLLOQUY_MAX_TOKENS") {
            self.max_tokens = Some(parse_value("COLLOQUY_MAX_TOKENS", &raw)?);
        }

        if let Some(raw) = lookup("COLLOQUY_TEMPERATURE") {
            self.temperature = Some(parse_value("COLLOQUY_TEMPERATURE", &raw)?);
        }

        if let Some(raw) = lookup("COLLOQUY_TIMEOUT") {
            self.timeout = parse_duration("COLLOQUY_TIMEOUT", &raw)?;
        }

        if let Some(raw) = lookup("COLLOQUY_INACTIVITY_TIMEOUT") {
            self.inactivity_timeout = parse_duration("COLLOQUY_INACTIVITY_TIMEOUT", &raw)?;
        }

        if let Some(raw) = lookup("COLLOQUY_TICK_INTERVAL") {
            self.tick_interval = parse_duration("COLLOQUY_TICK_INTERVAL", &raw)?;
        }

        if let Some(raw) = lookup("COLLOQUY_TITLE_MIN_MESSAGES") {
            self.title_min_messages = parse_value("COLLOQUY_TITLE_MIN_MESSAGES", &raw)?;
        }

        if let Some(raw) = lookup("COLLOQUY_REUSE_EMPTY_SESSIONS") {
            self.reuse_foreign_empty_sessions =
                matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        Ok(())
    }

    /// Load the first configuration file found.
    ///
    /// Lookup order:
    /// 1. ./.colloquy.json
    /// 2. ./colloquy.json
    /// 3. $CONFIG_DIR/colloquy/colloquy.json
    pub async fn load_from_file() -> Result<Option<FileConfig>> {
        let mut config_paths = vec![PathBuf::from("./.colloquy.json"), PathBuf::from("./colloquy.json")];

        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join("colloquy").join("colloquy.json"));
        }

        for path in config_paths {
            if path.exists() {
                debug!("Loading configuration from: {}", path.display());
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let config: FileConfig = serde_json::from_str(&content)
                    .with_context(|| format!("Invalid configuration in {}", path.display()))?;
                return Ok(Some(config));
            }
        }

        Ok(None)
    }

    /// Merge a configuration file into this one
    pub fn merge_with(&mut self, other: FileConfig) -> Result<()> {
        if let Some(data_dir) = other.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(provider) = other.provider {
            self.provider = provider.to_lowercase();
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if let Some(model) = other.model.filter(|m| !m.is_empty()) {
            self.model = model;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if let Some(raw) = other.timeout {
            self.timeout = parse_duration("timeout", &raw)?;
        }
        if let Some(raw) = other.inactivity_timeout {
            self.inactivity_timeout = parse_duration("inactivityTimeout", &raw)?;
        }
        if let Some(raw) = other.tick_interval {
            self.tick_interval = parse_duration("tickInterval", &raw)?;
        }
        if let Some(min) = other.title_min_messages {
            self.title_min_messages = min;
        }
        if let Some(count) = other.title_context_messages {
            self.title_context_messages = count;
        }
        if let Some(reuse) = other.reuse_foreign_empty_sessions {
            self.reuse_foreign_empty_sessions = reuse;
        }
        if let Some(limit) = other.history_limit {
            self.history_limit = limit;
        }
        Ok(())
    }

    /// Check if the configuration has a usable API key
    pub fn has_api_key(&self) -> bool {
        // Only OpenAI requires a key
        if self.provider != "openai" {
            return true;
        }
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !ProviderFactory::available_providers().contains(&self.provider.as_str()) {
            return Err(anyhow!(
                "Unknown provider '{}'. Expected one of: {}",
                self.provider,
                ProviderFactory::available_providers().join(", ")
            ));
        }

        if !self.has_api_key() {
            return Err(anyhow!(
                "No API key configured. Set OPENAI_API_KEY or COLLOQUY_API_KEY, or use COLLOQUY_PROVIDER=none to disable titles."
            ));
        }

        if self.provider != "none" && self.model.is_empty() {
            return Err(anyhow!("Model is required"));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow!("temperature must be between 0.0 and 2.0"));
            }
        }

        if self.inactivity_timeout.is_zero() {
            return Err(anyhow!("inactivity timeout must be greater than zero"));
        }

        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }

        if self.timeout.is_zero() {
            return Err(anyhow!("generator timeout must be greater than zero"));
        }

        if self.title_min_messages == 0 {
            return Err(anyhow!("title_min_messages must be at least 1"));
        }

        if self.title_context_messages == 0 {
            return Err(anyhow!("title_context_messages must be at least 1"));
        }

        Ok(())
    }

    /// Settings for the session subsystem
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            inactivity_timeout: self.inactivity_timeout,
            tick_interval: self.tick_interval,
            title_min_messages: self.title_min_messages,
            title_context_messages: self.title_context_messages,
            reuse_foreign_empty_sessions: self.reuse_foreign_empty_sessions,
        }
    }

    /// Settings for the title generator backend
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider_type: self.provider.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout_seconds: self.timeout.as_secs().max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_settings(), SessionSettings::default());
        assert_eq!(config.provider, "ollama");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("COLLOQUY_DATA_DIR", "/tmp/colloquy-test"),
                ("COLLOQUY_PROVIDER", "OpenAI"),
                ("OPENAI_API_KEY", "sk-test"),
                ("COLLOQUY_MODEL", "gpt-4o-mini"),
                ("COLLOQUY_INACTIVITY_TIMEOUT", "10m"),
                ("COLLOQUY_TICK_INTERVAL", "2s"),
                ("COLLOQUY_TITLE_MIN_MESSAGES", "4"),
                ("COLLOQUY_REUSE_EMPTY_SESSIONS", "false"),
            ]))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/colloquy-test"));
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.inactivity_timeout, Duration::from_secs(600));
        assert_eq!(config.tick_interval, Duration::from_secs(2));
        assert_eq!(config.title_min_messages, 4);
        assert!(!config.reuse_foreign_empty_sessions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ollama_host_sets_base_url() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("OLLAMA_HOST", "http://gpu-box:11434")]))
            .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://gpu-box:11434"));
    }

    #[test]
    fn test_bad_duration_is_an_error() {
        let mut config = Config::default();
        assert!(config
            .apply_env(env(&[("COLLOQUY_TICK_INTERVAL", "often")]))
            .is_err());
    }

    #[test]
    fn test_file_config_merges() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "provider": "none",
                "inactivityTimeout": "90s",
                "titleContextMessages": 10,
                "historyLimit": 5
            }"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.merge_with(file).unwrap();

        assert_eq!(config.provider, "none");
        assert_eq!(config.inactivity_timeout, Duration::from_secs(90));
        assert_eq!(config.title_context_messages, 10);
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.model, ProviderConfig::default().model);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let openai_without_key = Config {
            provider: "openai".to_string(),
            ..Config::default()
        };
        assert!(openai_without_key.validate().is_err());

        let unknown = Config {
            provider: "carrier-pigeon".to_string(),
            ..Config::default()
        };
        assert!(unknown.validate().is_err());

        let zero_tick = Config {
            tick_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(zero_tick.validate().is_err());

        let zero_min = Config {
            title_min_messages: 0,
            ..Config::default()
        };
        assert!(zero_min.validate().is_err());
    }

    #[test]
    fn test_provider_config_projection() {
        let config = Config {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            timeout: Duration::from_secs(30),
            ..Config::default()
        };
        let provider = config.provider_config();
        assert_eq!(provider.provider_type, "openai");
        assert_eq!(provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(provider.timeout_seconds, 30);
    }
}
