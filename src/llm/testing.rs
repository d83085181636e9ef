//! Scripted generator used by unit tests

use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use super::{
    errors::{LlmError, LlmResult},
    provider::TextGenerator,
    types::GenerateOptions,
};

/// Replays canned replies in order and records every prompt it receives
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<LlmResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// A generator answering with a title then a keyword list
    pub fn titled(title: &str, keywords: &str) -> Self {
        Self::new(vec![Ok(title.to_string()), Ok(keywords.to_string())])
    }

    pub fn failing() -> Self {
        Self::new(vec![Err(LlmError::ApiError("503: model overloaded".to_string()))])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::EmptyResponse("scripted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn validate_config(&self) -> LlmResult<()> {
        Ok(())
    }
}
