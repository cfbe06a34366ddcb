//! Research answer providers.
//!
//! The gateway talks to a `ResearchProvider` trait object: the OpenAI chat
//! API when `OPENAI_API_KEY` is configured, otherwise a deterministic echo
//! fallback so the service stays usable in development.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Model used when the client does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Answers a research question with the given model.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn answer(&self, question: &str, model: &str) -> Result<String>;
}

/// Pick the provider for this process: OpenAI when a key is configured,
/// echo fallback otherwise.
pub fn create_provider(api_key: Option<&str>) -> Arc<dyn ResearchProvider> {
    match api_key {
        Some(key) => Arc::new(OpenAiProvider::new(key)),
        None => Arc::new(EchoProvider),
    }
}

/// OpenAI chat-completions backend.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Point the provider at a different endpoint (tests, proxies).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ResearchProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn answer(&self, question: &str, model: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": question}],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("research provider request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("research provider returned {status}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("research provider returned malformed JSON")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("research provider returned no choices"))
    }
}

/// Development fallback: echoes the question back.
pub struct EchoProvider;

#[async_trait]
impl ResearchProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn answer(&self, question: &str, _model: &str) -> Result<String> {
        Ok(format!("(Dev fallback) You asked: {question}"))
    }
}
