mod client;
pub(crate) mod types;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::ChatModel;
use client::ClaudeClient;
use types::*;

// =============================================================================
// Claude
// =============================================================================

/// Anthropic Messages API client.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    http: reqwest::Client,
    base_url: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            base_url: None,
            max_tokens: 2048,
            temperature: None,
        }
    }

    pub fn from_env() -> Result<Self, AiError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            AiError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.http.clone());
        match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        }
    }
}

#[async_trait]
impl ChatModel for Claude {
    fn provider(&self) -> &'static str {
        "claude"
    }

    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError> {
        let request = ChatRequest::new(model)
            .system(system_prompt)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .message(WireMessage::user(user_prompt));

        let response = self.client().chat(&request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse("Claude"));
        }
        Ok(text)
    }
}
