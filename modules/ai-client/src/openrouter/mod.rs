mod client;
pub(crate) mod types;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::ChatModel;
use client::OpenRouterClient;
use types::ChatRequest;

// =============================================================================
// OpenRouter
// =============================================================================

/// OpenRouter chat-completions client. Model ids use the `vendor/model` form.
#[derive(Clone)]
pub struct OpenRouter {
    api_key: String,
    http: reqwest::Client,
    app_name: Option<String>,
    site_url: Option<String>,
    max_tokens: Option<u32>,
}

impl OpenRouter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            app_name: None,
            site_url: None,
            max_tokens: None,
        }
    }

    pub fn from_env() -> Result<Self, AiError> {
        let api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
            AiError::Config("OPENROUTER_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn client(&self) -> OpenRouterClient {
        let mut client = OpenRouterClient::new(&self.api_key, self.http.clone());
        if let Some(ref name) = self.app_name {
            client = client.with_app_name(name);
        }
        if let Some(ref url) = self.site_url {
            client = client.with_site_url(url);
        }
        client
    }
}

#[async_trait]
impl ChatModel for OpenRouter {
    fn provider(&self) -> &'static str {
        "openrouter"
    }

    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError> {
        let mut request = ChatRequest::new(model, system_prompt, user_prompt);
        request.max_tokens = self.max_tokens;
        self.client().chat(&request).await
    }
}
