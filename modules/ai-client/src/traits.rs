use async_trait::async_trait;

use crate::error::AiError;

// =============================================================================
// ChatModel Trait
// =============================================================================

/// A single-shot chat completion endpoint.
///
/// The model is chosen per call so one client can serve evaluators that run
/// on different models. Responses are unstructured text; callers own parsing.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logs.
    fn provider(&self) -> &'static str;

    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError>;
}
