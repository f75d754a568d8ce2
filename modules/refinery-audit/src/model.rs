use std::sync::Arc;
use std::time::Duration;

use ai_client::{AiError, ChatModel};
use async_trait::async_trait;
use refinery_common::RefineryError;
use tracing::warn;

/// The capability evaluators use to reach the inference service.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn call(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, RefineryError>;
}

/// [`ModelCaller`] over a [`ChatModel`], with a per-call timeout and a bounded
/// number of retries for rate limits and server errors.
pub struct ChatModelCaller {
    chat: Arc<dyn ChatModel>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl ChatModelCaller {
    pub fn new(chat: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self {
            chat,
            timeout,
            max_retries: 1,
            backoff: Duration::from_secs(2),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl ModelCaller for ChatModelCaller {
    async fn call(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, RefineryError> {
        let mut attempt = 0;
        loop {
            let call = self.chat.complete(model, system_prompt, user_prompt);
            let err = match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e,
                Err(_) => {
                    return Err(RefineryError::TransientIo(format!(
                        "{} call timed out after {:?}",
                        self.chat.provider(),
                        self.timeout
                    )))
                }
            };

            if !err.is_transient() || attempt >= self.max_retries {
                return Err(ai_error(err));
            }
            attempt += 1;
            warn!(
                provider = self.chat.provider(),
                attempt,
                error = %err,
                "Transient inference error, retrying"
            );
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}

fn ai_error(e: AiError) -> RefineryError {
    match e {
        AiError::Config(msg) => RefineryError::Config(msg),
        other => RefineryError::TransientIo(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        status: u16,
    }

    #[async_trait]
    impl ChatModel for Flaky {
        fn provider(&self) -> &'static str {
            "flaky"
        }

        async fn complete(&self, _: &str, _: &str, _: &str) -> Result<String, AiError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AiError::Api {
                    status: self.status,
                    body: "nope".into(),
                });
            }
            Ok("Output: Bullish".into())
        }
    }

    struct Sleepy;

    #[async_trait]
    impl ChatModel for Sleepy {
        fn provider(&self) -> &'static str {
            "sleepy"
        }

        async fn complete(&self, _: &str, _: &str, _: &str) -> Result<String, AiError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let caller = ChatModelCaller::new(
            Arc::new(Flaky {
                failures_left: AtomicU32::new(1),
                status: 503,
            }),
            Duration::from_secs(1),
        )
        .with_retries(1, Duration::from_millis(1));
        assert_eq!(caller.call("m", "s", "u").await.unwrap(), "Output: Bullish");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let caller = ChatModelCaller::new(
            Arc::new(Flaky {
                failures_left: AtomicU32::new(1),
                status: 400,
            }),
            Duration::from_secs(1),
        )
        .with_retries(3, Duration::from_millis(1));
        assert!(caller.call("m", "s", "u").await.is_err());
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let caller = ChatModelCaller::new(Arc::new(Sleepy), Duration::from_millis(20));
        let err = caller.call("m", "s", "u").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
