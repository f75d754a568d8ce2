use crate::error::RefineryError;
use crate::file_config::Provider;

/// Secrets and environment-specific values. Everything tunable lives in the
/// TOML [`FileConfig`](crate::FileConfig).
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub database_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
}

impl Secrets {
    /// Read secrets from the environment, loading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: non_empty_env("DATABASE_URL"),
            anthropic_api_key: non_empty_env("ANTHROPIC_API_KEY"),
            openrouter_api_key: non_empty_env("OPENROUTER_API_KEY"),
        }
    }

    pub fn require_database_url(&self) -> Result<&str, RefineryError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| RefineryError::config("DATABASE_URL environment variable is required"))
    }

    /// API key for the configured inference provider.
    pub fn require_api_key(&self, provider: Provider) -> Result<&str, RefineryError> {
        let (key, name) = match provider {
            Provider::Claude => (&self.anthropic_api_key, "ANTHROPIC_API_KEY"),
            Provider::OpenRouter => (&self.openrouter_api_key, "OPENROUTER_API_KEY"),
        };
        key.as_deref().ok_or_else(|| {
            RefineryError::config(format!(
                "{name} environment variable is required for provider {provider}"
            ))
        })
    }

    pub fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let head: String = v.chars().take(5).collect();
                    format!("{head}...({} chars)", v.chars().count())
                }
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Secrets loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
        tracing::info!("  OPENROUTER_API_KEY: {}", preview(&self.openrouter_api_key));
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
