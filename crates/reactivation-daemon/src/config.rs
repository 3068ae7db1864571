//! Configuration loaded from environment variables.

use std::env;

use reactivation_engine::EngineConfig;

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL.
    pub database_url: String,
    /// Endpoint that receives outbound follow-ups. Messages are only logged when unset.
    pub webhook_url: Option<String>,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SQLITE_PATH` | SQLite path or URL | `./data/reactivation.db` |
    /// | `OUTBOUND_WEBHOOK_URL` | HTTP endpoint for follow-ups | (log only) |
    ///
    /// Engine tuning is read by [`EngineConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = database_url(
            &env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/reactivation.db".to_string()),
        );

        let webhook_url = match env::var("OUTBOUND_WEBHOOK_URL") {
            Ok(url) if url.trim().is_empty() => None,
            Ok(url) if url.starts_with("http://") || url.starts_with("https://") => Some(url),
            Ok(url) => return Err(ConfigError::InvalidWebhookUrl(url)),
            Err(_) => None,
        };

        let engine = EngineConfig::from_env()?;

        Ok(Self {
            database_url,
            webhook_url,
            engine,
        })
    }
}

/// Turn a plain file path into a SQLite URL that creates the file if needed.
fn database_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{}?mode=rwc", path)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OUTBOUND_WEBHOOK_URL must be an http(s) URL, got {0:?}")]
    InvalidWebhookUrl(String),

    #[error(transparent)]
    Engine(#[from] reactivation_engine::ConfigError),
}
