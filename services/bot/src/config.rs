use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use systrack_core::states::Features;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Supported LLM providers. All of them are reached through an
/// OpenAI-compatible chat completions endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
    Anthropic,
}

impl Provider {
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1/",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::Anthropic => "https://api.anthropic.com/v1/",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub transitions_path: PathBuf,
    pub curriculum_path: PathBuf,
    pub locales_path: PathBuf,
    pub guides_search_url: Option<String>,
    /// Language the guides search is asked to answer in.
    pub guides_lang: String,
    pub knowledge_search_url: Option<String>,
    pub search_timeout: Duration,
    pub strict_transitions: bool,
    pub features: Features,
}

fn path_var(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn flag_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{raw}' is not a boolean"),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let provider_str = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            "anthropic" => Provider::Anthropic,
            _ => Provider::OpenAI,
        };

        let openai_api_key = optional_var("OPENAI_API_KEY");
        let gemini_api_key = optional_var("GEMINI_API_KEY");
        let anthropic_api_key = optional_var("ANTHROPIC_API_KEY");

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let search_timeout = match std::env::var("SEARCH_TIMEOUT_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::InvalidValue("SEARCH_TIMEOUT_MS".to_string(), e.to_string()))?,
            Err(_) => Duration::from_millis(8000),
        };

        let config = Self {
            bind_address,
            database_url,
            provider,
            openai_api_key,
            gemini_api_key,
            anthropic_api_key,
            chat_model,
            log_level,
            transitions_path: path_var("TRANSITIONS_PATH", "./config/transitions.yaml"),
            curriculum_path: path_var("CURRICULUM_PATH", "./config/curriculum.yaml"),
            locales_path: path_var("LOCALES_PATH", "./locales"),
            guides_search_url: optional_var("GUIDES_SEARCH_URL"),
            guides_lang: optional_var("GUIDES_LANG").unwrap_or_else(|| "ru".to_string()),
            knowledge_search_url: optional_var("KNOWLEDGE_SEARCH_URL"),
            search_timeout,
            strict_transitions: flag_var("STRICT_TRANSITIONS", false)?,
            features: Features {
                marathon: flag_var("MARATHON_ENABLED", true)?,
                feed: flag_var("FEED_ENABLED", true)?,
            },
        };

        if config.api_key().is_none() {
            return Err(ConfigError::MissingVar(format!(
                "{} must be set for '{}' provider",
                config.provider.key_var(),
                provider_str.to_lowercase()
            )));
        }
        Ok(config)
    }

    /// The API key of the configured provider.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}
