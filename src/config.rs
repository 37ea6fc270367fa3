//! Configuration management for askloop.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `DEFAULT_MODEL` - Optional. Model used when a request names none. Defaults to `LLaMA 2`.
//! - `TEMPERATURE` - Optional. Default sampling temperature. Defaults to `0.1`.
//! - `MAX_ITERATIONS` - Optional. Maximum actions per question. Defaults to `10`.
//! - `CONTEXT_FRACTION` - Optional. Share of the free context window a tool result may use. Defaults to `0.8`.
//! - `MAX_RESPONSE_TOKENS` - Optional. Tokens each model call may generate. Defaults to `1000`.
//! - `PROMPT_TEMPLATE_PATH` - Optional. System prompt template file. Defaults to the built-in template.
//! - `BROWSER` - Optional. One of `Chrome`, `Firefox`, `Safari`, `Edge`, `Headless`. Unset means headless HTTP.
//! - `WEBDRIVER_URL` - Optional. WebDriver endpoint for non-headless browsers. Defaults to `http://localhost:4444`.
//! - `OPENAI_API_KEY` - Optional. Enables the GPT models.
//! - `ANTHROPIC_API_KEY` - Optional. Enables the Claude models.
//! - `HUGGING_FACE_HUB_TOKEN` - Optional. Enables the LLaMA models served by Hugging Face.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::tools::Browser;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the hosted model providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    /// OpenAI API key
    pub openai: Option<String>,

    /// Anthropic API key
    pub anthropic: Option<String>,

    /// Hugging Face access token
    pub huggingface: Option<String>,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Catalog name of the model used when a request does not pick one
    pub default_model: String,

    /// Default sampling temperature
    pub temperature: f32,

    /// Maximum number of actions executed for each question
    pub max_iterations: usize,

    /// Fraction of the remaining context window a tool result may fill
    pub context_fraction: f64,

    /// Maximum tokens each model call may generate
    pub max_response_tokens: u32,

    /// System prompt template file (built-in template when unset)
    pub prompt_template_path: Option<PathBuf>,

    /// Browser used to fetch pages (`None` means plain HTTP)
    pub browser: Option<Browser>,

    /// WebDriver endpoint used when a real browser is selected
    pub webdriver_url: String,

    /// Model provider credentials
    pub keys: ProviderKeys,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set to something
    /// that cannot be parsed or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_env("PORT", 3000u16)?;

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "LLaMA 2".to_string());

        let temperature = parse_env("TEMPERATURE", 0.1f32)?;
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=1.0", temperature),
            ));
        }

        let max_iterations = parse_env("MAX_ITERATIONS", 10usize)?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let context_fraction = parse_env("CONTEXT_FRACTION", 0.8f64)?;
        if !(context_fraction > 0.0 && context_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "CONTEXT_FRACTION".to_string(),
                format!("{} is outside (0, 1]", context_fraction),
            ));
        }

        let max_response_tokens = parse_env("MAX_RESPONSE_TOKENS", 1000u32)?;

        let prompt_template_path = std::env::var("PROMPT_TEMPLATE_PATH").ok().map(PathBuf::from);

        let browser = std::env::var("BROWSER")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                Browser::from_str(v.trim())
                    .map_err(|e| ConfigError::InvalidValue("BROWSER".to_string(), e.to_string()))
            })
            .transpose()?;

        let webdriver_url = std::env::var("WEBDRIVER_URL")
            .unwrap_or_else(|_| "http://localhost:4444".to_string());
        url::Url::parse(&webdriver_url).map_err(|e| {
            ConfigError::InvalidValue("WEBDRIVER_URL".to_string(), e.to_string())
        })?;

        let keys = ProviderKeys {
            openai: non_empty_env("OPENAI_API_KEY"),
            anthropic: non_empty_env("ANTHROPIC_API_KEY"),
            huggingface: non_empty_env("HUGGING_FACE_HUB_TOKEN"),
        };

        Ok(Self {
            host,
            port,
            default_model,
            temperature,
            max_iterations,
            context_fraction,
            max_response_tokens,
            prompt_template_path,
            browser,
            webdriver_url,
            keys,
        })
    }

    /// Create a config with default values (useful for testing).
    pub fn new(default_model: String) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            default_model,
            temperature: 0.1,
            max_iterations: 10,
            context_fraction: 0.8,
            max_response_tokens: 1000,
            prompt_template_path: None,
            browser: None,
            webdriver_url: "http://localhost:4444".to_string(),
            keys: ProviderKeys::default(),
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
