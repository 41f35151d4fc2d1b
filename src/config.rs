//! Settings for suitecheck.
//!
//! Values come from an optional TOML file layered under environment
//! variables (environment wins). Required values are never silently
//! defaulted: a missing API key or an out-of-range number fails here,
//! before any remote call is attempted.

use crate::llm::{CompletionClient, RequestSpec, RetryPolicy, StructuredCompletionClient};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1-mini";

const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_MAX_TOKENS: u32 = 16_000;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: f64 = 2.0;
const DEFAULT_BACKOFF_FACTOR: f64 = 3.0;
const DEFAULT_PRACTICES_PATH: &str = "data/best_practices.json";

/// On-disk settings file shape. Every field optional; resolution applies
/// defaults and environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    api_key: Option<String>,
    api_base: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    seed: Option<u64>,
    requests_per_minute: Option<u32>,
    retry_attempts: Option<u32>,
    retry_delay_secs: Option<f64>,
    backoff_factor: Option<f64>,
    practices_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub seed: Option<u64>,
    pub requests_per_minute: u32,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub backoff_factor: f64,
    pub practices_path: PathBuf,
}

impl Settings {
    /// Load settings from `config_path` (or the default user config file if
    /// it exists), apply environment overrides, then validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) => read_settings_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => read_settings_file(&path)?,
                _ => SettingsFile::default(),
            },
        };

        let settings = Settings {
            api_key: env_var("OPENROUTER_API_KEY")
                .or(file.api_key)
                .unwrap_or_default(),
            api_base: env_var("OPENROUTER_API_BASE")
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: env_var("SUITECHECK_MODEL")
                .or(file.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: env_parse("SUITECHECK_TEMPERATURE")?
                .or(file.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: env_parse("SUITECHECK_MAX_TOKENS")?
                .or(file.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: Duration::from_secs(
                env_parse("SUITECHECK_TIMEOUT_SECS")?
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            seed: env_parse("SUITECHECK_SEED")?.or(file.seed),
            requests_per_minute: env_parse("SUITECHECK_RPM")?
                .or(file.requests_per_minute)
                .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE),
            retry_attempts: env_parse("SUITECHECK_RETRY_ATTEMPTS")?
                .or(file.retry_attempts)
                .unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            retry_delay: Duration::from_secs_f64(
                env_parse("SUITECHECK_RETRY_DELAY")?
                    .or(file.retry_delay_secs)
                    .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            ),
            backoff_factor: env_parse("SUITECHECK_BACKOFF_FACTOR")?
                .or(file.backoff_factor)
                .unwrap_or(DEFAULT_BACKOFF_FACTOR),
            practices_path: env_var("SUITECHECK_PRACTICES")
                .map(PathBuf::from)
                .or(file.practices_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PRACTICES_PATH)),
        };

        settings.validate()?;

        if !settings.practices_path.is_file() {
            bail!(
                "best practices catalog not found: {}",
                settings.practices_path.display()
            );
        }

        Ok(settings)
    }

    /// Numeric and presence validation. Required values fail here rather
    /// than being defaulted.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("OPENROUTER_API_KEY is not set (environment variable or `api_key` in the config file)");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be within [0, 2], got {}", self.temperature);
        }
        if self.max_tokens == 0 {
            bail!("max tokens must be greater than zero");
        }
        if self.requests_per_minute == 0 {
            bail!("requests per minute must be greater than zero");
        }
        if self.retry_attempts == 0 {
            bail!("retry attempts must be at least 1");
        }
        if self.backoff_factor < 1.0 || !self.backoff_factor.is_finite() {
            bail!("backoff factor must be >= 1, got {}", self.backoff_factor);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.retry_attempts,
            self.retry_delay,
            self.backoff_factor,
        )?)
    }

    /// Shape a request from these settings and a prompt pair.
    pub fn request_spec(&self, system_prompt: String, user_message: String) -> RequestSpec {
        RequestSpec::new(self.model.clone(), system_prompt, user_message)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_seed(self.seed)
    }

    pub fn build_client(&self) -> Result<StructuredCompletionClient> {
        let client = CompletionClient::new(
            &self.api_base,
            &self.api_key,
            self.requests_per_minute,
            self.retry_policy()?,
            self.timeout,
        )?;
        Ok(StructuredCompletionClient::new(client))
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config file: {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("suitecheck").join("config.toml"))
}

/// Read a trimmed, non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_var(name) {
        Some(raw) => {
            let value = raw
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", name, raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        Settings {
            api_key: "sk-test".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 16_000,
            timeout: Duration::from_secs(300),
            seed: None,
            requests_per_minute: 60,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            backoff_factor: 3.0,
            practices_path: PathBuf::from(DEFAULT_PRACTICES_PATH),
        }
    }

    #[test]
    fn test_valid_settings_pass_validation() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut settings = valid_settings();
        settings.api_key = String::new();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_out_of_range_temperature_rejected() {
        let mut settings = valid_settings();
        settings.temperature = 2.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut settings = valid_settings();
        settings.requests_per_minute = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut settings = valid_settings();
        settings.retry_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_file_parses() {
        let file: SettingsFile = toml::from_str(
            r#"
            model = "anthropic/claude-sonnet-4.5"
            temperature = 0.2
            requests_per_minute = 30
            retry_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(file.model.as_deref(), Some("anthropic/claude-sonnet-4.5"));
        assert_eq!(file.requests_per_minute, Some(30));
        assert!(file.api_key.is_none());
    }

    #[test]
    fn test_request_spec_carries_settings() {
        let mut settings = valid_settings();
        settings.seed = Some(42);
        settings.max_tokens = 2048;
        let spec = settings.request_spec("system".to_string(), "user".to_string());
        assert_eq!(spec.model, DEFAULT_MODEL);
        assert_eq!(spec.seed, Some(42));
        assert_eq!(spec.max_tokens, 2048);
        assert_eq!(spec.temperature, 0.0);
    }
}
