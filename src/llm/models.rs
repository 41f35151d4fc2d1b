use super::error::LlmError;
use serde::Deserialize;
use std::time::Duration;

/// One outbound chat request, fully described. Immutable once built; the
/// pipeline creates one instance per call and discards it afterwards.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub system_prompt: String,
    pub user_message: String,
    /// Structured-output schema descriptor, sent as the `json_schema`
    /// response format when set.
    pub response_schema: Option<serde_json::Value>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: Option<u64>,
}

impl RequestSpec {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            response_schema: None,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 16_000,
            seed: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Retry configuration for the completion client.
///
/// Delay before retrying attempt `i` (0-indexed) is
/// `base_delay * backoff_factor^i`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Result<Self, LlmError> {
        if max_attempts == 0 {
            return Err(LlmError::Config(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if backoff_factor < 1.0 || !backoff_factor.is_finite() {
            return Err(LlmError::Config(format!(
                "backoff factor must be >= 1, got {}",
                backoff_factor
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            backoff_factor,
        })
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.backoff_factor.powi(attempt as i32))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 3.0,
        }
    }
}

/// Response payload plus the diagnostics channel. `content` is guaranteed
/// non-empty on success; emptiness is classified as failure upstream.
#[derive(Debug)]
pub struct CompletionResult {
    pub content: String,
    pub finish_reason: Option<String>,
    pub refusal: Option<String>,
    pub usage: Option<Usage>,
}

/// API usage information from OpenRouter, logged for diagnostics only.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    /// Actual cost in USD as reported by OpenRouter (`total_cost` in the
    /// usage object). Never estimated locally.
    #[serde(default, alias = "total_cost")]
    pub cost: Option<f64>,
}

impl Usage {
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_exact_exponential() {
        let policy = RetryPolicy::new(4, Duration::from_secs_f64(1.0), 2.0).unwrap();
        assert_eq!(policy.delay_for(0), Duration::from_secs_f64(1.0));
        assert_eq!(policy.delay_for(1), Duration::from_secs_f64(2.0));
        assert_eq!(policy.delay_for(2), Duration::from_secs_f64(4.0));
    }

    #[test]
    fn test_delay_monotonic_for_factor_at_least_one() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), 1.5).unwrap();
        let mut previous = Duration::ZERO;
        for attempt in 0..5 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_factor_of_one_keeps_delay_constant() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), 1.0).unwrap();
        assert_eq!(policy.delay_for(0), policy.delay_for(2));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = RetryPolicy::new(0, Duration::from_secs(1), 2.0).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_sub_one_factor_rejected() {
        assert!(RetryPolicy::new(3, Duration::from_secs(1), 0.5).is_err());
    }

    #[test]
    fn test_usage_deserialize_with_total_cost() {
        let json = r#"{"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150, "total_cost": 0.0025}"#;
        let usage: Usage = serde_json::from_str(json).unwrap();
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.cost(), 0.0025);
    }

    #[test]
    fn test_request_spec_builders() {
        let spec = RequestSpec::new("openai/gpt-4.1-mini", "system", "user")
            .with_temperature(0.2)
            .with_max_tokens(512)
            .with_seed(Some(42));
        assert_eq!(spec.model, "openai/gpt-4.1-mini");
        assert_eq!(spec.max_tokens, 512);
        assert_eq!(spec.seed, Some(42));
        assert!(spec.response_schema.is_none());
    }
}
