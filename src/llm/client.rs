use super::error::LlmError;
use super::limiter::RateLimiter;
use super::models::{CompletionResult, RequestSpec, RetryPolicy, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Chat completions endpoint, relative to the configured API base.
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Issues one chat-style request per attempt against an OpenRouter-compatible
/// API, with rate-limit admission, exponential backoff on transient failure
/// and a non-empty payload guarantee on success.
#[derive(Debug)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

#[derive(Serialize, Clone)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize, Clone)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
    refusal: Option<String>,
}

impl CompletionClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_minute: u32,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("API key must not be empty".to_string()));
        }
        let limiter = RateLimiter::new(requests_per_minute)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::Transport)?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            limiter,
            retry,
        })
    }

    /// Run the retry loop until a non-empty payload is obtained or attempts
    /// are exhausted. Transient failures (transport, non-2xx, empty payload)
    /// sleep `base_delay * backoff_factor^attempt` between attempts; a
    /// structured-output rejection short-circuits, since backoff cannot fix
    /// a deterministic capability mismatch.
    pub async fn complete(&self, spec: &RequestSpec) -> Result<CompletionResult, LlmError> {
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts {
            debug!(attempt = attempt + 1, model = %spec.model, "sending completion request");
            match self.attempt(spec).await {
                Ok(result) => return Ok(result),
                Err(err @ LlmError::SchemaRejected { .. }) => return Err(err),
                Err(err) => {
                    warn!(attempt = attempt + 1, error = %err, "completion attempt failed");
                    last_error = Some(err);
                    if attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        debug!("retrying in {:.2}s", delay.as_secs_f64());
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(LlmError::RemoteCallExhausted {
            attempts: self.retry.max_attempts,
            source: Box::new(last_error.unwrap_or_else(|| {
                LlmError::Config("retry loop completed without an attempt".to_string())
            })),
        })
    }

    /// One admitted request. When the provider rejects schema-constrained
    /// decoding, downgrade once to a plain `json_object` response mode within
    /// the same attempt; a second rejection propagates.
    async fn attempt(&self, spec: &RequestSpec) -> Result<CompletionResult, LlmError> {
        let mut request = build_request(spec);

        self.limiter.admit().await;
        match self.send(&request).await {
            Err(LlmError::SchemaRejected { detail })
                if request
                    .response_format
                    .as_ref()
                    .is_some_and(|f| f.json_schema.is_some()) =>
            {
                warn!(
                    detail = %detail,
                    "structured schema mode rejected; downgrading to json_object"
                );
                request.response_format = Some(ResponseFormat {
                    format_type: "json_object".to_string(),
                    json_schema: None,
                });
                self.limiter.admit().await;
                self.send(&request).await
            }
            other => other,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<CompletionResult, LlmError> {
        let url = format!("{}{}", self.api_base, CHAT_COMPLETIONS_PATH);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/suitecheck/suitecheck")
            .header("X-Title", "suitecheck")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if status.as_u16() == 400 && is_schema_rejection(&text) {
                return Err(LlmError::SchemaRejected {
                    detail: truncate_str(&text, 200).to_string(),
                });
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                detail: truncate_str(&text, 200).to_string(),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| LlmError::Api {
            status: status.as_u16(),
            detail: format!("unparseable completion body: {}", e),
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = usage.cost(),
                "completion usage"
            );
        }

        let choice = parsed.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let refusal = choice.as_ref().and_then(|c| c.message.refusal.clone());
        let content = choice
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            // Empty payloads from hosted models are usually transient
            // content-filter or provider hiccups; fold them into the same
            // retry loop as transport failures.
            warn!(
                finish_reason = finish_reason.as_deref().unwrap_or("unknown"),
                refusal = refusal.as_deref().unwrap_or(""),
                "completion payload was empty"
            );
            return Err(LlmError::EmptyResponse {
                finish_reason: finish_reason.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        Ok(CompletionResult {
            content,
            finish_reason,
            refusal,
            usage: parsed.usage,
        })
    }
}

fn build_request(spec: &RequestSpec) -> ChatRequest {
    let response_format = spec.response_schema.as_ref().map(|schema| ResponseFormat {
        format_type: "json_schema".to_string(),
        json_schema: Some(schema.clone()),
    });

    ChatRequest {
        model: spec.model.clone(),
        messages: vec![
            Message {
                role: "system".to_string(),
                content: spec.system_prompt.clone(),
            },
            Message {
                role: "user".to_string(),
                content: spec.user_message.clone(),
            },
        ],
        temperature: spec.temperature,
        max_tokens: spec.max_tokens,
        stream: false,
        seed: spec.seed,
        response_format,
    }
}

/// Heuristic for provider errors that mean "this model does not accept a
/// structured-output schema directive", as opposed to a bad request.
fn is_schema_rejection(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("response_format")
        || lower.contains("json_schema")
        || lower.contains("structured output")
}

/// Truncate a string for diagnostics (Unicode-safe).
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
