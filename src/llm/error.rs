use thiserror::Error;

/// Failure taxonomy for the completion pipeline.
///
/// `Api`, `Transport` and `EmptyResponse` are transient and consumed by the
/// retry loop; the remaining variants are terminal for a single call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Invalid client or retry configuration, raised before any request.
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-success HTTP status from the provider.
    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    /// Network-level failure (connect, TLS, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider returned a successful response with no usable text.
    #[error("empty completion payload (finish reason: {finish_reason})")]
    EmptyResponse { finish_reason: String },

    /// All retry attempts were consumed; carries the last underlying cause.
    #[error("remote call failed after {attempts} attempts: {source}")]
    RemoteCallExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },

    /// The target model rejected structured-output decoding. Deterministic,
    /// so never backoff-retried.
    #[error("model rejected structured output mode: {detail}")]
    SchemaRejected { detail: String },

    /// Response text survived every repair strategy without parsing.
    /// Excerpts are bounded; the full payload is never attached.
    #[error("malformed JSON response ({length} bytes, head: {head:?}, tail: {tail:?}): {source}")]
    MalformedResponse {
        length: usize,
        head: String,
        tail: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LlmError {
    /// Whether the retry loop should fold this failure into backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Api { .. } | LlmError::Transport(_) | LlmError::EmptyResponse { .. }
        )
    }
}
