use super::client::{truncate_str, CompletionClient};
use super::error::LlmError;
use super::models::RequestSpec;
use super::repair;
use serde_json::Value;
use tracing::{debug, warn};

/// Appended to every system prompt as defense in depth against models that
/// ignore the response-format directive.
const JSON_ONLY_INSTRUCTION: &str = "\n\nYou MUST respond with valid JSON only.";

/// Characters of head/tail excerpt attached to malformed-response errors.
const EXCERPT_CHARS: usize = 120;

/// Wraps [`CompletionClient`] to demand JSON output, sanitize it, parse it,
/// and fall back to repair strategies on parse failure.
pub struct StructuredCompletionClient {
    inner: CompletionClient,
}

impl StructuredCompletionClient {
    pub fn new(inner: CompletionClient) -> Self {
        Self { inner }
    }

    /// Obtain a completion and decode it into a JSON object.
    ///
    /// Guarantees on success: valid JSON with a top-level object. No
    /// semantic validation beyond that — the shape is the caller's schema's
    /// business.
    pub async fn complete_json(&self, spec: &RequestSpec) -> Result<Value, LlmError> {
        let mut spec = spec.clone();
        spec.system_prompt.push_str(JSON_ONLY_INSTRUCTION);

        let result = self.inner.complete(&spec).await?;
        parse_object(&result.content)
    }
}

/// Sanitize-and-parse cascade. Repair-by-truncation runs before blind
/// extraction: truncation (token budget hit mid-document) is the dominant
/// failure mode and its repair preserves more of the intended document than
/// brace scanning on a doubly-malformed body.
pub(crate) fn parse_object(content: &str) -> Result<Value, LlmError> {
    // An empty remainder after fence stripping fails the initial parse and
    // every repair strategy, so it is classified as malformed like any other
    // unparseable body.
    let clean = repair::strip_code_fences(content);

    let parse_error = match serde_json::from_str::<Value>(clean) {
        Ok(value) if value.is_object() => return Ok(value),
        // Parsed but not an object (bare array, scalar): look for an object
        // buried in the text before giving up.
        Ok(_) => None,
        Err(err) => Some(err),
    };

    if let Some(err) = &parse_error {
        // serde_json reports truncation as its EOF class (unterminated
        // strings, documents cut mid-object).
        if err.is_eof() {
            if let Some(prefix) = repair::truncate_to_balanced(clean) {
                if let Ok(value) = serde_json::from_str::<Value>(prefix) {
                    if value.is_object() {
                        warn!(
                            dropped_bytes = clean.len() - prefix.len(),
                            "recovered truncated JSON response"
                        );
                        return Ok(value);
                    }
                }
            }
        }
    }

    if let Some(value) = repair::extract_first_object(clean) {
        debug!("extracted JSON object from noisy response");
        return Ok(value);
    }

    // Every strategy failed; surface the original parse error with bounded
    // diagnostics. For a non-object parse, re-parsing as a map produces the
    // representative type error.
    match parse_error {
        Some(err) => Err(malformed(clean, err)),
        None => match serde_json::from_str::<serde_json::Map<String, Value>>(clean) {
            Ok(map) => Ok(Value::Object(map)),
            Err(err) => Err(malformed(clean, err)),
        },
    }
}

fn malformed(text: &str, source: serde_json::Error) -> LlmError {
    LlmError::MalformedResponse {
        length: text.len(),
        head: truncate_str(text, EXCERPT_CHARS).to_string(),
        tail: tail_str(text, EXCERPT_CHARS).to_string(),
        source,
    }
}

/// Last `max_chars` characters of a string (Unicode-safe).
fn tail_str(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let byte_idx = s
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[byte_idx..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_object() {
        assert_eq!(parse_object(r#"{"x": 1}"#).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_parse_fenced_object_in_prose() {
        let response = "Here is the result:\n```json\n{\"x\":1}\n```\nThanks";
        assert_eq!(parse_object(response).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_truncated_response_repaired_to_balanced_prefix() {
        let response = r#"{"verdict": "pass"}, "notes": ["unfinished"#;
        assert_eq!(parse_object(response).unwrap(), json!({"verdict": "pass"}));
    }

    #[test]
    fn test_truncation_without_balanced_prefix_falls_to_extraction() {
        // No prefix ever rebalances, so repair declines; extraction then
        // salvages the inner object that did close.
        let response = r#"{"a": {"b": 1}, "c": [1,2,3"#;
        assert_eq!(parse_object(response).unwrap(), json!({"b": 1}));
    }

    #[test]
    fn test_truncation_with_nothing_balanced_is_malformed() {
        let response = r#"{"a": 1, "b": "cut off mid-str"#;
        let err = parse_object(response).unwrap_err();
        match err {
            LlmError::MalformedResponse { length, head, .. } => {
                assert_eq!(length, response.len());
                assert!(head.starts_with(r#"{"a""#));
            }
            other => panic!("expected MalformedResponse, got {other}"),
        }
    }

    #[test]
    fn test_extraction_from_noisy_text() {
        let response = r#"Sure! blah {not json} blah {"a":2,"b":{}} blah"#;
        assert_eq!(parse_object(response).unwrap(), json!({"a": 2, "b": {}}));
    }

    #[test]
    fn test_bare_array_is_malformed_when_no_object_present() {
        let err = parse_object("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse { .. }));
    }

    #[test]
    fn test_empty_after_fence_stripping_is_malformed() {
        let err = parse_object("```json\n```").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse { .. }));
    }

    #[test]
    fn test_malformed_excerpts_are_bounded() {
        let long = format!("x{}", "y".repeat(5000));
        let err = parse_object(&long).unwrap_err();
        match err {
            LlmError::MalformedResponse { head, tail, length, .. } => {
                assert_eq!(length, 5001);
                assert!(head.chars().count() <= 120);
                assert!(tail.chars().count() <= 120);
                assert!(tail.ends_with('y'));
            }
            other => panic!("expected MalformedResponse, got {other}"),
        }
    }

    #[test]
    fn test_tail_str() {
        assert_eq!(tail_str("abcdef", 3), "def");
        assert_eq!(tail_str("ab", 3), "ab");
        assert_eq!(tail_str("ééééé", 2), "éé");
    }
}
