//! Best-effort repair of decorated, truncated or noisy model output.
//!
//! Everything here is a pure text transformation. The scanners are explicit
//! single-pass state machines (string state, escape flag, brace depth); only
//! "find the last balanced prefix" and "find the first balanced candidate"
//! are needed, so no general parser is involved.

use serde_json::Value;

/// Strip a single layer of markdown code-fence decoration.
///
/// Idempotent: fence-free input comes back unchanged (modulo outer
/// whitespace trimming).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// Truncate a partially emitted JSON document back to its last structurally
/// balanced prefix.
///
/// Returns the prefix ending at the last offset where outer `{}` depth
/// returns to zero, or `None` when no object ever opens or the depth never
/// rebalances (truncation mid-nesting). Braces inside strings are ignored.
pub fn truncate_to_balanced(text: &str) -> Option<&str> {
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut opened = false;
    let mut last_balanced = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                depth += 1;
                opened = true;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        last_balanced = Some(i);
                    }
                }
            }
            _ => {}
        }
    }

    if !opened {
        return None;
    }
    last_balanced.map(|end| &text[..=end])
}

/// Scan for the first balanced `{…}` candidate that parses as JSON.
///
/// Candidates are tried left to right; one that balances but does not parse
/// is skipped and the scan restarts just past its opening brace, so braces
/// inside failed candidates do not poison later ones.
pub fn extract_first_object(text: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find('{') {
        let start = search_from + found;
        if let Some(len) = balanced_object_len(&text[start..]) {
            let candidate = &text[start..start + len];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the balanced object starting at `text`'s first character,
/// which must be `{`. `None` when the object never closes.
fn balanced_object_len(text: &str) -> Option<usize> {
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_fences_json_block() {
        assert_eq!(strip_code_fences("```json\n{\"x\":1}\n```"), "{\"x\":1}");
    }

    #[test]
    fn test_strip_fences_plain_block() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_strip_fences_is_idempotent() {
        let clean = "{\"a\": 1}";
        assert_eq!(strip_code_fences(clean), clean);
        assert_eq!(strip_code_fences(strip_code_fences(clean)), clean);
    }

    #[test]
    fn test_truncate_mid_nesting_yields_nothing() {
        // Outer depth never returns to zero, so there is no balanced prefix.
        assert_eq!(truncate_to_balanced(r#"{"a": {"b": 1}, "c": [1,2,3"#), None);
    }

    #[test]
    fn test_truncate_recovers_last_balanced_prefix() {
        let text = r#"{"a": {"b": 1}}, "c": [1,2"#;
        let prefix = truncate_to_balanced(text).unwrap();
        assert_eq!(prefix, r#"{"a": {"b": 1}}"#);
        assert!(serde_json::from_str::<Value>(prefix).is_ok());
    }

    #[test]
    fn test_truncate_ignores_braces_in_strings() {
        let text = r#"{"a": "close} brace", "b": 2}"#;
        assert_eq!(truncate_to_balanced(text), Some(text));
    }

    #[test]
    fn test_truncate_handles_escaped_quote() {
        let text = r#"{"a": "quote \" then } brace"}"#;
        assert_eq!(truncate_to_balanced(text), Some(text));
    }

    #[test]
    fn test_truncate_without_object_yields_nothing() {
        assert_eq!(truncate_to_balanced("no json here"), None);
    }

    #[test]
    fn test_extract_from_surrounding_prose() {
        let value = extract_first_object("Here is the result: {\"x\":1}\nThanks").unwrap();
        assert_eq!(value, json!({"x": 1}));
    }

    #[test]
    fn test_extract_skips_unparseable_candidates() {
        // The first balanced candidate is not valid JSON; scanning continues
        // left to right to the next one.
        let text = r#"blah {a:1} blah {"a":2,"b":{}} blah"#;
        let value = extract_first_object(text).unwrap();
        assert_eq!(value, json!({"a": 2, "b": {}}));
    }

    #[test]
    fn test_extract_finds_inner_object_when_outer_never_closes() {
        let value = extract_first_object(r#"{"a": {"b": 1}"#).unwrap();
        assert_eq!(value, json!({"b": 1}));
    }

    #[test]
    fn test_extract_nothing_from_plain_text() {
        assert!(extract_first_object("no braces at all").is_none());
    }
}
