//! Prompt assembly for the evaluation calls.
//!
//! The prompts and the report schema define the contract with the model;
//! the pipeline underneath treats both as opaque.

use crate::analyzer::Mode;
use crate::practices::PracticeCatalog;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

const IMPROVE_REQUIREMENTS: &str = r#"- The "suggested_code" field must be a fully formatted and improved version of the test case, implementing all applicable best practices while maintaining the original logic. The improvements must preserve the effectiveness of the test suite: neither coverage nor mutation score may regress, and all edge cases must remain validated.

"#;

/// System prompt: strict output requirements plus the practice definitions.
pub fn build_system_prompt(catalog: &PracticeCatalog, mode: Mode) -> String {
    let count = catalog.len();
    let mut prompt = format!(
        r#"You are an expert in software testing and best practices for writing test cases.
Your task is to analyze the provided test code and compare it against the **{count} best practices** listed below.

📌 **Strict Output Requirements**
- Always return the response in **valid JSON format** following the provided JSON Schema.
- **Do not include any text or explanation** outside the JSON structure.
- Every response **must contain evaluations for all {count} best practices**, even if some are not applicable.
- The `"status"` field must always be one of the following:
  - `"✔️"` (Compliant)
  - `"❌"` (Non-Compliant)
  - `"⚪"` (Not Applicable)
- The `"compliance_score"` must be calculated as **(compliant practices ✔️ / {count}) * 100** and returned as a string with a percentage (e.g., `"85%"`).
"#
    );

    if mode == Mode::Improve {
        prompt.push_str(IMPROVE_REQUIREMENTS);
    }

    prompt.push('\n');
    prompt.push_str(&catalog.prompt_section(mode));
    prompt
}

/// User message wrapping the test code under evaluation.
pub fn build_user_message(test_code: &str, class_name: &str, practice_count: usize) -> String {
    format!(
        "Analyze the following test class and evaluate each of the {practice_count} best practices:\n\n\
         **Test Class:** {class_name}\n\n\
         ```\n{test_code}\n```\n\n\
         Please provide the complete analysis in the specified JSON format.\n"
    )
}

/// Structured-output schema descriptor for the evaluation report.
pub fn report_schema() -> Value {
    json!({
        "name": "test_evaluation_report",
        "strict": true,
        "schema": {
            "type": "object",
            "properties": {
                "test_class_name": {
                    "type": "string",
                    "description": "Name of the test class being evaluated"
                },
                "test_methods": {
                    "type": "array",
                    "description": "List of test methods in the class",
                    "items": {
                        "type": "object",
                        "properties": {
                            "test_method_name": {"type": "string"},
                            "practices_evaluation": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "practice_code": {"type": "string"},
                                        "practice_title": {"type": "string"},
                                        "status": {"type": "string"},
                                        "justification": {"type": "string"},
                                        "original_code": {"type": ["string", "null"]},
                                        "improved_code": {"type": ["string", "null"]}
                                    },
                                    "required": ["practice_code", "practice_title", "status", "justification"],
                                    "additionalProperties": false
                                }
                            },
                            "method_compliance_score": {"type": "string"},
                            "suggested_code": {"type": "string"}
                        },
                        "required": ["test_method_name", "practices_evaluation", "method_compliance_score", "suggested_code"],
                        "additionalProperties": false
                    }
                },
                "practices_report": {
                    "type": "array",
                    "description": "Summary report of compliance for each practice",
                    "items": {
                        "type": "object",
                        "properties": {
                            "practice_code": {"type": "string"},
                            "practice_title": {"type": "string"},
                            "description": {"type": "string"},
                            "compliant_methods": {"type": "integer"},
                            "non_compliant_methods": {"type": "integer"},
                            "not_applicable_methods": {"type": "integer"},
                            "total_methods": {"type": "integer"},
                            "compliance_score": {"type": "string"}
                        },
                        "required": [
                            "practice_code", "practice_title", "description",
                            "compliant_methods", "non_compliant_methods",
                            "not_applicable_methods", "total_methods", "compliance_score"
                        ],
                        "additionalProperties": false
                    }
                },
                "overall_compliance_score": {
                    "type": "string",
                    "description": "Overall compliance score"
                }
            },
            "required": ["test_class_name", "test_methods", "practices_report", "overall_compliance_score"],
            "additionalProperties": false
        }
    })
}

/// Extract the class name from test source, or `UnknownTestClass`.
///
/// A heuristic, not a parser: good enough for naming reports and prompts
/// across Java/Kotlin/C#-style test files.
pub fn extract_test_class_name(test_code: &str) -> String {
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();
    let re = CLASS_RE.get_or_init(|| {
        Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)")
            .unwrap_or_else(|_| Regex::new("$^").unwrap())
    });

    re.captures(test_code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "UnknownTestClass".to_string())
}
