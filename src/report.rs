//! Output artifacts: JSON report, improved test file, Markdown summary.
//!
//! The report object is written verbatim — pretty-printed, non-ASCII
//! preserved — exactly as the model produced it.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File stem of the test set, used to derive every output file name.
pub fn test_stem(test_path: &Path) -> String {
    test_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "test_set".to_string())
}

pub fn report_path(test_path: &Path, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}_bp_report.json", test_stem(test_path)))
}

pub fn improved_path(test_path: &Path, out_dir: &Path) -> PathBuf {
    let extension = test_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    out_dir.join(format!("{}_improved{}", test_stem(test_path), extension))
}

pub fn summary_path(test_path: &Path, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}_improvement_summary.md", test_stem(test_path)))
}

/// Write the analysis report as pretty-printed JSON.
pub fn save_report(report: &Value, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write report: {}", path.display()))?;
    info!(path = %path.display(), "report saved");
    Ok(())
}

/// Write the improved test suite extracted from the report, falling back to
/// the original code when the model supplied none.
pub fn save_improved_test(
    report: &Value,
    original_code: &str,
    path: &Path,
) -> Result<()> {
    let code = match extract_improved_code(report) {
        Some(code) => code,
        None => {
            warn!("report contains no suggested code; writing original test unchanged");
            original_code.to_string()
        }
    };
    fs::write(path, code)
        .with_context(|| format!("failed to write improved test: {}", path.display()))?;
    info!(path = %path.display(), "improved test saved");
    Ok(())
}

pub fn save_summary(summary: &str, path: &Path) -> Result<()> {
    fs::write(path, summary)
        .with_context(|| format!("failed to write summary: {}", path.display()))?;
    info!(path = %path.display(), "summary saved");
    Ok(())
}

/// Pull the rewritten test code out of a report: a top-level
/// `improved_test_suite` string when present, otherwise the per-method
/// `suggested_code` blocks joined in report order.
pub fn extract_improved_code(report: &Value) -> Option<String> {
    if let Some(code) = report.get("improved_test_suite").and_then(Value::as_str) {
        if !code.trim().is_empty() {
            return Some(code.to_string());
        }
    }

    let blocks: Vec<&str> = report
        .get("test_methods")?
        .as_array()?
        .iter()
        .filter_map(|method| method.get("suggested_code").and_then(Value::as_str))
        .filter(|code| !code.trim().is_empty())
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

/// Overall compliance score, or "N/A" when the report lacks one.
pub fn overall_score(report: &Value) -> String {
    report
        .get("overall_compliance_score")
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string()
}

/// Human-readable Markdown summary of what the improvement pass changed.
pub fn improvement_summary(report: &Value) -> String {
    let class_name = report
        .get("test_class_name")
        .and_then(Value::as_str)
        .unwrap_or("UnknownTestClass");

    let mut out = String::from("# Improvement Summary\n\n");
    let _ = writeln!(out, "**Test Class:** {}", class_name);
    let _ = writeln!(out, "**Overall Compliance Score:** {}\n", overall_score(report));

    if let Some(practices) = report.get("practices_report").and_then(Value::as_array) {
        out.push_str("## Practice Compliance\n\n");
        for practice in practices {
            let code = practice.get("practice_code").and_then(Value::as_str).unwrap_or("?");
            let title = practice.get("practice_title").and_then(Value::as_str).unwrap_or("");
            let compliant = practice.get("compliant_methods").and_then(Value::as_i64).unwrap_or(0);
            let total = practice.get("total_methods").and_then(Value::as_i64).unwrap_or(0);
            let score = practice.get("compliance_score").and_then(Value::as_str).unwrap_or("N/A");
            let _ = writeln!(
                out,
                "- **{}** {}: {}/{} methods compliant ({})",
                code, title, compliant, total, score
            );
        }
        out.push('\n');
    }

    if let Some(methods) = report.get("test_methods").and_then(Value::as_array) {
        out.push_str("## Methods\n\n");
        for method in methods {
            let name = method
                .get("test_method_name")
                .and_then(Value::as_str)
                .unwrap_or("?");
            let score = method
                .get("method_compliance_score")
                .and_then(Value::as_str)
                .unwrap_or("N/A");
            let improved = method
                .get("practices_evaluation")
                .and_then(Value::as_array)
                .map(|evals| {
                    evals
                        .iter()
                        .filter(|e| {
                            e.get("improved_code")
                                .and_then(Value::as_str)
                                .is_some_and(|c| !c.trim().is_empty())
                        })
                        .count()
                })
                .unwrap_or(0);
            let _ = writeln!(
                out,
                "- `{}` — compliance {}, {} practice improvement(s)",
                name, score, improved
            );
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "_Generated {} by suitecheck {}_",
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"),
        env!("CARGO_PKG_VERSION")
    );
    out
}
