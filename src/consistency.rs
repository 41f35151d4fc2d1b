//! Consistency checking across repeated evaluation runs.
//!
//! The LLM is a stochastic judge; running the same check several times and
//! comparing compliance scores quantifies how stable its verdicts are.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ConsistencyLevel {
    /// Classify by coefficient of variation (percent).
    fn from_cv(cv: f64) -> Self {
        if cv < 5.0 {
            ConsistencyLevel::Excellent
        } else if cv < 10.0 {
            ConsistencyLevel::Good
        } else if cv < 20.0 {
            ConsistencyLevel::Fair
        } else {
            ConsistencyLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Excellent => "Excellent",
            ConsistencyLevel::Good => "Good",
            ConsistencyLevel::Fair => "Fair",
            ConsistencyLevel::Poor => "Poor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsistencyMetrics {
    pub num_runs: usize,
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub coefficient_of_variation: f64,
    pub level: ConsistencyLevel,
}

/// Accumulates per-run reports and derives stability statistics from their
/// overall compliance scores.
#[derive(Debug, Default)]
pub struct ConsistencyChecker {
    results: Vec<Value>,
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: Value) {
        self.results.push(result);
    }

    pub fn run_count(&self) -> usize {
        self.results.len()
    }

    pub fn metrics(&self) -> Result<ConsistencyMetrics> {
        if self.results.len() < 2 {
            bail!(
                "need at least 2 results to calculate consistency, got {}",
                self.results.len()
            );
        }

        let scores: Vec<f64> = self.results.iter().map(parse_score).collect();
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let std_dev = sample_std_dev(&scores, mean);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let cv = if mean > 0.0 { std_dev / mean * 100.0 } else { 0.0 };

        Ok(ConsistencyMetrics {
            num_runs: scores.len(),
            mean,
            std_dev,
            min,
            max,
            range: max - min,
            coefficient_of_variation: cv,
            level: ConsistencyLevel::from_cv(cv),
            scores,
        })
    }

    /// Render the Markdown consistency report.
    pub fn report(&self) -> Result<String> {
        let metrics = self.metrics()?;

        let mut out = String::from("# Consistency Report\n\n");
        let _ = writeln!(out, "**Number of Runs:** {}\n", metrics.num_runs);

        out.push_str("## Compliance Scores\n\n");
        for (i, score) in metrics.scores.iter().enumerate() {
            let _ = writeln!(out, "- Run {}: {}%", i + 1, score);
        }

        out.push_str("\n## Statistical Analysis\n\n");
        let _ = writeln!(out, "- **Mean Score:** {:.2}%", metrics.mean);
        let _ = writeln!(out, "- **Standard Deviation:** {:.2}%", metrics.std_dev);
        let _ = writeln!(out, "- **Min Score:** {}%", metrics.min);
        let _ = writeln!(out, "- **Max Score:** {}%", metrics.max);
        let _ = writeln!(out, "- **Variance (Range):** {:.2}%", metrics.range);
        let _ = writeln!(
            out,
            "- **Coefficient of Variation:** {:.2}%",
            metrics.coefficient_of_variation
        );

        out.push_str("\n## Consistency Assessment\n\n");
        let _ = writeln!(out, "**Level:** {}\n", metrics.level.as_str());

        out.push_str("### Interpretation\n\n");
        out.push_str(match metrics.level {
            ConsistencyLevel::Excellent => {
                "The results are highly consistent across runs (CV < 5%). \
                 The model is producing very stable evaluations.\n"
            }
            ConsistencyLevel::Good => {
                "The results show good consistency (CV < 10%). \
                 Minor variations are present but acceptable.\n"
            }
            ConsistencyLevel::Fair => {
                "The results show moderate inconsistency (CV < 20%). \
                 Consider lowering the temperature or setting a seed.\n"
            }
            ConsistencyLevel::Poor => {
                "The results show significant inconsistency (CV >= 20%). \
                 Recommendations:\n\
                 - Set `SUITECHECK_TEMPERATURE=0.0` for maximum determinism\n\
                 - Set `SUITECHECK_SEED` to any integer for reproducible sampling\n\
                 - Switch to a model with more stable JSON output\n"
            }
        });

        Ok(out)
    }

    pub fn save_report(&self, path: &Path) -> Result<()> {
        let report = self.report()?;
        fs::write(path, report)
            .with_context(|| format!("failed to write consistency report: {}", path.display()))?;
        info!(path = %path.display(), "consistency report saved");
        Ok(())
    }
}

/// Read consistency metrics from previously written report files.
pub fn analyze_report_files(paths: &[&Path]) -> Result<ConsistencyMetrics> {
    let mut checker = ConsistencyChecker::new();
    for path in paths {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read report: {}", path.display()))?;
        let result: Value = serde_json::from_str(&content)
            .with_context(|| format!("invalid report JSON: {}", path.display()))?;
        checker.add_result(result);
    }
    checker.metrics()
}

/// Compliance score as a number: `"42%"` → 42.0; missing or malformed → 0.
fn parse_score(result: &Value) -> f64 {
    result
        .get("overall_compliance_score")
        .and_then(Value::as_str)
        .and_then(|s| s.trim().trim_end_matches('%').parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn sample_std_dev(scores: &[f64], mean: f64) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let variance = scores
        .iter()
        .map(|s| (s - mean).powi(2))
        .sum::<f64>()
        / (scores.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with_score(score: &str) -> Value {
        json!({"overall_compliance_score": score})
    }

    #[test]
    fn test_requires_two_runs() {
        let mut checker = ConsistencyChecker::new();
        checker.add_result(result_with_score("80%"));
        assert!(checker.metrics().is_err());
    }

    #[test]
    fn test_identical_scores_are_excellent() {
        let mut checker = ConsistencyChecker::new();
        checker.add_result(result_with_score("80%"));
        checker.add_result(result_with_score("80%"));
        checker.add_result(result_with_score("80%"));
        let metrics = checker.metrics().unwrap();
        assert_eq!(metrics.mean, 80.0);
        assert_eq!(metrics.std_dev, 0.0);
        assert_eq!(metrics.level, ConsistencyLevel::Excellent);
    }

    #[test]
    fn test_spread_scores_classified_poor() {
        let mut checker = ConsistencyChecker::new();
        checker.add_result(result_with_score("20%"));
        checker.add_result(result_with_score("80%"));
        let metrics = checker.metrics().unwrap();
        assert_eq!(metrics.range, 60.0);
        assert_eq!(metrics.level, ConsistencyLevel::Poor);
    }

    #[test]
    fn test_sample_std_dev_matches_known_value() {
        // stdev([2, 4, 4, 4, 5, 5, 7, 9]) with n-1 denominator ≈ 2.138
        let scores = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let sd = sample_std_dev(&scores, mean);
        assert!((sd - 2.138).abs() < 0.01);
    }

    #[test]
    fn test_missing_score_counts_as_zero() {
        let mut checker = ConsistencyChecker::new();
        checker.add_result(json!({}));
        checker.add_result(result_with_score("50%"));
        let metrics = checker.metrics().unwrap();
        assert_eq!(metrics.min, 0.0);
        assert_eq!(metrics.max, 50.0);
    }

    #[test]
    fn test_report_contains_statistics() {
        let mut checker = ConsistencyChecker::new();
        checker.add_result(result_with_score("70%"));
        checker.add_result(result_with_score("90%"));
        let report = checker.report().unwrap();
        assert!(report.contains("# Consistency Report"));
        assert!(report.contains("**Number of Runs:** 2"));
        assert!(report.contains("**Mean Score:** 80.00%"));
        assert!(report.contains("Run 1: 70%"));
    }
}
