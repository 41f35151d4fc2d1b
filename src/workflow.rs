//! End-to-end orchestration: one test artifact through analysis and out to
//! the report writer.

use crate::analyzer::{Mode, TestAnalyzer};
use crate::config::Settings;
use crate::consistency::ConsistencyChecker;
use crate::practices::PracticeCatalog;
use crate::prompts;
use crate::report;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Paths and score produced by a single evaluation run.
#[derive(Debug)]
pub struct RunOutcome {
    pub report_path: PathBuf,
    pub improved_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub compliance_score: String,
}

pub struct Orchestrator {
    settings: Settings,
    catalog: PracticeCatalog,
    analyzer: TestAnalyzer,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> Result<Self> {
        let catalog = PracticeCatalog::load(&settings.practices_path)?;
        let analyzer = TestAnalyzer::new(settings.build_client()?);
        info!(
            practices = catalog.len(),
            model = %settings.model,
            "orchestrator initialized"
        );
        Ok(Self {
            settings,
            catalog,
            analyzer,
        })
    }

    pub fn catalog(&self) -> &PracticeCatalog {
        &self.catalog
    }

    /// Check mode: analyze and write the compliance report.
    pub async fn check(&self, test_path: &Path, out_dir: &Path) -> Result<RunOutcome> {
        let (test_code, class_name) = read_test_file(test_path)?;
        let analysis = self
            .analyzer
            .analyze(&self.settings, &self.catalog, &test_code, &class_name, Mode::Check)
            .await?;

        let report_path = report::report_path(test_path, out_dir);
        report::save_report(&analysis, &report_path)?;

        Ok(RunOutcome {
            report_path,
            improved_path: None,
            summary_path: None,
            compliance_score: report::overall_score(&analysis),
        })
    }

    /// Improve mode: analyze with rewrite instructions, then write the
    /// report, the improved test file and the Markdown summary.
    pub async fn improve(&self, test_path: &Path, out_dir: &Path) -> Result<RunOutcome> {
        let (test_code, class_name) = read_test_file(test_path)?;
        let analysis = self
            .analyzer
            .analyze(&self.settings, &self.catalog, &test_code, &class_name, Mode::Improve)
            .await?;

        let report_path = report::report_path(test_path, out_dir);
        report::save_report(&analysis, &report_path)?;

        let improved_path = report::improved_path(test_path, out_dir);
        report::save_improved_test(&analysis, &test_code, &improved_path)?;

        let summary_path = report::summary_path(test_path, out_dir);
        report::save_summary(&report::improvement_summary(&analysis), &summary_path)?;

        Ok(RunOutcome {
            report_path,
            improved_path: Some(improved_path),
            summary_path: Some(summary_path),
            compliance_score: report::overall_score(&analysis),
        })
    }

    /// Consistency mode: repeat the check `runs` times and write a report
    /// per run plus the aggregate consistency report.
    pub async fn consistency(
        &self,
        test_path: &Path,
        out_dir: &Path,
        runs: u32,
    ) -> Result<PathBuf> {
        let (test_code, class_name) = read_test_file(test_path)?;
        let stem = report::test_stem(test_path);
        let mut checker = ConsistencyChecker::new();

        for run in 1..=runs {
            info!(run, runs, "consistency run");
            let analysis = self
                .analyzer
                .analyze(&self.settings, &self.catalog, &test_code, &class_name, Mode::Check)
                .await?;
            let run_path = out_dir.join(format!("{}_bp_report_run{}.json", stem, run));
            report::save_report(&analysis, &run_path)?;
            checker.add_result(analysis);
        }

        let consistency_path = out_dir.join(format!("{}_consistency_report.md", stem));
        checker.save_report(&consistency_path)?;
        Ok(consistency_path)
    }
}

fn read_test_file(test_path: &Path) -> Result<(String, String)> {
    let test_code = fs::read_to_string(test_path)
        .with_context(|| format!("failed to read test file: {}", test_path.display()))?;
    let class_name = prompts::extract_test_class_name(&test_code);
    Ok((test_code, class_name))
}
