//! Best-practice catalog: loading and prompt text generation.
//!
//! The catalog is caller-owned data; nothing here judges the practices
//! themselves. A starter catalog ships in `data/best_practices.json`.

use crate::analyzer::Mode;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const CATEGORY_COMMON_SENSE: &str = "Common Sense";
pub const CATEGORY_LITERATURE: &str = "Literature Supported";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EvaluationCriteria {
    #[serde(default)]
    pub positive: Option<String>,
    #[serde(default)]
    pub negative: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BestPractice {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub title_en: String,
    pub category: String,
    pub principle: String,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub evaluation_criteria: Option<EvaluationCriteria>,
    #[serde(default)]
    pub examples: Option<serde_json::Value>,
}

impl BestPractice {
    /// Compact one-liner used in check-mode prompts.
    pub fn compact_description(&self) -> String {
        format!("{}: {}\n- {}", self.code, self.title, self.principle)
    }

    /// Full description with rationale and criteria, used in improve mode.
    pub fn full_description(&self) -> String {
        let mut out = format!("{}: {}\nPrinciple: {}\n", self.code, self.title, self.principle);

        if !self.rationale.is_empty() {
            out.push_str("Why?\n");
            for reason in &self.rationale {
                let _ = writeln!(out, "- {}", reason);
            }
        }

        if let Some(criteria) = &self.evaluation_criteria {
            out.push_str("\nEvaluation Criteria:\n");
            if let Some(positive) = &criteria.positive {
                let _ = writeln!(out, "✔️ Compliant: {}", positive);
            }
            if let Some(negative) = &criteria.negative {
                let _ = writeln!(out, "❌ Non-Compliant: {}", negative);
            }
        }

        out
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    author: String,
    practices: Vec<BestPractice>,
}

#[derive(Debug, Clone)]
pub struct PracticeCatalog {
    pub version: String,
    pub source: String,
    pub author: String,
    practices: Vec<BestPractice>,
}

impl PracticeCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read practice catalog: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("invalid practice catalog: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        if file.practices.is_empty() {
            bail!("practice catalog contains no practices");
        }
        Ok(Self {
            version: file.version,
            source: file.source,
            author: file.author,
            practices: file.practices,
        })
    }

    pub fn practices(&self) -> &[BestPractice] {
        &self.practices
    }

    pub fn len(&self) -> usize {
        self.practices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.practices.is_empty()
    }

    pub fn by_code(&self, code: &str) -> Option<&BestPractice> {
        self.practices.iter().find(|p| p.code == code)
    }

    pub fn by_category(&self, category: &str) -> Vec<&BestPractice> {
        self.practices
            .iter()
            .filter(|p| p.category == category)
            .collect()
    }

    /// Prompt section listing every practice: compact descriptions for check
    /// mode, full descriptions for improve mode.
    pub fn prompt_section(&self, mode: Mode) -> String {
        let mut out = format!("📌 **Definition of the {} Best Practices**\n\n", self.len());

        for (category, header) in [
            (CATEGORY_COMMON_SENSE, "### **Common Sense Practices**\n\n"),
            (CATEGORY_LITERATURE, "### **Literature Supported Practices**\n\n"),
        ] {
            let practices = self.by_category(category);
            if practices.is_empty() {
                continue;
            }
            out.push_str(header);
            for practice in practices {
                match mode {
                    Mode::Check => {
                        out.push_str(&practice.compact_description());
                        out.push_str("\n\n");
                    }
                    Mode::Improve => {
                        out.push_str(&practice.full_description());
                        out.push_str("\n---\n\n");
                    }
                }
            }
        }

        out
    }
}
