//! Report configuration.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Where and how reports are written.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ReportConfig {
    /// Directory receiving the inventory and issue reports.
    #[builder(default = "PathBuf::from(\"output\")")]
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Largest account count whose status lines are printed inline.
    #[builder(default = "10")]
    #[serde(default = "default_inline_issue_threshold")]
    pub inline_issue_threshold: usize,

    /// File name stem of the inventory files.
    #[builder(default = "\"inventory\".to_string()")]
    #[serde(default = "default_file_stem")]
    pub file_stem: String,

    /// Indent JSON output.
    #[builder(default = "true")]
    #[serde(default = "default_pretty")]
    pub pretty_json: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_inline_issue_threshold() -> usize {
    10
}

fn default_file_stem() -> String {
    "inventory".to_string()
}

fn default_pretty() -> bool {
    true
}

impl ReportConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref stem) = self.file_stem {
            validate_stem(stem)?;
        }
        Ok(())
    }
}

fn validate_stem(stem: &str) -> Result<(), String> {
    if stem.trim().is_empty() {
        return Err("File stem cannot be empty".to_string());
    }
    if stem.contains(['/', '\\']) {
        return Err(format!("File stem '{stem}' must not contain path separators"));
    }
    Ok(())
}

impl ReportConfig {
    /// Create a new config builder.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Check values that bypassed the builder.
    pub fn validate(&self) -> Result<(), String> {
        validate_stem(&self.file_stem)
    }

    pub fn json_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.json", self.file_stem))
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.file_stem))
    }

    pub fn issues_path(&self) -> PathBuf {
        self.output_dir.join("scan_issues.json")
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            inline_issue_threshold: default_inline_issue_threshold(),
            file_stem: default_file_stem(),
            pretty_json: default_pretty(),
        }
    }
}
