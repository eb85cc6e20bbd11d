//! Core data types shared by the scanner surface.
//!
//! This module defines:
//! - Source locations attached to every parsed block and attribute
//! - Severity levels and findings produced by rules
//! - The aggregated scan result and report formats

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Location in a file.
///
/// Line numbers are 1-based. `0` means the parser could not locate the
/// item in the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// File path
    pub file: PathBuf,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, optional)
    pub column: Option<usize>,
    /// Module path the located item belongs to (`None` for the root module)
    pub module: Option<String>,
}

impl Location {
    /// Create a location in the root module.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column: None,
            module: None,
        }
    }

    /// Returns a copy of this location tagged with a module path.
    #[must_use]
    pub fn in_module(&self, module: Option<&str>) -> Self {
        Self {
            module: module.map(String::from),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)?;
        if let Some(col) = self.column {
            write!(f, ":{col}")?;
        }
        if let Some(module) = &self.module {
            write!(f, " ({module})")?;
        }
        Ok(())
    }
}

/// Severity level for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Low impact
    Low,
    /// Medium impact
    Medium,
    /// High impact
    High,
    /// Critical - severe issue requiring immediate attention
    Critical,
}

impl Severity {
    /// Parse a severity name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Some(Self::Low),
            "medium" | "warning" => Some(Self::Medium),
            "high" | "error" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ReportFormat {
    /// JSON format
    Json,
    /// Plain text format
    #[default]
    Text,
}

/// A single finding produced by a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the rule that produced the finding
    pub rule_id: String,

    /// Severity level (after overrides)
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Rule summary
    pub description: String,

    /// Address of the block the finding is anchored on
    pub resource: String,

    /// Name of the attribute the finding is anchored on, if any
    pub attribute: Option<String>,

    /// File location
    pub location: Location,

    /// Suggested fix
    pub resolution: String,

    /// Reference links
    #[serde(default)]
    pub links: Vec<String>,

    /// Whether an inline ignore comment matched this finding
    #[serde(default)]
    pub ignored: bool,
}

/// Summary statistics of a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Number of module instances in the tree
    pub modules: usize,
    /// Number of top-level blocks visited
    pub blocks: usize,
    /// Number of rule evaluations performed
    pub checks: usize,
    /// Number of findings suppressed by ignore comments
    pub ignored: usize,
    /// Number of rules that panicked and were skipped
    pub failed_checks: usize,
    /// Counts by severity
    pub findings_by_severity: BTreeMap<String, usize>,
}

/// Result of running the rule registry over a module tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Findings, sorted by location
    pub findings: Vec<Finding>,

    /// Summary statistics
    pub summary: ScanSummary,

    /// Problems found while building the module tree (cycles, unloadable sources)
    #[serde(default)]
    pub diagnostics: Vec<String>,

    /// Files that contributed blocks to the tree
    #[serde(default)]
    pub files_scanned: Vec<PathBuf>,

    /// Timestamp of the scan
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScanResult {
    /// Findings that were not suppressed.
    pub fn active_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.ignored)
    }

    /// Check if there are any unsuppressed findings at or above `severity`.
    #[must_use]
    pub fn has_findings_at_least(&self, severity: Severity) -> bool {
        self.active_findings().any(|f| f.severity >= severity)
    }

    /// Get unsuppressed findings filtered by rule id.
    #[must_use]
    pub fn findings_for_rule(&self, rule_id: &str) -> Vec<&Finding> {
        self.active_findings().filter(|f| f.rule_id == rule_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_parse_accepts_aliases() {
        assert_eq!(Severity::parse("LOW"), Some(Severity::Low));
        assert_eq!(Severity::parse("warning"), Some(Severity::Medium));
        assert_eq!(Severity::parse(" error "), Some(Severity::High));
        assert_eq!(Severity::parse("nope"), None);
    }

    #[test]
    fn test_location_display() {
        let loc = Location::new("main.tf", 12).in_module(Some("module.network"));
        assert_eq!(loc.to_string(), "main.tf:12 (module.network)");
    }

    #[test]
    fn test_has_findings_ignores_suppressed() {
        let finding = Finding {
            rule_id: "r".to_string(),
            severity: Severity::High,
            message: "m".to_string(),
            description: String::new(),
            resource: "aws_s3_bucket.b".to_string(),
            attribute: None,
            location: Location::new("main.tf", 1),
            resolution: String::new(),
            links: Vec::new(),
            ignored: true,
        };
        let result = ScanResult {
            findings: vec![finding],
            ..ScanResult::default()
        };
        assert!(!result.has_findings_at_least(Severity::Low));
        assert!(result.findings_for_rule("r").is_empty());
    }
}
