//! JSON report generator.

use crate::config::Config;
use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::types::{Finding, ScanResult, ScanSummary};
use serde::Serialize;

/// JSON report generator.
pub struct JsonReporter {
    /// Whether to pretty-print the output
    pretty: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter.
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self {
            pretty: config.output.pretty,
        }
    }
}

impl ReportGenerator for JsonReporter {
    fn generate(&self, result: &ScanResult) -> Result<String> {
        let report = JsonReport::from(result);

        let json = if self.pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };

        json.map_err(|e| {
            crate::err!(ReportGeneration {
                message: format!("Failed to serialize JSON report: {e}"),
            })
        })
    }
}

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Summary statistics
    pub summary: &'a ScanSummary,
    /// Findings, including ignored ones when they were kept
    pub findings: &'a [Finding],
    /// Module tree build diagnostics
    pub diagnostics: &'a [String],
}

impl<'a> From<&'a ScanResult> for JsonReport<'a> {
    fn from(result: &'a ScanResult) -> Self {
        Self {
            metadata: ReportMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: result
                    .timestamp
                    .unwrap_or_else(chrono::Utc::now)
                    .to_rfc3339(),
                files_scanned: result.files_scanned.len(),
            },
            summary: &result.summary,
            findings: &result.findings,
            diagnostics: &result.diagnostics,
        }
    }
}

/// Report metadata.
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    /// tfsieve version
    pub version: String,
    /// Scan timestamp
    pub timestamp: String,
    /// Number of files scanned
    pub files_scanned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, Severity};

    fn result() -> ScanResult {
        let mut result = ScanResult::default();
        result.findings.push(Finding {
            rule_id: "aws-ebs-encryption-customer-key".to_string(),
            severity: Severity::Low,
            message: "Resource does not use CMK".to_string(),
            description: "EBS volume encryption should use Customer Managed Keys".to_string(),
            resource: "aws_ebs_volume.v".to_string(),
            attribute: None,
            location: Location::new("main.tf", 2),
            resolution: "Enable encryption using customer managed keys".to_string(),
            links: Vec::new(),
            ignored: false,
        });
        result.summary.findings_by_severity.insert("LOW".to_string(), 1);
        result
    }

    #[test]
    fn test_json_report_shape() {
        let json = JsonReporter { pretty: false }.generate(&result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["findings"][0]["severity"], "LOW");
        assert_eq!(value["findings"][0]["location"]["line"], 2);
        assert_eq!(value["summary"]["findings_by_severity"]["LOW"], 1);
        assert_eq!(value["metadata"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_pretty_output() {
        let json = JsonReporter { pretty: true }.generate(&result()).unwrap();
        assert!(json.contains('\n'));
    }
}
