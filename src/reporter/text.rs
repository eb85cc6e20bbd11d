//! Plain text report generator.

use crate::config::Config;
use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::types::{Finding, ScanResult, Severity};
use colored::Colorize;
use std::fmt::Write;

/// Text report generator for CLI output.
pub struct TextReporter {
    /// Whether to use colors
    use_colors: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self {
            use_colors: config.output.colored,
        }
    }
}

impl ReportGenerator for TextReporter {
    fn generate(&self, result: &ScanResult) -> Result<String> {
        let mut output = String::new();

        output.push_str(&self.format_header());

        if !result.findings.is_empty() {
            output.push_str(&self.format_findings(result));
        }

        if !result.diagnostics.is_empty() {
            output.push_str(&self.format_diagnostics(result));
        }

        output.push_str(&self.format_summary(result));
        Ok(output)
    }
}

impl TextReporter {
    fn format_header(&self) -> String {
        let title = "tfsieve";
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));

        if self.use_colors {
            format!(
                "\n{} {}\n{}\n",
                title.bright_white().bold(),
                version.dimmed(),
                "=".repeat(80).bright_blue(),
            )
        } else {
            format!("\n{title} {version}\n{}\n", "=".repeat(80))
        }
    }

    fn section(&self, title: &str) -> String {
        let title = if self.use_colors {
            title.bright_cyan().bold().to_string()
        } else {
            title.to_string()
        };
        format!("\n{title}\n{}\n", "-".repeat(80))
    }

    fn format_findings(&self, result: &ScanResult) -> String {
        let mut output = self.section("Findings");

        // most severe first, location order within a severity
        let mut findings: Vec<&Finding> = result.findings.iter().collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));

        for finding in findings {
            output.push_str(&self.format_finding(finding));
        }
        output
    }

    fn format_finding(&self, finding: &Finding) -> String {
        let label = finding.severity.to_string();
        let severity = if self.use_colors {
            match finding.severity {
                Severity::Critical => label.red().bold().to_string(),
                Severity::High => label.red().to_string(),
                Severity::Medium => label.yellow().to_string(),
                Severity::Low => label.blue().to_string(),
            }
        } else {
            label
        };

        let target = match &finding.attribute {
            Some(attr) => format!("{}.{attr}", finding.resource),
            None => finding.resource.clone(),
        };
        let ignored = if finding.ignored { " (ignored)" } else { "" };

        let mut output = format!("\n  [{severity}] {} ({}){ignored}\n", finding.message, finding.rule_id);

        let detail = format!("    -> {target} at {}", finding.location);
        let _ = writeln!(output, "{}", self.dim(&detail));

        if !finding.description.is_empty() {
            let _ = writeln!(output, "{}", self.dim(&format!("    {}", finding.description)));
        }

        if !finding.resolution.is_empty() {
            let line = format!("    Resolution: {}", finding.resolution);
            if self.use_colors {
                let _ = writeln!(output, "{}", line.green());
            } else {
                let _ = writeln!(output, "{line}");
            }
        }

        for link in &finding.links {
            let _ = writeln!(output, "{}", self.dim(&format!("    {link}")));
        }
        output
    }

    fn format_diagnostics(&self, result: &ScanResult) -> String {
        let mut output = self.section("Diagnostics");
        for diagnostic in &result.diagnostics {
            let line = format!("  ! {diagnostic}");
            if self.use_colors {
                let _ = writeln!(output, "{}", line.yellow());
            } else {
                let _ = writeln!(output, "{line}");
            }
        }
        output
    }

    fn format_summary(&self, result: &ScanResult) -> String {
        let mut output = self.section("Summary");
        let summary = &result.summary;

        let counts: Vec<String> = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
            .iter()
            .map(|severity| {
                let label = severity.to_string();
                let count = summary.findings_by_severity.get(&label).copied().unwrap_or(0);
                if self.use_colors && count > 0 {
                    format!("{} {label}", count.to_string().bold())
                } else {
                    format!("{count} {label}")
                }
            })
            .collect();
        let _ = writeln!(output, "  {}", counts.join(" | "));

        let _ = writeln!(
            output,
            "  {} files | {} modules | {} blocks | {} checks | {} ignored",
            result.files_scanned.len(),
            summary.modules,
            summary.blocks,
            summary.checks,
            summary.ignored
        );

        if summary.failed_checks > 0 {
            let line = format!("  {} checks failed and were skipped", summary.failed_checks);
            if self.use_colors {
                let _ = writeln!(output, "{}", line.red());
            } else {
                let _ = writeln!(output, "{line}");
            }
        }

        if result.active_findings().next().is_none() {
            let line = "  No problems detected";
            if self.use_colors {
                let _ = writeln!(output, "{}", line.green());
            } else {
                let _ = writeln!(output, "{line}");
            }
        }
        output
    }

    fn dim(&self, text: &str) -> String {
        if self.use_colors {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;

    fn finding(severity: Severity, line: usize, ignored: bool) -> Finding {
        Finding {
            rule_id: "aws-ebs-encryption-customer-key".to_string(),
            severity,
            message: "Resource explicitly uses the default CMK".to_string(),
            description: String::new(),
            resource: "data.aws_kms_key.ebs".to_string(),
            attribute: Some("key_id".to_string()),
            location: Location::new("main.tf", line),
            resolution: "Enable encryption using customer managed keys".to_string(),
            links: Vec::new(),
            ignored,
        }
    }

    #[test]
    fn test_plain_text_report() {
        let mut result = ScanResult::default();
        result.findings = vec![finding(Severity::Low, 3, false), finding(Severity::High, 9, true)];
        result.summary.findings_by_severity.insert("LOW".to_string(), 1);
        result.summary.ignored = 1;

        let text = TextReporter { use_colors: false }.generate(&result).unwrap();

        assert!(text.contains("[LOW] Resource explicitly uses the default CMK (aws-ebs-encryption-customer-key)"));
        assert!(text.contains("-> data.aws_kms_key.ebs.key_id at main.tf:3"));
        assert!(text.contains("(ignored)"));
        assert!(text.contains("0 CRITICAL | 0 HIGH | 0 MEDIUM | 1 LOW"));
        assert!(!text.contains("No problems detected"));
        assert!(text.find("[HIGH]").unwrap() < text.find("[LOW]").unwrap());
    }

    #[test]
    fn test_clean_report() {
        let text = TextReporter { use_colors: false }
            .generate(&ScanResult::default())
            .unwrap();
        assert!(text.contains("No problems detected"));
        assert!(!text.contains("Findings"));
    }
}
