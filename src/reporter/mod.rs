//! Report generation module.
//!
//! Two renderings of a [`ScanResult`]:
//! - JSON: machine-readable structured output
//! - Text: human-readable CLI output
//!
//! # Example
//!
//! ```rust
//! use tfsieve::reporter::Reporter;
//! use tfsieve::{Config, ReportFormat, ScanResult};
//!
//! let reporter = Reporter::new(&Config::default());
//! let json = reporter.generate(&ScanResult::default(), ReportFormat::Json).unwrap();
//! assert!(json.contains("\"findings\""));
//! ```

mod json;
mod text;

use crate::config::Config;
use crate::error::Result;
use crate::types::{ReportFormat, ScanResult};

pub use json::JsonReporter;
pub use text::TextReporter;

/// Report generator that supports multiple output formats.
pub struct Reporter {
    config: Config,
}

impl Reporter {
    /// Create a new reporter with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Generate a report in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if report generation fails.
    pub fn generate(&self, result: &ScanResult, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => JsonReporter::new(&self.config).generate(result),
            ReportFormat::Text => TextReporter::new(&self.config).generate(result),
        }
    }
}

/// Trait for report generators.
pub trait ReportGenerator {
    /// Generate a report from scan results.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    fn generate(&self, result: &ScanResult) -> Result<String>;
}
