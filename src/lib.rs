//! # tfsieve
//!
//! A static security scanner for Terraform/OpenTofu configurations.
//!
//! tfsieve parses HCL files into a model of modules and blocks, expands
//! `count`, `for_each`, `dynamic` blocks and local module calls, and runs
//! a registry of rules against every block. Rules query the model through
//! two operations:
//!
//! - **Evaluation**: reduce an attribute to a [`Value`], or
//!   [`Value::Unresolved`] when it cannot be known statically
//! - **Resolution**: find the block(s) an attribute refers to, across
//!   files, variables, locals and modules
//!
//! Neither operation can abort a scan: undecidable values are
//! `Unresolved`, and resolution failures are typed
//! [`error::ResolutionError`]s the rule turns into "skip".
//!
//! ## Example
//!
//! ```rust,no_run
//! use tfsieve::{Config, Scanner};
//! use tfsieve::rules::RuleRegistry;
//!
//! fn main() -> anyhow::Result<()> {
//!     let scanner = Scanner::new(Config::default(), RuleRegistry::with_builtin_rules());
//!     let result = scanner.scan_path("./terraform", &[])?;
//!
//!     for finding in result.active_findings() {
//!         println!("{} {} {}", finding.severity, finding.rule_id, finding.location);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod model;
pub mod parser;
pub mod reporter;
pub mod rules;
pub mod types;
pub mod value;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{ResolutionError, Result, TfSieveError};
pub use model::{ModuleTree, ModuleTreeBuilder};
pub use types::{Finding, Location, ReportFormat, ScanResult, ScanSummary, Severity};
pub use value::Value;

use error::ResultExt;
use model::{Block, Module};
use rayon::prelude::*;
use rules::{ModuleScope, Rule, RuleRegistry};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// Variable files Terraform loads automatically from the root module.
const AUTO_TFVARS: &str = "terraform.tfvars";
const AUTO_TFVARS_SUFFIX: &str = ".auto.tfvars";

/// Main scanner orchestrator.
///
/// The `Scanner` is the primary entry point for using tfsieve as a library.
/// It owns the configuration and the rule registry, builds module trees and
/// runs the rules over them.
///
/// # Example
///
/// ```rust
/// use tfsieve::{Config, Scanner};
/// use tfsieve::parser::{HclParser, Parser};
/// use tfsieve::rules::RuleRegistry;
/// use std::path::Path;
///
/// let config = Config::default();
/// let file = HclParser::new(&config)
///     .parse_content("resource \"aws_ebs_volume\" \"v\" {}\n", Path::new("main.tf"))
///     .unwrap();
/// let tree = tfsieve::ModuleTreeBuilder::new(&config).build(vec![file], None);
///
/// let scanner = Scanner::new(config, RuleRegistry::with_builtin_rules());
/// let result = scanner.scan(&tree);
/// assert_eq!(result.findings.len(), 1);
/// ```
pub struct Scanner {
    config: Config,
    registry: RuleRegistry,
}

#[derive(Default)]
struct CheckOutcome {
    findings: Vec<Finding>,
    checks: usize,
    failed: usize,
}

impl CheckOutcome {
    fn merge(mut self, other: Self) -> Self {
        self.findings.extend(other.findings);
        self.checks += other.checks;
        self.failed += other.failed;
        self
    }
}

impl Scanner {
    /// Create a new scanner.
    #[must_use]
    pub const fn new(config: Config, registry: RuleRegistry) -> Self {
        Self { config, registry }
    }

    /// The scanner configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The rules this scanner runs.
    #[must_use]
    pub const fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Parse a directory and build its module tree.
    ///
    /// Root inputs come from `terraform.tfvars`, `*.auto.tfvars` and then
    /// `tfvars_files` in order, later files overriding earlier ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a variables file cannot be read
    /// or parsed.
    pub fn load_tree<P: AsRef<Path>>(&self, path: P, tfvars_files: &[PathBuf]) -> Result<ModuleTree> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading configuration");

        if !path.is_dir() {
            return Err(crate::err!(DirectoryNotFound {
                path: path.to_path_buf(),
            }));
        }

        let mut var_files = auto_tfvars(path)?;
        var_files.extend(tfvars_files.iter().cloned());

        let mut inputs = BTreeMap::new();
        for file in &var_files {
            tracing::debug!(file = %file.display(), "Reading variables file");
            let content = std::fs::read_to_string(file).with_path(file)?;
            inputs.extend(parser::parse_tfvars(&content, file)?);
        }

        ModuleTreeBuilder::new(&self.config)
            .with_inputs(inputs)
            .build_directory(path)
    }

    /// Load and scan a directory.
    ///
    /// # Errors
    ///
    /// See [`Scanner::load_tree`].
    pub fn scan_path<P: AsRef<Path>>(&self, path: P, tfvars_files: &[PathBuf]) -> Result<ScanResult> {
        let tree = self.load_tree(path, tfvars_files)?;
        Ok(self.scan(&tree))
    }

    /// Run every enabled rule over every block of the tree.
    ///
    /// Blocks are checked in parallel. A rule that panics is logged and
    /// counted in `failed_checks`; it never aborts the scan.
    #[must_use]
    pub fn scan(&self, tree: &ModuleTree) -> ScanResult {
        let rules: Vec<&dyn Rule> = self
            .registry
            .rules()
            .iter()
            .map(|r| &**r)
            .filter(|r| {
                let enabled = !self.config.rules.is_disabled(r.descriptor().id);
                if !enabled {
                    tracing::debug!(rule = r.descriptor().id, "Rule disabled by configuration");
                }
                enabled
            })
            .collect();

        let blocks: Vec<(&Module, &Block)> = tree.all_blocks().collect();
        tracing::info!(rules = rules.len(), blocks = blocks.len(), "Running rules");

        let outcome = blocks
            .par_iter()
            .map(|(module, block)| self.check_block(tree, module, block, &rules))
            .reduce(CheckOutcome::default, CheckOutcome::merge);

        let mut findings = outcome.findings;
        sort_and_dedup(&mut findings);

        let ignored = findings.iter().filter(|f| f.ignored).count();
        if !self.config.scan.include_ignored {
            findings.retain(|f| !f.ignored);
        }

        let mut findings_by_severity = BTreeMap::new();
        for finding in findings.iter().filter(|f| !f.ignored) {
            *findings_by_severity.entry(finding.severity.to_string()).or_insert(0) += 1;
        }

        tracing::info!(
            findings = findings.len(),
            ignored = ignored,
            failed_checks = outcome.failed,
            "Scan complete"
        );

        ScanResult {
            findings,
            summary: ScanSummary {
                modules: tree.modules().len(),
                blocks: blocks.len(),
                checks: outcome.checks,
                ignored,
                failed_checks: outcome.failed,
                findings_by_severity,
            },
            diagnostics: tree.diagnostics().to_vec(),
            files_scanned: tree.files().to_vec(),
            timestamp: Some(chrono::Utc::now()),
        }
    }

    fn check_block(&self, tree: &ModuleTree, module: &Module, block: &Block, rules: &[&dyn Rule]) -> CheckOutcome {
        let scope = ModuleScope::new(tree, module);
        let mut outcome = CheckOutcome::default();

        for rule in rules {
            let descriptor = rule.descriptor();
            if !descriptor.applies_to(block) {
                continue;
            }
            outcome.checks += 1;

            let results = match catch_unwind(AssertUnwindSafe(|| rule.check(block, &scope))) {
                Ok(results) => results,
                Err(_) => {
                    tracing::warn!(
                        rule = descriptor.id,
                        resource = %block.qualified_address(),
                        "Rule panicked, skipping"
                    );
                    outcome.failed += 1;
                    continue;
                }
            };

            let severity = self
                .config
                .rules
                .severity_for(descriptor.id)
                .unwrap_or(descriptor.severity);

            for result in results {
                let ignored = is_ignored(tree, descriptor.id, &result.anchor.location, block);
                outcome.findings.push(Finding {
                    rule_id: descriptor.id.to_string(),
                    severity,
                    message: result.message,
                    description: descriptor.summary.to_string(),
                    resource: result.anchor.resource,
                    attribute: result.anchor.attribute,
                    location: result.anchor.location,
                    resolution: descriptor.resolution.to_string(),
                    links: descriptor.links.iter().map(ToString::to_string).collect(),
                    ignored,
                });
            }
        }
        outcome
    }
}

/// True if a `tfsieve:ignore:<rule>` comment sits on, or directly above,
/// the anchor line or the checked block's header.
fn is_ignored(tree: &ModuleTree, rule_id: &str, anchor: &Location, block: &Block) -> bool {
    let matches = |location: &Location| {
        tree.ignores_for(&location.file).iter().any(|d| {
            (d.rule_id == rule_id || d.rule_id == "*")
                && location.line > 0
                && (d.line == location.line || d.line + 1 == location.line)
        })
    };
    matches(anchor) || matches(block.location())
}

/// Order findings by location and report identical ones once.
///
/// Instances sharing a referenced block produce the same finding.
fn sort_and_dedup(findings: &mut Vec<Finding>) {
    findings.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.resource.cmp(&b.resource))
            .then_with(|| a.attribute.cmp(&b.attribute))
            .then_with(|| a.message.cmp(&b.message))
            .then_with(|| a.ignored.cmp(&b.ignored))
    });
    findings.dedup_by(|a, b| {
        a.location == b.location
            && a.rule_id == b.rule_id
            && a.resource == b.resource
            && a.attribute == b.attribute
            && a.message == b.message
            && a.ignored == b.ignored
    });
}

fn auto_tfvars(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let default = directory.join(AUTO_TFVARS);
    if default.is_file() {
        files.push(default);
    }

    let mut auto: Vec<PathBuf> = std::fs::read_dir(directory)
        .with_path(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(AUTO_TFVARS_SUFFIX))
        })
        .collect();
    auto.sort();
    files.extend(auto);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{HclParser, Parser};
    use crate::rules::{Results, RuleDescriptor};
    use pretty_assertions::assert_eq;

    fn tree(content: &str) -> ModuleTree {
        let file = HclParser::new(&Config::default())
            .parse_content(content, Path::new("main.tf"))
            .unwrap();
        ModuleTreeBuilder::new(&Config::default()).build(vec![file], None)
    }

    static PANICKY: RuleDescriptor = RuleDescriptor {
        id: "test-panics",
        provider: "test",
        service: "test",
        summary: "panics",
        impact: "",
        resolution: "",
        severity: Severity::High,
        required_types: &["resource"],
        required_labels: &[],
        links: &[],
        good_examples: &[],
        bad_examples: &[],
    };

    struct Panics;

    impl Rule for Panics {
        fn descriptor(&self) -> &RuleDescriptor {
            &PANICKY
        }

        fn check(&self, _block: &Block, _scope: &ModuleScope<'_>) -> Results {
            panic!("rule bug");
        }
    }

    #[test]
    fn test_scan_finds_missing_cmk() {
        let tree = tree("resource \"aws_ebs_volume\" \"v\" {}\n");
        let scanner = Scanner::new(Config::default(), RuleRegistry::with_builtin_rules());
        let result = scanner.scan(&tree);

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].rule_id, "aws-ebs-encryption-customer-key");
        assert_eq!(result.findings[0].severity, Severity::Low);
        assert_eq!(result.summary.checks, 1);
        assert_eq!(result.summary.findings_by_severity.get("LOW"), Some(&1));
    }

    #[test]
    fn test_panicking_rule_is_isolated() {
        let tree = tree("resource \"aws_ebs_volume\" \"v\" {}\nresource \"aws_s3_bucket\" \"b\" {}\n");
        let mut registry = RuleRegistry::with_builtin_rules();
        registry.register(Box::new(Panics));
        let result = Scanner::new(Config::default(), registry).scan(&tree);

        assert_eq!(result.summary.failed_checks, 2);
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn test_disabled_rules_and_overrides() {
        let tree = tree("resource \"aws_ebs_volume\" \"v\" {}\n");

        let mut config = Config::default();
        config.rules.disabled.push("aws-ebs-encryption-customer-key".to_string());
        let result = Scanner::new(config, RuleRegistry::with_builtin_rules()).scan(&tree);
        assert!(result.findings.is_empty());
        assert_eq!(result.summary.checks, 0);

        let mut config = Config::default();
        config
            .rules
            .severity_overrides
            .insert("aws-ebs-encryption-customer-key".to_string(), "high".to_string());
        let result = Scanner::new(config, RuleRegistry::with_builtin_rules()).scan(&tree);
        assert_eq!(result.findings[0].severity, Severity::High);
        assert!(result.has_findings_at_least(Severity::High));
    }

    #[test]
    fn test_inline_ignores() {
        let content = r#"
# tfsieve:ignore:aws-ebs-encryption-customer-key
resource "aws_ebs_volume" "ignored" {}

resource "aws_ebs_volume" "flagged" {} # tfsieve:ignore:some-other-rule

resource "aws_ebs_volume" "all" {} # tfsieve:ignore:*
"#;
        let tree = tree(content);
        let result = Scanner::new(Config::default(), RuleRegistry::with_builtin_rules()).scan(&tree);
        let resources: Vec<&str> = result.findings.iter().map(|f| f.resource.as_str()).collect();
        assert_eq!(resources, vec!["aws_ebs_volume.flagged"]);
        assert_eq!(result.summary.ignored, 2);

        let mut config = Config::default();
        config.scan.include_ignored = true;
        let result = Scanner::new(config, RuleRegistry::with_builtin_rules()).scan(&tree);
        assert_eq!(result.findings.len(), 3);
        assert_eq!(result.active_findings().count(), 1);
    }

    #[test]
    fn test_duplicate_findings_collapse_by_ignore_state() {
        let finding = |ignored: bool| Finding {
            rule_id: "aws-ebs-encryption-customer-key".to_string(),
            severity: Severity::Low,
            message: "Resource explicitly uses the default CMK".to_string(),
            description: String::new(),
            resource: "data.aws_kms_key.default".to_string(),
            attribute: Some("key_id".to_string()),
            location: Location::new("main.tf", 2),
            resolution: String::new(),
            links: Vec::new(),
            ignored,
        };
        let mut findings = vec![finding(false), finding(true), finding(false), finding(true)];
        sort_and_dedup(&mut findings);

        let states: Vec<bool> = findings.iter().map(|f| f.ignored).collect();
        assert_eq!(states, vec![false, true]);
    }

    #[test]
    fn test_findings_sorted_by_location() {
        let tree = tree("resource \"aws_ebs_volume\" \"b\" {}\n\nresource \"aws_ebs_volume\" \"a\" {}\n");
        let result = Scanner::new(Config::default(), RuleRegistry::with_builtin_rules()).scan(&tree);
        let lines: Vec<usize> = result.findings.iter().map(|f| f.location.line).collect();
        assert_eq!(lines, vec![1, 3]);
    }
}
