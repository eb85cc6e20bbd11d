//! Configuration module for tfsieve.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`tfsieve.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # tfsieve.yaml
//!
//! scan:
//!   exclude_patterns:
//!     - "*_override.tf"
//!   continue_on_error: true
//!   include_ignored: false
//!
//! evaluation:
//!   max_depth: 64
//!   max_instances: 1000
//!   max_module_depth: 16
//!   variables:
//!     environment: production
//!     kms_key_arn: ${KMS_KEY_ARN}  # Environment variable expansion
//!
//! rules:
//!   disabled:
//!     - aws-ebs-encryption-customer-key
//!   severity_overrides:
//!     aws-ebs-encryption-customer-key: high
//!
//! output:
//!   colored: true
//!   pretty: true
//! ```

use crate::error::{Result, TfSieveError};
use crate::types::Severity;
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex"));
static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex"));

/// Configuration file names looked up in the working directory.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["tfsieve.yaml", "tfsieve.yml", ".tfsieve.yaml"];

/// Scanning options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanOptions {
    /// File or directory names to exclude (glob patterns).
    pub exclude_patterns: Vec<String>,

    /// Continue scanning even if some files fail to parse.
    pub continue_on_error: bool,

    /// Report findings suppressed by inline ignore comments.
    pub include_ignored: bool,
}

/// Static evaluation limits and root module inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    /// Recursion ceiling for evaluation and reference resolution.
    pub max_depth: usize,

    /// Cap on instances produced by one `count`/`for_each`.
    pub max_instances: usize,

    /// Ceiling on nested module calls.
    pub max_module_depth: usize,

    /// Root module input values (override `.tfvars` and variable defaults).
    pub variables: BTreeMap<String, serde_yaml::Value>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_instances: default_max_instances(),
            max_module_depth: default_max_module_depth(),
            variables: BTreeMap::new(),
        }
    }
}

impl EvaluationOptions {
    /// Root module inputs converted to attribute values.
    #[must_use]
    pub fn variable_values(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect()
    }
}

/// Rule selection options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RulesOptions {
    /// Rule ids that are never run.
    pub disabled: Vec<String>,

    /// Severity overrides by rule id (`low`, `medium`, `high`, `critical`).
    pub severity_overrides: HashMap<String, String>,
}

impl RulesOptions {
    /// True if the rule id is disabled.
    #[must_use]
    pub fn is_disabled(&self, rule_id: &str) -> bool {
        self.disabled.iter().any(|d| d == rule_id)
    }

    /// The configured severity override for a rule, if any and valid.
    #[must_use]
    pub fn severity_for(&self, rule_id: &str) -> Option<Severity> {
        self.severity_overrides
            .get(rule_id)
            .and_then(|s| Severity::parse(s))
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Use colored output.
    pub colored: bool,

    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            colored: true,
            pretty: true,
        }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Scanning options
    pub scan: ScanOptions,

    /// Evaluation options
    pub evaluation: EvaluationOptions,

    /// Rule options
    pub rules: RulesOptions,

    /// Output options
    pub output: OutputOptions,
}

const fn default_max_depth() -> usize {
    64
}

const fn default_max_instances() -> usize {
    1000
}

const fn default_max_module_depth() -> usize {
    16
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value is out of range.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        let config: Self = serde_yaml::from_str(&expanded).map_err(|e| {
            TfSieveError::config_parse(e.to_string(), Some(Box::new(e)), file!(), line!())
        })?;
        config.validate()?;

        tracing::debug!(
            exclude_patterns = config.scan.exclude_patterns.len(),
            continue_on_error = config.scan.continue_on_error,
            variables = config.evaluation.variables.len(),
            disabled_rules = config.rules.disabled.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TfSieveError::io(path, e, file!(), line!()))?;
        Self::from_yaml(&content)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValue` error naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.evaluation.max_depth == 0 {
            return Err(crate::err!(ConfigValue {
                key: "evaluation.max_depth".to_string(),
                message: "must be greater than 0".to_string(),
            }));
        }
        if self.evaluation.max_module_depth == 0 {
            return Err(crate::err!(ConfigValue {
                key: "evaluation.max_module_depth".to_string(),
                message: "must be greater than 0".to_string(),
            }));
        }
        for (rule, severity) in &self.rules.severity_overrides {
            if Severity::parse(severity).is_none() {
                return Err(crate::err!(ConfigValue {
                    key: format!("rules.severity_overrides.{rule}"),
                    message: format!("unknown severity '{severity}'"),
                }));
            }
        }
        Ok(())
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r##"# tfsieve configuration file

# Scanning options
scan:
  # File or directory names to exclude (glob patterns)
  exclude_patterns:
    - "*_override.tf"

  # Continue scanning even if some files fail to parse
  continue_on_error: false

  # Report findings suppressed by "#tfsieve:ignore:<rule>" comments
  include_ignored: false

# Static evaluation limits
evaluation:
  # Recursion ceiling for evaluation and reference resolution
  max_depth: 64

  # Cap on instances produced by one count/for_each
  max_instances: 1000

  # Ceiling on nested module calls
  max_module_depth: 16

  # Root module input values
  # variables:
  #   environment: production
  #   kms_key_arn: ${KMS_KEY_ARN}

# Rule selection
rules:
  # Rules that are never run
  disabled: []

  # Severity overrides by rule id
  # severity_overrides:
  #   aws-ebs-encryption-customer-key: high

# Output options
output:
  # Use colored output in terminal
  colored: true

  # Pretty-print JSON output
  pretty: true
"##
        .to_string()
    }

    /// Merge CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &crate::cli::ScanArgs) {
        if !args.exclude_patterns.is_empty() {
            self.scan
                .exclude_patterns
                .extend(args.exclude_patterns.iter().cloned());
        }
        if args.continue_on_error {
            self.scan.continue_on_error = true;
        }
        if args.include_ignored {
            self.scan.include_ignored = true;
        }
        if let Some(depth) = args.max_depth {
            self.evaluation.max_depth = depth;
        }
        if args.no_color {
            self.output.colored = false;
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unknown variables are left as is.
fn expand_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    });
    BARE_VAR
        .replace_all(&braced, |cap: &regex::Captures<'_>| {
            std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
        })
        .into_owned()
}
