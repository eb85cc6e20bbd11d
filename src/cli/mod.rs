//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `scan`: Run the security rules over a Terraform/OpenTofu directory
//! - `graph`: Print the reference graph of a directory as Graphviz DOT
//! - `rules`: List the built-in rules
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Scan a root module
//! tfsieve scan ./terraform
//!
//! # Scan with variable values and a JSON report
//! tfsieve scan ./terraform --tfvars-file prod.tfvars --format json --output report.json
//!
//! # Render the reference graph
//! tfsieve graph ./terraform | dot -Tsvg > refs.svg
//! ```

use crate::types::ReportFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// tfsieve - static security scanner for Terraform/OpenTofu configurations.
#[derive(Parser, Debug)]
#[command(
    name = "tfsieve",
    author,
    version,
    about = "Static security scanner for Terraform/OpenTofu configurations",
    long_about = "tfsieve parses Terraform/OpenTofu HCL, expands count/for_each and local \
                  modules, resolves references between blocks, and checks the resolved \
                  model against a set of security rules."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TFSIEVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a Terraform/OpenTofu directory
    #[command(visible_alias = "s")]
    Scan(ScanArgs),

    /// Print the reference graph of a directory
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// List the built-in rules
    Rules(RulesArgs),

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the scan command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Root module directory
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: ReportFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Variables file for the root module (repeatable)
    #[arg(long = "tfvars-file", value_name = "FILE")]
    pub tfvars_files: Vec<PathBuf>,

    /// Fail on findings of any severity
    #[arg(long)]
    pub strict: bool,

    /// Continue scanning even if some files fail to parse
    #[arg(long)]
    pub continue_on_error: bool,

    /// Report findings suppressed by ignore comments
    #[arg(long)]
    pub include_ignored: bool,

    /// Evaluation and resolution recursion limit
    #[arg(long, value_name = "DEPTH")]
    pub max_depth: Option<usize>,

    /// Patterns to exclude from scanning (glob patterns)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub exclude_patterns: Vec<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for the graph command.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Root module directory
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Variables file for the root module (repeatable)
    #[arg(long = "tfvars-file", value_name = "FILE")]
    pub tfvars_files: Vec<PathBuf>,

    /// Print reference cycles instead of the graph
    #[arg(long)]
    pub cycles: bool,
}

/// Arguments for the rules command.
#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: ReportFormat,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "tfsieve.yaml")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::parse_from(["tfsieve", "scan"]);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.path, PathBuf::from("."));
                assert_eq!(args.format, ReportFormat::Text);
                assert_eq!(args.max_depth, None);
                assert!(!args.strict);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_scan_with_options() {
        let cli = Cli::parse_from([
            "tfsieve",
            "scan",
            "./terraform",
            "--format",
            "json",
            "--output",
            "report.json",
            "--tfvars-file",
            "a.tfvars",
            "--tfvars-file",
            "b.tfvars",
            "--exclude",
            "*.generated.tf",
            "--include-ignored",
            "--max-depth",
            "8",
            "--strict",
        ]);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.path, PathBuf::from("./terraform"));
                assert_eq!(args.format, ReportFormat::Json);
                assert_eq!(args.output, Some(PathBuf::from("report.json")));
                assert_eq!(args.tfvars_files.len(), 2);
                assert_eq!(args.exclude_patterns, vec!["*.generated.tf".to_string()]);
                assert!(args.include_ignored);
                assert_eq!(args.max_depth, Some(8));
                assert!(args.strict);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_graph_command() {
        let cli = Cli::parse_from(["tfsieve", "graph", "./terraform", "--cycles"]);
        match cli.command {
            Commands::Graph(args) => {
                assert_eq!(args.path, PathBuf::from("./terraform"));
                assert!(args.cycles);
            }
            _ => panic!("Expected Graph command"),
        }
    }

    #[test]
    fn test_rules_and_init_commands() {
        let cli = Cli::parse_from(["tfsieve", "rules", "--format", "json"]);
        assert!(matches!(cli.command, Commands::Rules(RulesArgs { format: ReportFormat::Json })));

        let cli = Cli::parse_from(["tfsieve", "init"]);
        assert!(matches!(cli.command, Commands::Init));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["tfsieve", "validate", "custom.yaml"]);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.config, PathBuf::from("custom.yaml"));
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from(["tfsieve", "-vvv", "--config", "custom.yaml", "scan", "./terraform"]);
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
    }

    #[test]
    fn test_alias() {
        let cli = Cli::parse_from(["tfsieve", "s", "./terraform"]);
        assert!(matches!(cli.command, Commands::Scan(_)));
    }
}
