//! tfsieve CLI entry point.
//!
//! This binary provides the command-line interface for tfsieve.

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tfsieve::cli::{Cli, Commands};
use tfsieve::graph::ReferenceGraph;
use tfsieve::reporter::Reporter;
use tfsieve::rules::RuleRegistry;
use tfsieve::{Config, ReportFormat, Scanner, Severity, TfSieveError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["tfsieve.yaml", "tfsieve.yml", ".tfsieve.yaml"];

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<TfSieveError>()
                .map_or(1, TfSieveError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            // tfsieve at the requested level, everything else at warn
            EnvFilter::new(format!("warn,tfsieve={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Scan(args) => {
            config.merge_cli_args(&args);
            config.validate()?;

            let scanner = Scanner::new(config.clone(), RuleRegistry::with_builtin_rules());
            let result = scanner.scan_path(&args.path, &args.tfvars_files)?;

            let report = Reporter::new(&config).generate(&result, args.format)?;
            write_output(args.output.as_deref(), &report)?;

            let failing = if args.strict {
                result.active_findings().next().is_some()
            } else {
                result.has_findings_at_least(Severity::High)
            };
            Ok(ExitCode::from(if failing { 2 } else { 0 }))
        }

        Commands::Graph(args) => {
            let scanner = Scanner::new(config, RuleRegistry::new());
            let tree = scanner.load_tree(&args.path, &args.tfvars_files)?;
            let graph = ReferenceGraph::build(&tree);

            let output = if args.cycles {
                let cycles = graph.find_cycles();
                let mut out = String::new();
                for cycle in &cycles {
                    out.push_str(&cycle.join(" -> "));
                    out.push('\n');
                }
                out
            } else {
                graph.to_dot()
            };
            write_output(args.output.as_deref(), &output)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Rules(args) => {
            let registry = RuleRegistry::with_builtin_rules();
            let descriptors: Vec<_> = registry.rules().iter().map(|r| r.descriptor()).collect();
            match args.format {
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&descriptors)?),
                ReportFormat::Text => {
                    for d in descriptors {
                        println!("{:<40} {:<8} {}", d.id, d.severity, d.summary);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Init => {
            let config_path = std::path::Path::new(DEFAULT_CONFIG_PATHS[0]);
            if config_path.exists() {
                anyhow::bail!("Configuration file already exists: {}", config_path.display());
            }

            std::fs::write(config_path, Config::example_yaml())?;
            println!("Created example configuration: {}", config_path.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate(args) => match Config::from_file(&args.config) {
            Ok(_) => {
                println!("Configuration is valid: {}", args.config.display());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Configuration error: {e}");
                Ok(ExitCode::from(1))
            }
        },
    }
}

fn write_output(path: Option<&std::path::Path>, content: &str) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "Output written");
    } else {
        println!("{content}");
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(ref config_path) = cli.config {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        return Ok(Config::from_file(config_path)?);
    }

    for path in DEFAULT_CONFIG_PATHS {
        let path = std::path::Path::new(path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Found configuration file");
            return Ok(Config::from_file(path)?);
        }
    }

    tracing::debug!("No configuration file found, using default configuration");
    Ok(Config::default())
}
