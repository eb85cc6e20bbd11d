//! Integration tests for tfsieve.
//!
//! These tests verify the end-to-end functionality of the parser, module
//! tree builder, resolver, scanner and reporter against on-disk fixtures.

use std::path::PathBuf;
use tfsieve::rules::RuleRegistry;
use tfsieve::{Config, Scanner};

const RULE_ID: &str = "aws-ebs-encryption-customer-key";

/// Get the path to the test fixtures directory.
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn scanner() -> Scanner {
    Scanner::new(Config::default(), RuleRegistry::with_builtin_rules())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

mod scanner_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scan_ebs_fixture() {
        let result = scanner().scan_path(fixtures_path().join("ebs"), &[]).unwrap();

        let findings: Vec<(String, String, usize)> = result
            .findings
            .iter()
            .map(|f| {
                let target = match &f.attribute {
                    Some(attr) => format!("{}.{attr}", f.resource),
                    None => f.resource.clone(),
                };
                (f.message.clone(), target, f.location.line)
            })
            .collect();

        assert_eq!(
            findings,
            vec![
                (
                    "Resource explicitly uses the default CMK".to_string(),
                    "data.aws_kms_key.aws_managed.key_id".to_string(),
                    7
                ),
                (
                    "Resource does not use CMK".to_string(),
                    "aws_ebs_volume.no_key".to_string(),
                    10
                ),
            ]
        );
        assert!(result.findings.iter().all(|f| f.rule_id == RULE_ID));
        assert_eq!(file_name(&result.findings[0].location.file), "main.tf");
        assert_eq!(result.summary.ignored, 1);
        assert_eq!(result.summary.checks, 4);
        assert_eq!(result.summary.failed_checks, 0);
        assert_eq!(result.files_scanned.len(), 1);
    }

    #[test]
    fn test_scan_follows_module_arguments() {
        let result = scanner().scan_path(fixtures_path().join("modules"), &[]).unwrap();

        // both for_each instances resolve to the same root data block
        assert_eq!(result.findings.len(), 1);
        let finding = &result.findings[0];
        assert_eq!(finding.message, "Resource explicitly uses the default CMK");
        assert_eq!(finding.resource, "data.aws_kms_key.default");
        assert_eq!(finding.location.line, 2);
        assert_eq!(finding.location.module, None);

        // the count = 0 module call contributes no volumes
        assert_eq!(result.summary.checks, 2);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.contains("module.remote") && d.contains("not local")));
    }

    #[test]
    fn test_cyclic_modules_terminate() {
        let result = scanner().scan_path(fixtures_path().join("cyclic"), &[]).unwrap();

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].resource, "aws_ebs_volume.root");
        assert!(result.diagnostics.iter().any(|d| d.contains("module source cycle")));
    }

    #[test]
    fn test_tfvars_autoload_and_override() {
        let dir = fixtures_path().join("tfvars");

        let result = scanner().scan_path(&dir, &[]).unwrap();
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].resource, "data.aws_kms_key.selected");
        assert_eq!(result.findings[0].location.line, 6);

        let custom = fixtures_path().join("custom.tfvars");
        let result = scanner().scan_path(&dir, &[custom]).unwrap();
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let err = scanner()
            .scan_path(fixtures_path().join("does-not-exist"), &[])
            .unwrap_err();
        assert!(err.to_string().contains("Directory not found"));
    }

    #[test]
    fn test_exclude_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.tf"), "resource \"aws_ebs_volume\" \"a\" {}\n").unwrap();
        std::fs::write(dir.path().join("legacy.tf"), "resource \"aws_ebs_volume\" \"b\" {}\n").unwrap();

        let mut config = Config::default();
        config.scan.exclude_patterns.push("legacy.tf".to_string());
        let result = Scanner::new(config, RuleRegistry::with_builtin_rules())
            .scan_path(dir.path(), &[])
            .unwrap();

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].resource, "aws_ebs_volume.a");
    }
}

mod model_tests {
    use super::*;
    use tfsieve::Value;

    #[test]
    fn test_module_instances_and_values() {
        let tree = scanner().load_tree(fixtures_path().join("modules"), &[]).unwrap();

        let storage = tree.module_by_path("module.storage").unwrap();
        let volumes: Vec<_> = storage.blocks_of_type("resource").collect();
        assert_eq!(volumes.len(), 2);
        assert!(tree.module_by_path("module.disabled").is_none());

        let names: Vec<Value> = volumes
            .iter()
            .map(|v| {
                let tags = v.value("tags", &tree);
                tags.get("Name")
            })
            .collect();
        assert_eq!(names[0].as_str(), Some("data"));
        assert_eq!(names[1].as_str(), Some("logs"));
    }

    #[test]
    fn test_memoized_values_are_idempotent() {
        let tree = scanner().load_tree(fixtures_path().join("tfvars"), &[]).unwrap();
        let found = tree.root().find("data", &["aws_kms_key", "selected"]);
        let data = found[0];

        let first = data.value("key_id", &tree);
        let second = data.value("key_id", &tree);
        assert!(first.identical(&second));
        assert_eq!(first.as_str(), Some("alias/aws/ebs"));

        let missing = data.value("not_there", &tree);
        assert!(missing.identical(&data.value("not_there", &tree)));
        assert!(!missing.is_fully_resolved());
    }

    #[test]
    fn test_has_and_missing_attribute_are_complements() {
        let tree = scanner().load_tree(fixtures_path().join("ebs"), &[]).unwrap();
        for (_, block) in tree.all_blocks() {
            for name in ["kms_key_id", "size", "key_id", "description", "nothing"] {
                assert_ne!(block.has_attribute(name), block.missing_attribute(name));
            }
        }
    }

    #[test]
    fn test_resolution_from_child_module() {
        let tree = scanner().load_tree(fixtures_path().join("modules"), &[]).unwrap();
        let storage = tree.module_by_path("module.storage").unwrap();
        let volume = storage.blocks_of_type("resource").next().unwrap();
        let attr = volume.get_attribute("kms_key_id").unwrap();

        let targets = tree.resolve_reference(attr, volume).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].qualified_address(), "data.aws_kms_key.default");
    }
}

mod reporter_tests {
    use super::*;
    use tfsieve::reporter::Reporter;
    use tfsieve::ReportFormat;

    #[test]
    fn test_reports_for_fixture() {
        let result = scanner().scan_path(fixtures_path().join("ebs"), &[]).unwrap();
        let mut config = Config::default();
        config.output.colored = false;
        let reporter = Reporter::new(&config);

        let json = reporter.generate(&result, ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["findings"].as_array().unwrap().len(), 2);
        assert_eq!(value["summary"]["ignored"], 1);

        let text = reporter.generate(&result, ReportFormat::Text).unwrap();
        assert!(text.contains("Resource does not use CMK"));
        assert!(text.contains("2 LOW"));
    }
}

mod graph_tests {
    use super::*;
    use tfsieve::graph::ReferenceGraph;

    #[test]
    fn test_graph_spans_modules() {
        let tree = scanner().load_tree(fixtures_path().join("modules"), &[]).unwrap();
        let graph = ReferenceGraph::build(&tree);

        let dependents = graph.dependents_of("data.aws_kms_key.default");
        assert!(dependents.contains(&"module.storage"));
        assert!(dependents
            .iter()
            .any(|d| d.starts_with("module.storage.aws_ebs_volume.this")));
        assert!(graph.find_cycles().is_empty());
        assert!(graph.to_dot().contains("cluster_"));
    }
}

mod cli_tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn tfsieve() -> Command {
        let mut cmd = Command::cargo_bin("tfsieve").unwrap();
        cmd.env_remove("TFSIEVE_CONFIG").env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn test_scan_low_findings_exit_zero() {
        tfsieve()
            .args(["scan", "--no-color"])
            .arg(fixtures_path().join("ebs"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Resource does not use CMK"));
    }

    #[test]
    fn test_scan_strict_exit_two() {
        tfsieve()
            .args(["scan", "--strict", "--format", "json"])
            .arg(fixtures_path().join("ebs"))
            .assert()
            .code(2)
            .stdout(predicate::str::contains(RULE_ID));
    }

    #[test]
    fn test_scan_missing_directory_fails() {
        tfsieve()
            .args(["scan"])
            .arg(fixtures_path().join("does-not-exist"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Directory not found"));
    }

    #[test]
    fn test_rules_command() {
        tfsieve()
            .arg("rules")
            .assert()
            .success()
            .stdout(predicate::str::contains(RULE_ID));
    }

    #[test]
    fn test_graph_command() {
        tfsieve()
            .arg("graph")
            .arg(fixtures_path().join("ebs"))
            .assert()
            .success()
            .stdout(predicate::str::contains("digraph tfsieve"))
            .stdout(predicate::str::contains("aws_ebs_volume.default_key"));
    }

    #[test]
    fn test_init_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        tfsieve().current_dir(dir.path()).arg("init").assert().success();
        let content = std::fs::read_to_string(dir.path().join("tfsieve.yaml")).unwrap();
        assert!(Config::from_yaml(&content).is_ok());

        tfsieve().current_dir(dir.path()).arg("init").assert().failure();
    }
}
