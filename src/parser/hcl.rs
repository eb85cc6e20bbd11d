//! HCL file parser implementation.
//!
//! This module provides the HCL front-end using the `hcl-rs` crate.
//! `hcl-rs` does not expose source spans, so block and attribute lines are
//! recovered by scanning the source text in declaration order.

use crate::config::Config;
use crate::error::{ErrorCollector, Result, TfSieveError};
use crate::eval::evaluate_constant;
use crate::parser::{
    IgnoreDirective, ParsedFile, Parser, RawAttribute, RawBlock, SKIP_FILES, TERRAFORM_EXTENSIONS,
};
use crate::types::Location;
use crate::value::Value;

use hcl::{Body, Structure};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

static IGNORE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:#|//)\s*tfsieve:ignore:([A-Za-z0-9_\-*]+)").expect("Invalid regex")
});

/// HCL parser for Terraform/OpenTofu files.
///
/// The parser reads the `.tf` files of a module directory and converts
/// them into raw block forests.
pub struct HclParser {
    /// Configuration for parsing behavior
    config: Config,
}

impl HclParser {
    /// Create a new HCL parser with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Parse all Terraform files of one module directory.
    ///
    /// Subdirectories are not descended into: a Terraform module is the set
    /// of files in a single directory, nested modules are reached through
    /// module calls. Files are returned sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist or if parsing fails
    /// for any file (unless `continue_on_error` is enabled in config).
    pub fn parse_directory(&self, path: &Path) -> Result<Vec<ParsedFile>> {
        if !path.is_dir() {
            return Err(crate::err!(DirectoryNotFound {
                path: path.to_path_buf(),
            }));
        }

        let mut files = Vec::new();
        let mut error_collector = ErrorCollector::new();

        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.should_skip(e.path()))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    continue;
                }
            };

            let file_path = entry.path();
            if file_path.is_dir() || !self.is_terraform_file(file_path) {
                continue;
            }

            tracing::debug!(file = %file_path.display(), "Parsing file");

            match self.parse_file(file_path) {
                Ok(parsed) => files.push(parsed),
                Err(e) => {
                    if self.config.scan.continue_on_error && e.is_recoverable() {
                        tracing::warn!(
                            file = %file_path.display(),
                            "failed to parse file, continuing: {}",
                            e
                        );
                        error_collector.add(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        tracing::debug!(
            directory = %path.display(),
            files = files.len(),
            errors = error_collector.count(),
            "Parsed module directory"
        );

        Ok(files)
    }

    /// Parse a single Terraform file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn parse_file(&self, path: &Path) -> Result<ParsedFile> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TfSieveError::io(path, e, file!(), line!()))?;
        self.parse_content(&content, path)
    }

    /// Check if a path should be skipped.
    fn should_skip(&self, path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            if file_name.starts_with('.') {
                tracing::trace!(path = %path.display(), reason = "hidden file/directory", "Skipping path");
                return true;
            }

            if SKIP_FILES.iter().any(|s| file_name == *s) {
                tracing::trace!(path = %path.display(), reason = "known skip file", "Skipping path");
                return true;
            }

            if self.config.scan.exclude_patterns.iter().any(|pattern| {
                glob::Pattern::new(pattern)
                    .map(|p| p.matches(file_name))
                    .unwrap_or(false)
            }) {
                tracing::debug!(path = %path.display(), reason = "matches exclude pattern", "Skipping path");
                return true;
            }
        }

        false
    }

    /// Check if a file is a Terraform file.
    fn is_terraform_file(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        TERRAFORM_EXTENSIONS.iter().any(|ext| path_str.ends_with(ext))
    }
}

impl Parser for HclParser {
    fn parse_content(&self, content: &str, file_path: &Path) -> Result<ParsedFile> {
        let body: Body = hcl::from_str(content).map_err(|e| {
            crate::err!(HclParse {
                file: file_path.to_path_buf(),
                message: e.to_string(),
            })
        })?;

        let locator = LineLocator::new(content, file_path);
        let mut blocks = Vec::new();
        let mut cursor = 0;

        for structure in body.into_inner() {
            match structure {
                Structure::Block(block) => {
                    let raw = convert_block(block, &locator, &mut cursor);
                    blocks.push(raw);
                }
                Structure::Attribute(attr) => {
                    tracing::debug!(
                        file = %file_path.display(),
                        attribute = %attr.key.as_str(),
                        "Ignoring top-level attribute"
                    );
                }
            }
        }

        Ok(ParsedFile {
            path: file_path.to_path_buf(),
            blocks,
            ignores: find_ignores(content),
        })
    }
}

/// Parse a `.tfvars` file into root module input values.
///
/// Only constant expressions are meaningful here; anything referencing
/// other values evaluates to `Unresolved`.
///
/// # Errors
///
/// Returns an error if the content is not valid HCL.
pub fn parse_tfvars(content: &str, file_path: &Path) -> Result<BTreeMap<String, Value>> {
    let body: Body = hcl::from_str(content).map_err(|e| {
        crate::err!(HclParse {
            file: file_path.to_path_buf(),
            message: e.to_string(),
        })
    })?;

    Ok(body
        .attributes()
        .map(|attr| (attr.key.as_str().to_string(), evaluate_constant(&attr.expr)))
        .collect())
}

fn convert_block(block: hcl::Block, locator: &LineLocator<'_>, cursor: &mut usize) -> RawBlock {
    let block_type = block.identifier.as_str().to_string();
    let labels: Vec<String> = block.labels.iter().map(|l| l.as_str().to_string()).collect();

    let line = locator.find_block(*cursor, &block_type, &labels);
    if let Some(found) = line {
        *cursor = found;
    }
    let location = locator.location(line);

    let mut attributes = Vec::new();
    let mut children = Vec::new();
    let mut inner_cursor = line.unwrap_or(*cursor);

    for structure in block.body.into_inner() {
        match structure {
            Structure::Attribute(attr) => {
                let name = attr.key.as_str().to_string();
                let attr_line = locator.find_attribute(inner_cursor, &name);
                if let Some(found) = attr_line {
                    inner_cursor = found;
                }
                attributes.push(RawAttribute {
                    location: locator.location(attr_line.or(line)),
                    name,
                    expr: attr.expr,
                });
            }
            Structure::Block(child) => {
                children.push(convert_block(child, locator, &mut inner_cursor));
            }
        }
    }

    if inner_cursor > *cursor {
        *cursor = inner_cursor;
    }

    RawBlock {
        block_type,
        labels,
        attributes,
        children,
        location,
    }
}

fn find_ignores(content: &str) -> Vec<IgnoreDirective> {
    content
        .lines()
        .enumerate()
        .flat_map(|(idx, line)| {
            IGNORE_PATTERN.captures_iter(line).map(move |cap| IgnoreDirective {
                line: idx + 1,
                rule_id: cap[1].to_string(),
            })
        })
        .collect()
}

/// Recovers line numbers by scanning forward from the previous match.
struct LineLocator<'a> {
    lines: Vec<&'a str>,
    file: &'a Path,
}

impl<'a> LineLocator<'a> {
    fn new(content: &'a str, file: &'a Path) -> Self {
        Self {
            lines: content.lines().collect(),
            file,
        }
    }

    fn location(&self, line: Option<usize>) -> Location {
        Location::new(self.file, line.map_or(0, |l| l + 1))
    }

    /// Zero-based index of the header line `type "label" ... {`.
    fn find_block(&self, from: usize, block_type: &str, labels: &[String]) -> Option<usize> {
        let mut wanted = block_type.to_string();
        for label in labels {
            wanted.push(' ');
            wanted.push_str(label);
        }

        (from..self.lines.len()).find(|&idx| {
            let normalized = normalize_header(self.lines[idx]);
            normalized
                .strip_prefix(&wanted)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(' ') || rest.starts_with('{'))
        })
    }

    /// Zero-based index of the line `name = ...`.
    fn find_attribute(&self, from: usize, name: &str) -> Option<usize> {
        (from..self.lines.len()).find(|&idx| {
            self.lines[idx]
                .trim_start()
                .strip_prefix(name)
                .map(str::trim_start)
                .is_some_and(|rest| rest.starts_with('=') && !rest.starts_with("=="))
        })
    }
}

/// Collapse whitespace and drop label quotes: `resource "a"  "b" {` becomes
/// `resource a b {`.
fn normalize_header(line: &str) -> String {
    line.replace('"', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn create_test_parser() -> HclParser {
        HclParser::new(&Config::default())
    }

    #[test]
    fn test_parse_resource_block() {
        let parser = create_test_parser();
        let content = r#"
resource "aws_ebs_volume" "example" {
  availability_zone = "us-west-2a"
  size              = 40

  tags = {
    Name = "HelloWorld"
  }
}
"#;

        let result = parser.parse_content(content, Path::new("main.tf")).unwrap();

        assert_eq!(result.blocks.len(), 1);
        let block = &result.blocks[0];
        assert_eq!(block.block_type, "resource");
        assert_eq!(block.labels, vec!["aws_ebs_volume", "example"]);
        assert_eq!(block.location.line, 2);

        let names: Vec<_> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["availability_zone", "size", "tags"]);
        assert_eq!(block.attribute("size").unwrap().location.line, 4);
        assert_eq!(block.attribute("tags").unwrap().location.line, 6);
    }

    #[test]
    fn test_parse_nested_blocks() {
        let parser = create_test_parser();
        let content = r#"
resource "aws_instance" "web" {
  ami = "ami-123"

  ebs_block_device {
    device_name = "/dev/sdb"
    encrypted   = true
  }

  ebs_block_device {
    device_name = "/dev/sdc"
  }
}
"#;

        let result = parser.parse_content(content, Path::new("main.tf")).unwrap();
        let block = &result.blocks[0];

        assert_eq!(block.children.len(), 2);
        assert_eq!(block.children[0].block_type, "ebs_block_device");
        assert_eq!(block.children[0].location.line, 5);
        assert_eq!(block.children[1].location.line, 10);
        assert_eq!(block.children[0].attribute("encrypted").unwrap().location.line, 7);
    }

    #[test]
    fn test_locations_follow_declaration_order() {
        let parser = create_test_parser();
        let content = r#"
resource "aws_kms_key" "a" {
  description = "a"
}

resource "aws_kms_key" "b" {
  description = "b"
}
"#;

        let result = parser.parse_content(content, Path::new("main.tf")).unwrap();
        assert_eq!(result.blocks[0].location.line, 2);
        assert_eq!(result.blocks[0].attributes[0].location.line, 3);
        assert_eq!(result.blocks[1].location.line, 6);
        assert_eq!(result.blocks[1].attributes[0].location.line, 7);
    }

    #[test]
    fn test_parse_ignore_directives() {
        let parser = create_test_parser();
        let content = r#"
#tfsieve:ignore:aws-ebs-encryption-customer-key
resource "aws_ebs_volume" "example" {
  size = 40 // tfsieve:ignore:*
}
"#;

        let result = parser.parse_content(content, Path::new("main.tf")).unwrap();
        assert_eq!(
            result.ignores,
            vec![
                IgnoreDirective {
                    line: 2,
                    rule_id: "aws-ebs-encryption-customer-key".to_string(),
                },
                IgnoreDirective {
                    line: 4,
                    rule_id: "*".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_invalid_hcl() {
        let parser = create_test_parser();
        let content = "this is not valid { hcl";

        let result = parser.parse_content(content, Path::new("main.tf"));
        assert!(matches!(result, Err(TfSieveError::HclParse { .. })));
    }

    #[test]
    fn test_parse_tfvars() {
        let content = r#"
region      = "eu-west-1"
encrypt     = true
subnets     = ["a", "b"]
"#;

        let vars = parse_tfvars(content, Path::new("prod.tfvars")).unwrap();
        assert_eq!(vars.get("region"), Some(&Value::from("eu-west-1")));
        assert_eq!(vars.get("encrypt"), Some(&Value::Bool(true)));
        assert_eq!(
            vars.get("subnets"),
            Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
    }

    #[test]
    fn test_is_terraform_file() {
        let parser = create_test_parser();

        assert!(parser.is_terraform_file(Path::new("main.tf")));
        assert!(parser.is_terraform_file(Path::new("variables.tf")));
        assert!(!parser.is_terraform_file(Path::new("prod.tfvars")));
        assert!(!parser.is_terraform_file(Path::new("readme.md")));
    }

    #[test]
    fn test_should_skip() {
        let parser = create_test_parser();

        assert!(parser.should_skip(Path::new(".terraform")));
        assert!(parser.should_skip(Path::new(".git")));
        assert!(parser.should_skip(Path::new("terraform.tfstate")));
        assert!(!parser.should_skip(Path::new("main.tf")));
    }

    #[test]
    fn test_parse_directory_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.tf"), r#"resource "aws_s3_bucket" "b" {}"#).unwrap();
        std::fs::write(dir.path().join("notes.md"), "not terraform").unwrap();
        std::fs::create_dir(dir.path().join("modules")).unwrap();
        std::fs::write(dir.path().join("modules/inner.tf"), r#"resource "aws_s3_bucket" "c" {}"#).unwrap();

        let files = create_test_parser().parse_directory(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].blocks[0].labels, vec!["aws_s3_bucket", "b"]);
    }

    #[test]
    fn test_parse_directory_continue_on_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tf"), "broken {").unwrap();
        std::fs::write(dir.path().join("b.tf"), r#"resource "aws_s3_bucket" "b" {}"#).unwrap();

        assert!(create_test_parser().parse_directory(dir.path()).is_err());

        let mut config = Config::default();
        config.scan.continue_on_error = true;
        let files = HclParser::new(&config).parse_directory(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
    }
}
