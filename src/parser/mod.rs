//! HCL front-end for Terraform/OpenTofu files.
//!
//! The front-end turns HCL text into a forest of [`RawBlock`]s: block type,
//! labels, raw attribute expressions and nested blocks, each with a source
//! [`Location`]. It does no evaluation; everything past this point works on
//! the model built by [`crate::model::ModuleTreeBuilder`].
//!
//! # Example
//!
//! ```rust
//! use tfsieve::parser::{HclParser, Parser};
//! use tfsieve::Config;
//! use std::path::Path;
//!
//! let parser = HclParser::new(&Config::default());
//! let file = parser
//!     .parse_content(r#"resource "aws_ebs_volume" "example" { size = 40 }"#, Path::new("main.tf"))
//!     .unwrap();
//! assert_eq!(file.blocks[0].labels, vec!["aws_ebs_volume", "example"]);
//! ```

mod hcl;
mod loader;

pub use self::hcl::{parse_tfvars, HclParser};
pub use loader::{LoadedModule, LocalModuleLoader, MemoryModuleLoader, ModuleLoader};

use crate::types::Location;
use std::path::PathBuf;

/// File extensions to scan for Terraform/OpenTofu files.
pub const TERRAFORM_EXTENSIONS: &[&str] = &[".tf"];

/// Files and directories to skip during scanning.
pub const SKIP_FILES: &[&str] = &[".terraform", ".terragrunt-cache", "terraform.tfstate"];

/// Trait for parsing HCL content.
///
/// This trait allows for different parsing implementations
/// (e.g., for testing with canned block forests).
pub trait Parser: Send + Sync {
    /// Parse a single file's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the HCL content is invalid.
    fn parse_content(&self, content: &str, file_path: &std::path::Path) -> crate::Result<ParsedFile>;
}

/// One attribute as written in the source.
#[derive(Debug, Clone)]
pub struct RawAttribute {
    /// Attribute name
    pub name: String,
    /// Unevaluated expression
    pub expr: ::hcl::Expression,
    /// Where the attribute was declared
    pub location: Location,
}

/// One block as written in the source.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block type (`resource`, `data`, `module`, `tags`, ...)
    pub block_type: String,
    /// Block labels in declaration order
    pub labels: Vec<String>,
    /// Attributes in declaration order
    pub attributes: Vec<RawAttribute>,
    /// Nested blocks in declaration order
    pub children: Vec<RawBlock>,
    /// Where the block header was declared
    pub location: Location,
}

impl RawBlock {
    /// Find an attribute by exact name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&RawAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// An inline `tfsieve:ignore:<rule>` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreDirective {
    /// Line the comment is on (1-based)
    pub line: usize,
    /// Rule id, or `*` for every rule
    pub rule_id: String,
}

/// Parsed contents of one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// The file path
    pub path: PathBuf,
    /// Top-level blocks
    pub blocks: Vec<RawBlock>,
    /// Inline ignore directives found in comments
    pub ignores: Vec<IgnoreDirective>,
}
