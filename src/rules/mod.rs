//! Rule contract and registry.
//!
//! A rule is a pure predicate over one block and the module it belongs to.
//! It reports problems through [`Results`], anchoring each message on a
//! block or an attribute so the finding carries a source location.
//!
//! Rules are collected in an explicitly constructed [`RuleRegistry`] that
//! is handed to the scanner; there is no global registration.
//!
//! # Example
//!
//! ```rust
//! use tfsieve::rules::RuleRegistry;
//!
//! let registry = RuleRegistry::with_builtin_rules();
//! assert!(registry.get("aws-ebs-encryption-customer-key").is_some());
//! ```

mod aws_ebs;

pub use aws_ebs::EbsEncryptionCustomerKey;

use crate::error::ResolutionError;
use crate::model::{Attribute, Block, Module, ModuleTree};
use crate::types::{Location, Severity};
use crate::value::Value;
use serde::Serialize;

/// Static description of a rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleDescriptor {
    /// Unique rule id, e.g. `aws-ebs-encryption-customer-key`
    pub id: &'static str,
    /// Cloud provider (`aws`, `azure`, ...)
    pub provider: &'static str,
    /// Provider service (`ebs`, `s3`, ...)
    pub service: &'static str,
    /// One-line summary
    pub summary: &'static str,
    /// What happens if the problem is left in place
    pub impact: &'static str,
    /// How to fix it
    pub resolution: &'static str,
    /// Default severity
    pub severity: Severity,
    /// Block types the rule applies to (empty for all)
    pub required_types: &'static [&'static str],
    /// First-label glob patterns the rule applies to (empty for all)
    pub required_labels: &'static [&'static str],
    /// Reference documentation
    pub links: &'static [&'static str],
    /// Compliant configuration examples
    pub good_examples: &'static [&'static str],
    /// Non-compliant configuration examples
    pub bad_examples: &'static [&'static str],
}

impl RuleDescriptor {
    /// True if the rule should run for `block`.
    #[must_use]
    pub fn applies_to(&self, block: &Block) -> bool {
        let type_matches =
            self.required_types.is_empty() || self.required_types.contains(&block.block_type());
        if !type_matches {
            return false;
        }
        if self.required_labels.is_empty() {
            return true;
        }
        let Some(label) = block.type_label() else {
            return false;
        };
        self.required_labels.iter().any(|pattern| {
            glob::Pattern::new(pattern).map_or(*pattern == label, |p| p.matches(label))
        })
    }
}

/// A security or compliance check.
pub trait Rule: Send + Sync {
    /// The rule's static description.
    fn descriptor(&self) -> &RuleDescriptor;

    /// Check one block. Must not panic; the scanner isolates rules that do.
    fn check(&self, block: &Block, scope: &ModuleScope<'_>) -> Results;
}

/// What a result points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Qualified address of the block
    pub resource: String,
    /// Attribute name, when anchored on an attribute
    pub attribute: Option<String>,
    /// Source location
    pub location: Location,
}

impl From<&Block> for Anchor {
    fn from(block: &Block) -> Self {
        Self {
            resource: block.qualified_address(),
            attribute: None,
            location: block.location().clone(),
        }
    }
}

impl From<&Attribute> for Anchor {
    fn from(attr: &Attribute) -> Self {
        Self {
            resource: attr.owner().to_string(),
            attribute: Some(attr.name().to_string()),
            location: attr.location().clone(),
        }
    }
}

/// One problem reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    /// Message shown to the user
    pub message: String,
    /// Where the problem is
    pub anchor: Anchor,
}

/// Results of one rule check.
#[derive(Debug, Clone, Default)]
pub struct Results {
    results: Vec<RuleResult>,
}

impl Results {
    /// Report a problem anchored on a block or an attribute.
    pub fn add(&mut self, message: impl Into<String>, anchor: impl Into<Anchor>) {
        self.results.push(RuleResult {
            message: message.into(),
            anchor: anchor.into(),
        });
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True if the check passed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over results.
    pub fn iter(&self) -> impl Iterator<Item = &RuleResult> {
        self.results.iter()
    }
}

impl IntoIterator for Results {
    type Item = RuleResult;
    type IntoIter = std::vec::IntoIter<RuleResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// The module a checked block belongs to, together with the whole tree.
#[derive(Debug, Clone, Copy)]
pub struct ModuleScope<'t> {
    tree: &'t ModuleTree,
    module: &'t Module,
}

impl<'t> ModuleScope<'t> {
    /// Scope of `module` within `tree`.
    #[must_use]
    pub const fn new(tree: &'t ModuleTree, module: &'t Module) -> Self {
        Self { tree, module }
    }

    /// The whole tree.
    #[must_use]
    pub const fn tree(&self) -> &'t ModuleTree {
        self.tree
    }

    /// The module of the checked block.
    #[must_use]
    pub const fn module(&self) -> &'t Module {
        self.module
    }

    /// Evaluate an attribute of a block.
    #[must_use]
    pub fn value(&self, block: &Block, attribute: &str) -> Value {
        block.value(attribute, self.tree)
    }

    /// Resolve the block(s) an attribute refers to.
    ///
    /// # Errors
    ///
    /// See [`ModuleTree::resolve_reference`]. Rules should treat every error
    /// as "cannot tell" and skip the check.
    pub fn resolve_reference(&self, attr: &Attribute, block: &Block) -> Result<Vec<&'t Block>, ResolutionError> {
        self.tree.resolve_reference(attr, block)
    }
}

/// An explicitly constructed list of rules.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in rule.
    #[must_use]
    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(EbsEncryptionCustomerKey::new()));
        registry
    }

    /// Add a rule. A rule with an id already registered replaces it.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        let id = rule.descriptor().id;
        if let Some(existing) = self.rules.iter_mut().find(|r| r.descriptor().id == id) {
            tracing::debug!(rule = id, "Replacing registered rule");
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
    }

    /// Registered rules in registration order.
    #[must_use]
    pub fn rules(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    /// A rule by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|r| r.descriptor().id == id)
            .map(|r| &**r)
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.descriptor().id))
            .finish()
    }
}
