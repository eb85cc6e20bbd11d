//! Configuration model and reference resolution.
//!
//! The model is an arena: a [`ModuleTree`] owns every [`Module`], each
//! module owns its [`Block`]s, and everything else refers to modules and
//! blocks by stable id or by address. Nothing holds a live handle into
//! another module, so resolution always re-derives a target from its
//! address.
//!
//! ```text
//! ModuleTree
//!  ├── Module (root)            blocks, (type, labels) index
//!  │    ├── Block aws_ebs_volume.data[0]
//!  │    ├── Block aws_ebs_volume.data[1]
//!  │    └── Block module.disks ──────┐ children by call name (ids)
//!  └── Module module.disks ◀─────────┘ parent (id), call site
//! ```
//!
//! Expansion (`count`, `for_each`, `dynamic`, module calls) happens once,
//! in [`ModuleTreeBuilder`]. Afterwards the tree is immutable apart from
//! per-block memoization of evaluated attribute values.

mod address;
mod block;
mod builder;
mod module;
mod resolve;

pub use address::Address;
pub use block::{Attribute, Block};
pub use builder::ModuleTreeBuilder;
pub use module::{CallSite, Module, ModuleTree};
pub use resolve::Reference;

pub(crate) use address::parse_expression;

use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a block instance within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

/// Index of a module instance in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    /// The root module is always the first arena entry.
    pub const ROOT: Self = Self(0);

    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Key of one instance produced by `count` or `for_each`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKey {
    /// `count` index
    Index(usize),
    /// `for_each` key
    Key(String),
}

impl InstanceKey {
    /// Interpret an evaluated index expression as an instance key.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(Self::Index(*n as usize)),
            Value::String(s) => Some(Self::Key(s.clone())),
            _ => None,
        }
    }

    /// The key as an attribute value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Index(i) => Value::from(*i),
            Self::Key(k) => Value::from(k.as_str()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(k) => write!(f, "[\"{k}\"]"),
        }
    }
}

/// Iteration variables visible to a block (`count`, `each`, dynamic
/// iterators), keyed by root name.
pub(crate) type Bindings = Arc<BTreeMap<String, Value>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_key_display() {
        assert_eq!(InstanceKey::Index(2).to_string(), "[2]");
        assert_eq!(InstanceKey::Key("a".to_string()).to_string(), "[\"a\"]");
    }

    #[test]
    fn test_instance_key_from_value() {
        assert_eq!(InstanceKey::from_value(&Value::Number(1.0)), Some(InstanceKey::Index(1)));
        assert_eq!(
            InstanceKey::from_value(&Value::from("x")),
            Some(InstanceKey::Key("x".to_string()))
        );
        assert_eq!(InstanceKey::from_value(&Value::Number(1.5)), None);
        assert_eq!(InstanceKey::from_value(&Value::Unresolved), None);
    }
}
