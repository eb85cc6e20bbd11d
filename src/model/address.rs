//! Block addresses and syntactic reference detection.

use super::InstanceKey;
use crate::error::ResolutionError;
use crate::value::Value;
use hcl::expr::TraversalOperator;
use hcl::Expression;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Roots that never name a block.
const SPECIAL_ROOTS: &[&str] = &["count", "each", "self", "path", "terraform"];

/// The address a reference expression points at.
///
/// A missing instance key means "every instance": unindexed references,
/// splats and indexes that cannot be evaluated statically all select the
/// full set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// `TYPE.NAME[key]`
    Resource {
        /// Resource type
        resource_type: String,
        /// Local name
        name: String,
        /// Selected instance
        key: Option<InstanceKey>,
    },
    /// `data.TYPE.NAME[key]`
    Data {
        /// Data source type
        data_type: String,
        /// Local name
        name: String,
        /// Selected instance
        key: Option<InstanceKey>,
    },
    /// `var.NAME`
    Variable {
        /// Variable name
        name: String,
    },
    /// `local.NAME`
    Local {
        /// Local value name
        name: String,
    },
    /// `module.NAME[key]`
    ModuleCall {
        /// Module call name
        name: String,
        /// Selected instance
        key: Option<InstanceKey>,
    },
    /// `module.NAME[key].OUTPUT`
    ModuleOutput {
        /// Module call name
        name: String,
        /// Selected instance
        key: Option<InstanceKey>,
        /// Output name
        output: String,
    },
}

impl Address {
    /// Parse a reference expression into an address.
    ///
    /// `index` evaluates instance index expressions such as `[count.index]`.
    /// Trailing attribute access (`.arn`, `.tags["Name"]`) is accepted and
    /// ignored, see [`Address::attribute_path`].
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if the expression is not a block address.
    pub fn from_expression(
        expr: &Expression,
        mut index: impl FnMut(&Expression) -> Value,
    ) -> Result<Self, ResolutionError> {
        let expr = unwrap_reference(expr);
        let malformed = || ResolutionError::MalformedAddress {
            expression: expr.to_string(),
        };

        let Expression::Traversal(traversal) = expr.as_ref() else {
            return Err(malformed());
        };
        let Expression::Variable(root) = &traversal.expr else {
            return Err(malformed());
        };
        let root = root.as_str();
        if SPECIAL_ROOTS.contains(&root) {
            return Err(malformed());
        }

        let mut ops = traversal.operators.iter().peekable();

        let address = match root {
            "var" => Self::Variable {
                name: next_name_from(&mut ops).ok_or_else(malformed)?,
            },
            "local" => Self::Local {
                name: next_name_from(&mut ops).ok_or_else(malformed)?,
            },
            "data" => {
                let data_type = next_name_from(&mut ops).ok_or_else(malformed)?;
                let name = next_name_from(&mut ops).ok_or_else(malformed)?;
                let key = instance_selector(&mut ops, &mut index);
                Self::Data { data_type, name, key }
            }
            "module" => {
                let name = next_name_from(&mut ops).ok_or_else(malformed)?;
                let key = instance_selector(&mut ops, &mut index);
                match next_name_from(&mut ops) {
                    Some(output) => Self::ModuleOutput { name, key, output },
                    None => Self::ModuleCall { name, key },
                }
            }
            resource_type => {
                let name = next_name_from(&mut ops).ok_or_else(malformed)?;
                let key = instance_selector(&mut ops, &mut index);
                Self::Resource {
                    resource_type: resource_type.to_string(),
                    name,
                    key,
                }
            }
        };
        Ok(address)
    }

    /// Parse an address from reference syntax, e.g. `data.aws_kms_key.k`.
    ///
    /// Index expressions must be constants.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if the text is not a block address.
    pub fn parse(text: &str) -> Result<Self, ResolutionError> {
        let expr = parse_expression(text).ok_or_else(|| ResolutionError::MalformedAddress {
            expression: text.to_string(),
        })?;
        Self::from_expression(&expr, crate::eval::evaluate_constant)
    }

    /// Block type and labels the address looks up, for block addresses.
    #[must_use]
    pub fn block_key(&self) -> Option<(&'static str, Vec<String>)> {
        match self {
            Self::Resource {
                resource_type,
                name,
                ..
            } => Some(("resource", vec![resource_type.clone(), name.clone()])),
            Self::Data { data_type, name, .. } => Some(("data", vec![data_type.clone(), name.clone()])),
            Self::ModuleCall { name, .. } | Self::ModuleOutput { name, .. } => {
                Some(("module", vec![name.clone()]))
            }
            Self::Variable { name } => Some(("variable", vec![name.clone()])),
            Self::Local { .. } => None,
        }
    }

    /// The selected instance key, if any.
    #[must_use]
    pub const fn key(&self) -> Option<&InstanceKey> {
        match self {
            Self::Resource { key, .. }
            | Self::Data { key, .. }
            | Self::ModuleCall { key, .. }
            | Self::ModuleOutput { key, .. } => key.as_ref(),
            Self::Variable { .. } | Self::Local { .. } => None,
        }
    }

    /// Attribute names accessed after the address in `expr`, e.g.
    /// `["arn"]` for `aws_kms_key.k.arn`.
    #[must_use]
    pub fn attribute_path(&self, expr: &Expression) -> Vec<String> {
        let expr = unwrap_reference(expr);
        let Expression::Traversal(traversal) = expr.as_ref() else {
            return Vec::new();
        };
        let skip = match self {
            Self::Data { .. } | Self::ModuleOutput { .. } => 2,
            _ => 1,
        };
        traversal
            .operators
            .iter()
            .filter(|op| matches!(op, TraversalOperator::GetAttr(_)))
            .skip(skip)
            .filter_map(|op| match op {
                TraversalOperator::GetAttr(name) => Some(name.as_str().to_string()),
                _ => None,
            })
            .collect()
    }
}

impl FromStr for Address {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = |key: &Option<InstanceKey>| key.as_ref().map(ToString::to_string).unwrap_or_default();
        match self {
            Self::Resource {
                resource_type,
                name,
                key: k,
            } => write!(f, "{resource_type}.{name}{}", key(k)),
            Self::Data {
                data_type,
                name,
                key: k,
            } => write!(f, "data.{data_type}.{name}{}", key(k)),
            Self::Variable { name } => write!(f, "var.{name}"),
            Self::Local { name } => write!(f, "local.{name}"),
            Self::ModuleCall { name, key: k } => write!(f, "module.{name}{}", key(k)),
            Self::ModuleOutput {
                name,
                key: k,
                output,
            } => write!(f, "module.{name}{}.{output}", key(k)),
        }
    }
}

fn next_name_from<'a>(
    ops: &mut std::iter::Peekable<impl Iterator<Item = &'a TraversalOperator>>,
) -> Option<String> {
    match ops.next() {
        Some(TraversalOperator::GetAttr(name)) => Some(name.as_str().to_string()),
        _ => None,
    }
}

/// Consume an instance index or splat following a block address.
fn instance_selector<'a>(
    ops: &mut std::iter::Peekable<impl Iterator<Item = &'a TraversalOperator>>,
    index: &mut impl FnMut(&Expression) -> Value,
) -> Option<InstanceKey> {
    match ops.peek() {
        Some(TraversalOperator::Index(expr)) => {
            let key = InstanceKey::from_value(&index(expr));
            ops.next();
            key
        }
        Some(TraversalOperator::LegacyIndex(i)) => {
            let key = usize::try_from(*i).ok().map(InstanceKey::Index);
            ops.next();
            key
        }
        Some(TraversalOperator::AttrSplat | TraversalOperator::FullSplat) => {
            ops.next();
            None
        }
        _ => None,
    }
}

/// Strip parentheses and single-interpolation templates (`"${x}"`).
pub(crate) fn unwrap_reference(expr: &Expression) -> Cow<'_, Expression> {
    match expr {
        Expression::Parenthesis(inner) => unwrap_reference(inner),
        Expression::TemplateExpr(template) => {
            use hcl::template::{Element, Template};

            let Ok(template) = Template::from_expr(template) else {
                return Cow::Borrowed(expr);
            };
            match template.elements() {
                [Element::Interpolation(interp)] => Cow::Owned(unwrap_reference(&interp.expr).into_owned()),
                _ => Cow::Borrowed(expr),
            }
        }
        _ => Cow::Borrowed(expr),
    }
}

/// True iff the expression names a block address: `var.x`, `local.x`,
/// `module.m...`, `data.t.n...` or `TYPE.NAME...`.
pub(crate) fn is_reference_expression(expr: &Expression) -> bool {
    let expr = unwrap_reference(expr);
    let Expression::Traversal(traversal) = expr.as_ref() else {
        return false;
    };
    let Expression::Variable(root) = &traversal.expr else {
        return false;
    };
    let root = root.as_str();
    if SPECIAL_ROOTS.contains(&root) {
        return false;
    }

    let names = traversal
        .operators
        .iter()
        .take_while(|op| matches!(op, TraversalOperator::GetAttr(_)))
        .count();
    let required = if root == "data" { 2 } else { 1 };
    names >= required
}

/// Root identifier of a traversal (`var`, `data`, `aws_kms_key`, ...).
pub(crate) fn reference_root(expr: &Expression) -> Option<String> {
    let expr = unwrap_reference(expr);
    let Expression::Traversal(traversal) = expr.as_ref() else {
        return None;
    };
    let Expression::Variable(root) = &traversal.expr else {
        return None;
    };
    Some(root.as_str().to_string())
}

/// Parse a standalone expression.
pub(crate) fn parse_expression(text: &str) -> Option<Expression> {
    let body: hcl::Body = hcl::from_str(&format!("expr = {text}\n")).ok()?;
    body.attributes().next().map(|attr| attr.expr.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("aws_kms_key.k.arn", "aws_kms_key.k" ; "resource")]
    #[test_case("aws_kms_key.k[0].arn", "aws_kms_key.k[0]" ; "indexed resource")]
    #[test_case("aws_kms_key.k[\"a\"]", "aws_kms_key.k[\"a\"]" ; "keyed resource")]
    #[test_case("aws_kms_key.k[*].arn", "aws_kms_key.k" ; "splat")]
    #[test_case("data.aws_kms_key.k.key_id", "data.aws_kms_key.k" ; "data source")]
    #[test_case("var.key", "var.key" ; "variable")]
    #[test_case("local.key", "local.key" ; "local")]
    #[test_case("module.keys", "module.keys" ; "module call")]
    #[test_case("module.keys[1].arn", "module.keys[1].arn" ; "module output")]
    #[test_case("\"${var.key}\"", "var.key" ; "interpolation")]
    #[test_case("(var.key)", "var.key" ; "parenthesis")]
    fn test_parse_address(text: &str, expected: &str) {
        let address = Address::parse(text).unwrap();
        assert_eq!(address.to_string(), expected);
    }

    #[test_case("count.index" ; "count")]
    #[test_case("each.value" ; "each")]
    #[test_case("path.module" ; "path")]
    #[test_case("\"alias/aws/ebs\"" ; "literal")]
    #[test_case("upper(var.key)" ; "function call")]
    #[test_case("var" ; "bare root")]
    #[test_case("data.aws_kms_key" ; "incomplete data")]
    fn test_parse_malformed(text: &str) {
        let err = Address::parse(text).unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedAddress { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_index_uses_evaluator() {
        let expr = parse_expression("aws_kms_key.k[count.index].arn").unwrap();
        let address = Address::from_expression(&expr, |_| Value::Number(3.0)).unwrap();
        assert_eq!(address.key(), Some(&InstanceKey::Index(3)));

        let address = Address::from_expression(&expr, |_| Value::Unresolved).unwrap();
        assert_eq!(address.key(), None);
    }

    #[test]
    fn test_block_key_and_attribute_path() {
        let expr = parse_expression("data.aws_kms_key.k.tags.Name").unwrap();
        let address = Address::from_expression(&expr, crate::eval::evaluate_constant).unwrap();
        assert_eq!(
            address.block_key(),
            Some(("data", vec!["aws_kms_key".to_string(), "k".to_string()]))
        );
        assert_eq!(address.attribute_path(&expr), vec!["tags", "Name"]);
    }

    #[test]
    fn test_is_reference_expression() {
        let check = |text: &str| is_reference_expression(&parse_expression(text).unwrap());
        assert!(check("aws_s3_bucket.b.id"));
        assert!(check("module.m.out"));
        assert!(!check("data.aws_kms_key"));
        assert!(!check("each.value.id"));
        assert!(!check("true"));
        assert!(!check("[var.a]"));
    }
}
