//! Statically evaluated attribute values.
//!
//! A [`Value`] is what the evaluator produces for an expression. The
//! `Unresolved` variant is the conservative "cannot determine statically"
//! result: it never compares equal to anything (itself included), and every
//! helper treats it as "cannot prove", never as an error.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A statically evaluated configuration value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicit `null`
    Nil,
    /// Boolean
    Bool(bool),
    /// Number (HCL numbers are arbitrary precision, we keep `f64`)
    Number(f64),
    /// String
    String(String),
    /// Tuple, list or set
    List(Vec<Value>),
    /// Object or map, ordered by key
    Map(BTreeMap<String, Value>),
    /// Could not be reduced statically
    Unresolved,
}

impl Value {
    /// True for an explicit `null`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// True if this value could not be determined.
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    /// True if this value is known at the top level.
    ///
    /// Collections may still contain unresolved elements, see
    /// [`Value::is_fully_resolved`].
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !self.is_unresolved()
    }

    /// True if neither this value nor any nested element is unresolved.
    #[must_use]
    pub fn is_fully_resolved(&self) -> bool {
        match self {
            Self::Unresolved => false,
            Self::List(items) => items.iter().all(Self::is_fully_resolved),
            Self::Map(map) => map.values().all(Self::is_fully_resolved),
            _ => true,
        }
    }

    /// Three-valued truthiness.
    ///
    /// Empty strings, zero, empty collections, `"false"` and `null` are
    /// falsy. Returns `None` when the value is unresolved.
    #[must_use]
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            Self::Unresolved => None,
            Self::Nil => Some(false),
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::String(s) => {
                let s = s.trim();
                Some(!(s.is_empty() || s.eq_ignore_ascii_case("false")))
            }
            Self::List(items) => Some(!items.is_empty()),
            Self::Map(map) => Some(!map.is_empty()),
        }
    }

    /// Truthiness where unresolved counts as false.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        self.truthiness().unwrap_or(false)
    }

    /// Borrow the string payload, without conversion.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a primitive to its string form, the way HCL converts
    /// numbers and booleans to strings.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert to a number; numeric strings are accepted.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to a boolean; `"true"`/`"false"` strings are accepted.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) if s == "true" => Some(true),
            Self::String(s) if s == "false" => Some(false),
            _ => None,
        }
    }

    /// Borrow the elements of a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the entries of a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Length of a string (in characters), list or map.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::List(items) => Some(items.len()),
            Self::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// True for empty strings and collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Look up a key in a map. Anything else yields `Unresolved`.
    #[must_use]
    pub fn get(&self, key: &str) -> Self {
        match self {
            Self::Map(map) => map.get(key).cloned().unwrap_or(Self::Unresolved),
            _ => Self::Unresolved,
        }
    }

    /// Index into a list (by number) or a map (by key).
    #[must_use]
    pub fn index(&self, key: &Self) -> Self {
        match (self, key) {
            (Self::List(items), k) => k
                .as_number()
                .filter(|n| n.fract() == 0.0 && *n >= 0.0)
                .and_then(|n| items.get(n as usize).cloned())
                .unwrap_or(Self::Unresolved),
            (Self::Map(_), k) => k.as_string().map_or(Self::Unresolved, |k| self.get(&k)),
            _ => Self::Unresolved,
        }
    }

    /// Structural equality. `Unresolved` never equals anything, itself
    /// included, and equality is type-strict (`"1"` is not `1`).
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            _ => false,
        }
    }

    /// Structural identity where two `Unresolved` values are identical.
    ///
    /// Used to check that repeated evaluation produces the same result.
    #[must_use]
    pub fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unresolved, Self::Unresolved) => true,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va.identical(vb))
            }
            _ => self.equals(other),
        }
    }

    /// String prefix test. Non-strings and unresolved values yield false.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.as_str().is_some_and(|s| s.starts_with(prefix))
    }

    /// String suffix test. Non-strings and unresolved values yield false.
    #[must_use]
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.as_str().is_some_and(|s| s.ends_with(suffix))
    }

    /// Substring test for strings, membership test for lists.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            Self::String(s) => s.contains(needle),
            Self::List(items) => items.iter().any(|v| v.as_str() == Some(needle)),
            Self::Map(map) => map.contains_key(needle),
            _ => false,
        }
    }

    /// Short type name used in log messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Unresolved => "unresolved",
        }
    }

    /// Convert to JSON. Fails (`None`) if any part is unresolved.
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        if !self.is_fully_resolved() {
            return None;
        }
        serde_json::to_value(self).ok()
    }

    /// Convert a decoded JSON document into a value.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Unresolved, Self::Number),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

/// Render a number without a trailing `.0` for integral values.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
            Self::Unresolved => write!(f, "(unresolved)"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<&hcl::Value> for Value {
    fn from(value: &hcl::Value) -> Self {
        match value {
            hcl::Value::Null => Self::Nil,
            hcl::Value::Bool(b) => Self::Bool(*b),
            hcl::Value::Number(n) => n.as_f64().map_or(Self::Unresolved, Self::Number),
            hcl::Value::String(s) => Self::String(s.clone()),
            hcl::Value::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            hcl::Value::Object(map) => {
                Self::Map(map.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect())
            }
        }
    }
}

impl From<&serde_yaml::Value> for Value {
    fn from(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Nil,
            serde_yaml::Value::Bool(b) => Self::Bool(*b),
            serde_yaml::Value::Number(n) => n.as_f64().map_or(Self::Unresolved, Self::Number),
            serde_yaml::Value::String(s) => Self::String(s.clone()),
            serde_yaml::Value::Sequence(items) => Self::List(items.iter().map(Self::from).collect()),
            serde_yaml::Value::Mapping(map) => Self::Map(
                map.iter()
                    .filter_map(|(k, v)| {
                        let key = match k {
                            serde_yaml::Value::String(s) => s.clone(),
                            other => Self::from(other).as_string()?,
                        };
                        Some((key, Self::from(v)))
                    })
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Self::from(&tagged.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect())
    }

    #[test_case(Value::Bool(true), Some(true) ; "true bool")]
    #[test_case(Value::Bool(false), Some(false) ; "false bool")]
    #[test_case(Value::Number(0.0), Some(false) ; "zero")]
    #[test_case(Value::Number(3.0), Some(true) ; "non zero")]
    #[test_case(Value::from(""), Some(false) ; "empty string")]
    #[test_case(Value::from("false"), Some(false) ; "false string")]
    #[test_case(Value::from("yes"), Some(true) ; "non empty string")]
    #[test_case(Value::List(vec![]), Some(false) ; "empty list")]
    #[test_case(Value::List(vec![Value::Nil]), Some(true) ; "non empty list")]
    #[test_case(Value::Nil, Some(false) ; "null")]
    #[test_case(Value::Unresolved, None ; "unresolved")]
    fn test_truthiness(value: Value, expected: Option<bool>) {
        assert_eq!(value.truthiness(), expected);
        assert_eq!(value.is_truthy(), expected.unwrap_or(false));
    }

    #[test]
    fn test_unresolved_never_equal() {
        assert!(!Value::Unresolved.equals(&Value::Unresolved));
        assert_ne!(Value::Unresolved, Value::Unresolved);
        assert!(!Value::Unresolved.equals(&Value::Nil));
        assert!(Value::Unresolved.identical(&Value::Unresolved));
    }

    #[test]
    fn test_structural_equality() {
        let a = map(&[("Name", Value::from("web")), ("count", Value::from(2_i64))]);
        let b = map(&[("count", Value::from(2_i64)), ("Name", Value::from("web"))]);
        assert_eq!(a, b);

        let with_unknown = Value::List(vec![Value::from("x"), Value::Unresolved]);
        assert!(!with_unknown.equals(&with_unknown.clone()));
        assert!(with_unknown.identical(&with_unknown.clone()));
    }

    #[test]
    fn test_equality_is_type_strict() {
        assert!(!Value::from("1").equals(&Value::from(1_i64)));
        assert!(!Value::from("true").equals(&Value::Bool(true)));
    }

    #[test]
    fn test_starts_with_is_safe() {
        assert!(Value::from("alias/aws/ebs").starts_with("alias/aws/"));
        assert!(!Value::from("arn:aws:kms:key").starts_with("alias/aws/"));
        assert!(!Value::Unresolved.starts_with("alias/aws/"));
        assert!(!Value::Number(1.0).starts_with("1"));
        assert!(!Value::Nil.starts_with(""));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::Number(40.0).as_string().as_deref(), Some("40"));
        assert_eq!(Value::Number(1.5).as_string().as_deref(), Some("1.5"));
        assert_eq!(Value::from(" 12 ").as_number(), Some(12.0));
        assert_eq!(Value::from("true").as_bool(), Some(true));
        assert_eq!(Value::Unresolved.as_string(), None);
        assert_eq!(Value::List(vec![Value::Nil]).as_list().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_index_and_get() {
        let list = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(list.index(&Value::from(1_i64)), Value::from("b"));
        assert!(list.index(&Value::from(5_i64)).is_unresolved());

        let tags = map(&[("Name", Value::from("web"))]);
        assert_eq!(tags.get("Name"), Value::from("web"));
        assert!(tags.get("Missing").is_unresolved());
        assert!(Value::Unresolved.get("Name").is_unresolved());
    }

    #[test]
    fn test_to_json_requires_full_resolution() {
        let value = map(&[("a", Value::from(1_i64)), ("b", Value::Nil)]);
        assert_eq!(
            value.to_json(),
            Some(serde_json::json!({"a": 1.0, "b": null}))
        );
        assert!(Value::List(vec![Value::Unresolved]).to_json().is_none());
    }

    #[test]
    fn test_from_yaml() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("a: [1, two]\nb: true").unwrap();
        let value = Value::from(&yaml);
        assert_eq!(
            value,
            map(&[
                ("a", Value::List(vec![Value::from(1.0), Value::from("two")])),
                ("b", Value::Bool(true)),
            ])
        );
    }
}
