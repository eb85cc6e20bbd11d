//! Pure built-in functions.
//!
//! Functions whose result depends on the environment (`timestamp`, `uuid`,
//! `file`, ...) are not listed and evaluate to `Unresolved`, as does any
//! call with an unresolved argument unless the function is marked lenient.

use crate::value::{format_number, Value};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use std::collections::BTreeMap;

/// Upper bound for `range()` results.
const MAX_RANGE: usize = 10_000;

/// Functions that see unresolved arguments instead of short-circuiting.
const LENIENT: &[&str] = &["try", "can", "length", "concat", "tolist", "coalesce"];

const KNOWN: &[&str] = &[
    "abs", "base64decode", "base64encode", "can", "ceil", "coalesce", "coalescelist", "compact",
    "concat", "contains", "distinct", "element", "endswith", "flatten", "floor", "format", "index",
    "join", "jsondecode", "jsonencode", "keys", "length", "lookup", "lower", "max", "merge", "min",
    "one", "range", "regex", "replace", "reverse", "signum", "slice", "sort", "split", "startswith",
    "strrev", "substr", "title", "tobool", "tolist", "tomap", "tonumber", "toset", "tostring", "trim",
    "trimprefix", "trimspace", "trimsuffix", "try", "upper", "values", "zipmap",
];

/// True if `name` is a function the evaluator can compute statically.
#[must_use]
pub fn is_known_function(name: &str) -> bool {
    KNOWN.contains(&name)
}

/// Call a function on evaluated arguments.
pub(super) fn call(name: &str, args: Vec<Value>) -> Value {
    if !is_known_function(name) {
        tracing::trace!(function = name, "Function is not evaluated statically");
        return Value::Unresolved;
    }
    if !LENIENT.contains(&name) && !args.iter().all(Value::is_fully_resolved) {
        return Value::Unresolved;
    }
    dispatch(name, args).unwrap_or(Value::Unresolved)
}

fn dispatch(name: &str, args: Vec<Value>) -> Option<Value> {
    let value = match (name, args.as_slice()) {
        // Lenient functions
        ("try", _) => args.iter().find(|v| v.is_fully_resolved())?.clone(),
        ("can", [arg]) => {
            if arg.is_fully_resolved() {
                Value::Bool(true)
            } else {
                return None;
            }
        }
        ("length", [arg]) => Value::from(arg.len()?),
        ("concat", _) => {
            let mut out = Vec::new();
            for arg in &args {
                out.extend_from_slice(arg.as_list()?);
            }
            Value::List(out)
        }
        ("tolist", [Value::List(items)]) => Value::List(items.clone()),
        ("coalesce", _) => {
            for arg in &args {
                match arg {
                    Value::Unresolved => return None,
                    Value::Nil => {}
                    Value::String(s) if s.is_empty() => {}
                    other => return Some(other.clone()),
                }
            }
            return None;
        }

        // Strings
        ("lower", [s]) => Value::String(s.as_string()?.to_lowercase()),
        ("upper", [s]) => Value::String(s.as_string()?.to_uppercase()),
        ("title", [s]) => Value::String(title(&s.as_string()?)),
        ("trimspace", [s]) => Value::String(s.as_string()?.trim().to_string()),
        ("trim", [s, cut]) => {
            let cut: Vec<char> = cut.as_string()?.chars().collect();
            Value::String(s.as_string()?.trim_matches(cut.as_slice()).to_string())
        }
        ("trimprefix", [s, prefix]) => {
            let s = s.as_string()?;
            let prefix = prefix.as_string()?;
            Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(s.as_str()).to_string())
        }
        ("trimsuffix", [s, suffix]) => {
            let s = s.as_string()?;
            let suffix = suffix.as_string()?;
            Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(s.as_str()).to_string())
        }
        ("replace", [s, search, replacement]) => {
            let (s, search, replacement) = (s.as_string()?, search.as_string()?, replacement.as_string()?);
            match search.strip_prefix('/').and_then(|p| p.strip_suffix('/')) {
                Some(pattern) if !pattern.is_empty() => {
                    let re = Regex::new(pattern).ok()?;
                    Value::String(re.replace_all(&s, replacement.as_str()).into_owned())
                }
                _ => Value::String(s.replace(&search, &replacement)),
            }
        }
        ("split", [sep, s]) => {
            let (sep, s) = (sep.as_string()?, s.as_string()?);
            if s.is_empty() {
                Value::List(Vec::new())
            } else {
                Value::List(s.split(sep.as_str()).map(Value::from).collect())
            }
        }
        ("join", [sep, _, ..]) => {
            let sep = sep.as_string()?;
            let mut parts = Vec::new();
            for list in &args[1..] {
                for item in list.as_list()? {
                    parts.push(item.as_string()?);
                }
            }
            Value::String(parts.join(&sep))
        }
        ("format", [spec, rest @ ..]) => Value::String(format(&spec.as_string()?, rest)?),
        ("substr", [s, offset, length]) => {
            let chars: Vec<char> = s.as_string()?.chars().collect();
            let offset = offset.as_number()?;
            let length = length.as_number()?;
            let start = if offset < 0.0 {
                chars.len().checked_sub(offset.abs() as usize)?
            } else {
                (offset as usize).min(chars.len())
            };
            let end = if length < 0.0 {
                chars.len()
            } else {
                start.saturating_add(length as usize).min(chars.len())
            };
            Value::String(chars[start..end].iter().collect())
        }
        ("strrev", [s]) => Value::String(s.as_string()?.chars().rev().collect()),
        ("startswith", [s, prefix]) => Value::Bool(s.as_string()?.starts_with(&prefix.as_string()?)),
        ("endswith", [s, suffix]) => Value::Bool(s.as_string()?.ends_with(&suffix.as_string()?)),
        ("regex", [pattern, s]) => {
            let re = Regex::new(&pattern.as_string()?).ok()?;
            let s = s.as_string()?;
            let captures = re.captures(&s)?;
            match re.captures_len() {
                1 => Value::from(captures.get(0)?.as_str()),
                _ if re.capture_names().flatten().next().is_some() => Value::Map(
                    re.capture_names()
                        .flatten()
                        .map(|n| (n.to_string(), captures.name(n).map_or(Value::Nil, |m| Value::from(m.as_str()))))
                        .collect(),
                ),
                _ => Value::List(
                    captures
                        .iter()
                        .skip(1)
                        .map(|m| m.map_or(Value::Nil, |m| Value::from(m.as_str())))
                        .collect(),
                ),
            }
        }

        // Collections
        ("merge", _) => {
            let mut out = BTreeMap::new();
            for arg in &args {
                match arg {
                    Value::Nil => {}
                    other => out.extend(other.as_map()?.clone()),
                }
            }
            Value::Map(out)
        }
        ("lookup", [map, key, default @ ..]) => {
            let key = key.as_string()?;
            match map.as_map()?.get(&key) {
                Some(found) => found.clone(),
                None => default.first()?.clone(),
            }
        }
        ("element", [list, index]) => {
            let items = list.as_list()?;
            if items.is_empty() {
                return None;
            }
            let index = index.as_number().filter(|n| *n >= 0.0 && n.fract() == 0.0)?;
            items[(index % items.len() as f64) as usize].clone()
        }
        ("index", [list, needle]) => {
            let position = list.as_list()?.iter().position(|v| v.equals(needle))?;
            Value::from(position)
        }
        ("contains", [list, needle]) => Value::Bool(list.as_list()?.iter().any(|v| v.equals(needle))),
        ("keys", [map]) => Value::List(map.as_map()?.keys().map(|k| Value::from(k.as_str())).collect()),
        ("values", [map]) => Value::List(map.as_map()?.values().cloned().collect()),
        ("flatten", [list]) => Value::List(flatten(list.as_list()?)),
        ("distinct" | "toset", [list]) => Value::List(distinct(list.as_list()?)),
        ("compact", [list]) => Value::List(
            list.as_list()?
                .iter()
                .filter(|v| !v.is_nil() && v.as_str() != Some(""))
                .cloned()
                .collect(),
        ),
        ("reverse", [list]) => Value::List(list.as_list()?.iter().rev().cloned().collect()),
        ("sort", [list]) => {
            let mut items = list
                .as_list()?
                .iter()
                .map(Value::as_string)
                .collect::<Option<Vec<_>>>()?;
            items.sort();
            Value::List(items.into_iter().map(Value::from).collect())
        }
        ("slice", [list, start, end]) => {
            let items = list.as_list()?;
            let (start, end) = (list_index(start)?, list_index(end)?);
            if start > end || end > items.len() {
                return None;
            }
            Value::List(items[start..end].to_vec())
        }
        ("range", bounds) => Value::List(range(bounds)?),
        ("zipmap", [keys, values]) => {
            let (keys, values) = (keys.as_list()?, values.as_list()?);
            if keys.len() != values.len() {
                return None;
            }
            let mut out = BTreeMap::new();
            for (k, v) in keys.iter().zip(values) {
                out.insert(k.as_string()?, v.clone());
            }
            Value::Map(out)
        }
        ("coalescelist", _) => args
            .iter()
            .find(|v| v.as_list().is_some_and(|l| !l.is_empty()))?
            .clone(),
        ("one", [list]) => match list.as_list()? {
            [] => Value::Nil,
            [only] => only.clone(),
            _ => return None,
        },

        // Conversions
        ("tostring", [v]) => match v {
            Value::Nil => Value::Nil,
            other => Value::String(other.as_string()?),
        },
        ("tonumber", [v]) => match v {
            Value::Nil => Value::Nil,
            other => Value::Number(other.as_number()?),
        },
        ("tobool", [v]) => match v {
            Value::Nil => Value::Nil,
            other => Value::Bool(other.as_bool()?),
        },
        ("tomap", [map @ Value::Map(_)]) => map.clone(),

        // Numbers
        ("min", _) => Value::Number(numbers(&args)?.into_iter().reduce(f64::min)?),
        ("max", _) => Value::Number(numbers(&args)?.into_iter().reduce(f64::max)?),
        ("abs", [n]) => Value::Number(n.as_number()?.abs()),
        ("ceil", [n]) => Value::Number(n.as_number()?.ceil()),
        ("floor", [n]) => Value::Number(n.as_number()?.floor()),
        ("signum", [n]) => {
            let n = n.as_number()?;
            Value::Number(if n == 0.0 { 0.0 } else { n.signum() })
        }

        // Encoding
        ("jsonencode", [v]) => Value::String(serde_json::to_string(&json(v)?).ok()?),
        ("jsondecode", [s]) => {
            let decoded: serde_json::Value = serde_json::from_str(&s.as_string()?).ok()?;
            Value::from_json(&decoded)
        }
        ("base64encode", [s]) => Value::String(STANDARD.encode(s.as_string()?)),
        ("base64decode", [s]) => {
            let bytes = STANDARD.decode(s.as_string()?).ok()?;
            Value::String(String::from_utf8(bytes).ok()?)
        }
        _ => return None,
    };
    Some(value)
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if boundary && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        boundary = !c.is_alphanumeric();
    }
    out
}

/// `format` with the verbs Terraform configurations use in practice.
fn format(spec: &str, args: &[Value]) -> Option<String> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = spec.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '%' => out.push('%'),
            's' | 'v' => out.push_str(&args.next()?.as_string()?),
            'd' => {
                let n = args.next()?.as_number()?;
                out.push_str(&format_number(n.trunc()));
            }
            'q' => out.push_str(&format!("{:?}", args.next()?.as_string()?)),
            _ => return None,
        }
    }
    Some(out)
}

fn flatten(items: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::List(nested) => out.extend(flatten(nested)),
            other => out.push(other.clone()),
        }
    }
    out
}

fn distinct(items: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| seen.equals(item)) {
            out.push(item.clone());
        }
    }
    out
}

fn range(bounds: &[Value]) -> Option<Vec<Value>> {
    let numbers = numbers(bounds)?;
    let (start, end, step) = match numbers.as_slice() {
        [end] => (0.0, *end, 1.0),
        [start, end] => (*start, *end, if start <= end { 1.0 } else { -1.0 }),
        [start, end, step] if *step != 0.0 => (*start, *end, *step),
        _ => return None,
    };

    let mut out = Vec::new();
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        if out.len() >= MAX_RANGE {
            return None;
        }
        out.push(Value::Number(current));
        current += step;
    }
    Some(out)
}

/// A whole, non-negative number usable as a list position.
fn list_index(value: &Value) -> Option<usize> {
    let n = value.as_number()?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// Numeric arguments, with a single list argument expanded.
fn numbers(args: &[Value]) -> Option<Vec<f64>> {
    let args = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    args.iter().map(Value::as_number).collect()
}

/// JSON form where integral numbers stay integers.
fn json(value: &Value) -> Option<serde_json::Value> {
    Some(match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => serde_json::Value::from(*n as i64),
        Value::Number(n) => serde_json::Value::from(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(json).collect::<Option<_>>()?),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Some((k.clone(), json(v)?)))
                .collect::<Option<_>>()?,
        ),
        Value::Unresolved => return None,
    })
}
