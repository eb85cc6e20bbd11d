//! Static expression evaluation.
//!
//! The evaluator reduces raw HCL expressions to [`Value`]s. It is
//! conservative: anything it cannot decide (computed attributes, impure
//! functions, unknown inputs, reference cycles) becomes
//! [`Value::Unresolved`], and `Unresolved` propagates through every
//! operation except where the outcome is decided regardless of it
//! (`false && x`, `true || x`).
//!
//! Evaluation of block attributes is guarded by a stack of
//! `(block, attribute)` pairs: re-entering a pair breaks the cycle with
//! `Unresolved`. Values computed while a cycle was broken are not memoized,
//! so evaluating the same attribute again gives the same answer.

mod functions;

pub use functions::is_known_function;

use crate::model::{Block, BlockId, InstanceKey, Module, ModuleId, ModuleTree};
use crate::value::Value;
use hcl::expr::{BinaryOperator, ObjectKey, Operation, TraversalOperator, UnaryOperator};
use hcl::template::{Element, Template};
use hcl::Expression;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Evaluate an expression that may not reference anything, such as a
/// `.tfvars` value or an index literal.
#[must_use]
pub fn evaluate_constant(expr: &Expression) -> Value {
    Evaluator::constant().evaluate(expr, &Scope::default())
}

/// Names visible to an expression besides block references.
///
/// Holds the module the expression belongs to, the block for `self`, the
/// block's iteration bindings (`count`, `each`, dynamic iterators) and any
/// `for` expression variables.
#[derive(Debug, Clone, Default)]
pub struct Scope<'s> {
    module: Option<ModuleId>,
    self_block: Option<&'s Block>,
    bindings: Arc<BTreeMap<String, Value>>,
    locals: Vec<(String, Value)>,
}

impl<'s> Scope<'s> {
    /// Scope of a module without iteration bindings.
    #[must_use]
    pub fn module(module: ModuleId) -> Self {
        Self {
            module: Some(module),
            ..Self::default()
        }
    }

    /// Scope of an attribute of `block`.
    #[must_use]
    pub fn for_block(block: &'s Block) -> Self {
        Self {
            module: Some(block.module_id()),
            self_block: Some(block),
            bindings: Arc::clone(block.bindings()),
            locals: Vec::new(),
        }
    }

    /// Replace the iteration bindings.
    #[must_use]
    pub fn with_bindings(mut self, bindings: Arc<BTreeMap<String, Value>>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Add a `for` expression variable.
    #[must_use]
    pub fn with_local(mut self, name: &str, value: Value) -> Self {
        self.locals.push((name.to_string(), value));
        self
    }

    /// The module the expression belongs to.
    #[must_use]
    pub const fn module_id(&self) -> Option<ModuleId> {
        self.module
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.bindings.get(name))
    }
}

#[derive(Debug, Default)]
struct EvalState {
    visiting: HashSet<(BlockId, String)>,
    depth: usize,
    cycles: usize,
}

/// Evaluates expressions against a module tree.
///
/// Obtain one with [`ModuleTree::evaluator`]. The evaluator itself holds
/// no mutable state; it is cheap to create and safe to share.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'t> {
    tree: Option<&'t ModuleTree>,
    max_depth: usize,
    max_instances: usize,
}

impl<'t> Evaluator<'t> {
    /// An evaluator resolving references in `tree`.
    #[must_use]
    pub fn new(tree: &'t ModuleTree) -> Self {
        Self {
            tree: Some(tree),
            max_depth: tree.max_depth,
            max_instances: tree.max_instances,
        }
    }

    /// An evaluator without a tree: every reference is `Unresolved`.
    #[must_use]
    pub const fn constant() -> Self {
        Self {
            tree: None,
            max_depth: 64,
            max_instances: 1000,
        }
    }

    /// Evaluate an expression in a scope.
    #[must_use]
    pub fn evaluate(&self, expr: &Expression, scope: &Scope<'_>) -> Value {
        let mut state = EvalState::default();
        self.eval(expr, scope, &mut state)
    }

    /// Evaluate an attribute of a block, memoizing the result on the block.
    #[must_use]
    pub fn attribute_value(&self, block: &Block, name: &str) -> Value {
        let mut state = EvalState::default();
        self.attribute(block, name, &mut state)
    }

    fn attribute(&self, block: &Block, name: &str, state: &mut EvalState) -> Value {
        if let Some(value) = block.memoized(name) {
            return value;
        }
        let Some(attr) = block.get_attribute(name) else {
            return Value::Unresolved;
        };

        let key = (block.id(), name.to_string());
        if state.visiting.contains(&key) {
            tracing::trace!(block = %block.qualified_address(), attribute = name, "Breaking evaluation cycle");
            state.cycles += 1;
            return Value::Unresolved;
        }
        if state.depth >= self.max_depth {
            tracing::trace!(block = %block.qualified_address(), attribute = name, "Evaluation depth exceeded");
            state.cycles += 1;
            return Value::Unresolved;
        }

        let cycles_before = state.cycles;
        state.visiting.insert(key.clone());
        state.depth += 1;
        let value = self.eval(attr.expr(), &Scope::for_block(block), state);
        state.depth -= 1;
        state.visiting.remove(&key);

        if state.cycles == cycles_before {
            block.memoize(name, value)
        } else {
            value
        }
    }

    fn eval(&self, expr: &Expression, scope: &Scope<'_>, state: &mut EvalState) -> Value {
        match expr {
            Expression::Null => Value::Nil,
            Expression::Bool(b) => Value::Bool(*b),
            Expression::Number(n) => n.as_f64().map_or(Value::Unresolved, Value::Number),
            Expression::String(s) => Value::String(s.clone()),
            Expression::Array(items) => {
                Value::List(items.iter().map(|e| self.eval(e, scope, state)).collect())
            }
            Expression::Object(object) => {
                let mut map = BTreeMap::new();
                for (key, value) in object {
                    let key = match key {
                        ObjectKey::Identifier(ident) => ident.as_str().to_string(),
                        ObjectKey::Expression(expr) => match self.eval(expr, scope, state).as_string() {
                            Some(key) => key,
                            None => return Value::Unresolved,
                        },
                        #[allow(unreachable_patterns)]
                        _ => return Value::Unresolved,
                    };
                    map.insert(key, self.eval(value, scope, state));
                }
                Value::Map(map)
            }
            Expression::TemplateExpr(template) => match Template::from_expr(template) {
                Ok(template) => self.template(&template, scope, state),
                Err(_) => Value::Unresolved,
            },
            Expression::Variable(var) => scope.lookup(var.as_str()).cloned().unwrap_or(Value::Unresolved),
            Expression::Traversal(traversal) => {
                self.traversal(&traversal.expr, &traversal.operators, scope, state)
            }
            Expression::FuncCall(call) => {
                let name = call.name.to_string();
                let mut args: Vec<Value> = call.args.iter().map(|e| self.eval(e, scope, state)).collect();
                if call.expand_final {
                    match args.pop() {
                        Some(Value::List(rest)) => args.extend(rest),
                        _ => return Value::Unresolved,
                    }
                }
                functions::call(&name, args)
            }
            Expression::Parenthesis(inner) => self.eval(inner, scope, state),
            Expression::Conditional(cond) => match self.eval(&cond.cond_expr, scope, state).as_bool() {
                Some(true) => self.eval(&cond.true_expr, scope, state),
                Some(false) => self.eval(&cond.false_expr, scope, state),
                None => Value::Unresolved,
            },
            Expression::Operation(op) => self.operation(op, scope, state),
            Expression::ForExpr(for_expr) => self.for_expr(for_expr, scope, state),
            #[allow(unreachable_patterns)]
            _ => Value::Unresolved,
        }
    }

    fn template(&self, template: &Template, scope: &Scope<'_>, state: &mut EvalState) -> Value {
        // "${x}" keeps the type of x.
        if let [Element::Interpolation(interp)] = template.elements() {
            return self.eval(&interp.expr, scope, state);
        }

        let mut out = String::new();
        for element in template.elements() {
            match element {
                Element::Literal(s) => out.push_str(s),
                Element::Interpolation(interp) => {
                    match self.eval(&interp.expr, scope, state).as_string() {
                        Some(s) => out.push_str(&s),
                        None => return Value::Unresolved,
                    }
                }
                Element::Directive(_) => return Value::Unresolved,
            }
        }
        Value::String(out)
    }

    fn operation(&self, op: &Operation, scope: &Scope<'_>, state: &mut EvalState) -> Value {
        match op {
            Operation::Unary(unary) => {
                let value = self.eval(&unary.expr, scope, state);
                match unary.operator {
                    UnaryOperator::Not => value.as_bool().map_or(Value::Unresolved, |b| Value::Bool(!b)),
                    UnaryOperator::Neg => value.as_number().map_or(Value::Unresolved, |n| Value::Number(-n)),
                    #[allow(unreachable_patterns)]
                    _ => Value::Unresolved,
                }
            }
            Operation::Binary(binary) => {
                let lhs = self.eval(&binary.lhs_expr, scope, state);
                match binary.operator {
                    BinaryOperator::And if lhs.as_bool() == Some(false) => return Value::Bool(false),
                    BinaryOperator::Or if lhs.as_bool() == Some(true) => return Value::Bool(true),
                    _ => {}
                }
                let rhs = self.eval(&binary.rhs_expr, scope, state);
                binary_op(binary.operator, &lhs, &rhs)
            }
            #[allow(unreachable_patterns)]
            _ => Value::Unresolved,
        }
    }

    fn for_expr(&self, for_expr: &hcl::expr::ForExpr, scope: &Scope<'_>, state: &mut EvalState) -> Value {
        let Some(entries) = iteration_entries(&self.eval(&for_expr.collection_expr, scope, state)) else {
            return Value::Unresolved;
        };
        if entries.len() > self.max_instances {
            return Value::Unresolved;
        }

        let mut list = Vec::new();
        let mut map: BTreeMap<String, Value> = BTreeMap::new();

        for (key, value) in entries {
            let mut inner = scope.clone().with_local(for_expr.value_var.as_str(), value);
            if let Some(key_var) = &for_expr.key_var {
                inner = inner.with_local(key_var.as_str(), key);
            }

            if let Some(cond) = &for_expr.cond_expr {
                match self.eval(cond, &inner, state).as_bool() {
                    Some(true) => {}
                    Some(false) => continue,
                    None => return Value::Unresolved,
                }
            }

            let value = self.eval(&for_expr.value_expr, &inner, state);
            match &for_expr.key_expr {
                Some(key_expr) => {
                    let Some(key) = self.eval(key_expr, &inner, state).as_string() else {
                        return Value::Unresolved;
                    };
                    if for_expr.grouping {
                        match map.entry(key).or_insert_with(|| Value::List(Vec::new())) {
                            Value::List(group) => group.push(value),
                            _ => return Value::Unresolved,
                        }
                    } else {
                        map.insert(key, value);
                    }
                }
                None => list.push(value),
            }
        }

        if for_expr.key_expr.is_some() {
            Value::Map(map)
        } else {
            Value::List(list)
        }
    }

    fn traversal(
        &self,
        root: &Expression,
        ops: &[TraversalOperator],
        scope: &Scope<'_>,
        state: &mut EvalState,
    ) -> Value {
        let Expression::Variable(var) = root else {
            let base = self.eval(root, scope, state);
            return self.apply(base, ops, scope, state);
        };
        let name = var.as_str();

        if let Some(bound) = scope.lookup(name) {
            return self.apply(bound.clone(), ops, scope, state);
        }

        match name {
            "count" | "each" | "path" | "terraform" => Value::Unresolved,
            "self" => match (scope.self_block, ops.split_first()) {
                (Some(block), Some((TraversalOperator::GetAttr(attr), rest))) => {
                    let value = self.attribute(block, attr.as_str(), state);
                    self.apply(value, rest, scope, state)
                }
                _ => Value::Unresolved,
            },
            _ => self.reference(name, ops, scope, state),
        }
    }

    /// Evaluate `var.*`, `local.*`, `module.*`, `data.*` and resource
    /// references.
    fn reference(
        &self,
        root: &str,
        ops: &[TraversalOperator],
        scope: &Scope<'_>,
        state: &mut EvalState,
    ) -> Value {
        let (Some(tree), Some(module_id)) = (self.tree, scope.module) else {
            return Value::Unresolved;
        };
        let module = tree.module(module_id);

        match (root, ops) {
            ("var", [TraversalOperator::GetAttr(name), rest @ ..]) => {
                let value = self.variable(tree, module, name.as_str(), state);
                return self.apply(value, rest, scope, state);
            }
            ("local", [TraversalOperator::GetAttr(name), rest @ ..]) => {
                let value = module
                    .local(name.as_str())
                    .map_or(Value::Unresolved, |block| self.attribute(block, name.as_str(), state));
                return self.apply(value, rest, scope, state);
            }
            ("module", [TraversalOperator::GetAttr(name), rest @ ..]) => {
                let Some(owner) = tree.find_call_owner(module_id, name.as_str()) else {
                    tracing::trace!(module = name.as_str(), "Unknown module call");
                    return Value::Unresolved;
                };
                if !owner.is_call_settled(name.as_str()) {
                    return Value::Unresolved;
                }
                let instances: Vec<_> = owner
                    .child_instances(name.as_str())
                    .iter()
                    .map(|id| tree.module(*id))
                    .collect();
                self.select(&instances, rest, scope, state, |child, rest, state| {
                    self.module_output(child, rest, scope, state)
                })
            }
            ("data", [TraversalOperator::GetAttr(data_type), TraversalOperator::GetAttr(name), rest @ ..]) => {
                let instances = module.find("data", &[data_type.as_str(), name.as_str()]);
                self.select(&instances, rest, scope, state, |block, rest, state| {
                    self.block_attribute(block, rest, scope, state)
                })
            }
            (resource_type, [TraversalOperator::GetAttr(name), rest @ ..]) => {
                let instances = module.find("resource", &[resource_type, name.as_str()]);
                if instances.is_empty() && !module.is_declared("resource", &[resource_type, name.as_str()]) {
                    tracing::trace!(address = %format!("{resource_type}.{}", name.as_str()), "Unknown reference");
                    return Value::Unresolved;
                }
                self.select(&instances, rest, scope, state, |block, rest, state| {
                    self.block_attribute(block, rest, scope, state)
                })
            }
            _ => Value::Unresolved,
        }
    }

    /// Pick instances by index or splat, then continue the traversal on
    /// each selected instance.
    fn select<T: Keyed>(
        &self,
        instances: &[&T],
        ops: &[TraversalOperator],
        scope: &Scope<'_>,
        state: &mut EvalState,
        mut next: impl FnMut(&T, &[TraversalOperator], &mut EvalState) -> Value,
    ) -> Value {
        match ops.split_first() {
            Some((TraversalOperator::Index(index), rest)) => {
                let key = InstanceKey::from_value(&self.eval(index, scope, state));
                let selected = key
                    .and_then(|key| instances.iter().copied().find(|i| i.key() == Some(&key)))
                    .or_else(|| single_unkeyed(instances));
                selected.map_or(Value::Unresolved, |i| next(i, rest, state))
            }
            Some((TraversalOperator::LegacyIndex(index), rest)) => {
                let key = usize::try_from(*index).ok().map(InstanceKey::Index);
                instances
                    .iter()
                    .copied()
                    .find(|i| i.key().is_some() && i.key() == key.as_ref())
                    .or_else(|| single_unkeyed(instances))
                    .map_or(Value::Unresolved, |i| next(i, rest, state))
            }
            Some((TraversalOperator::AttrSplat | TraversalOperator::FullSplat, rest)) => {
                Value::List(instances.iter().map(|i| next(i, rest, state)).collect())
            }
            _ => single_unkeyed(instances).map_or(Value::Unresolved, |i| next(i, ops, state)),
        }
    }

    fn block_attribute(
        &self,
        block: &Block,
        ops: &[TraversalOperator],
        scope: &Scope<'_>,
        state: &mut EvalState,
    ) -> Value {
        match ops.split_first() {
            Some((TraversalOperator::GetAttr(attr), rest)) => {
                let value = self.attribute(block, attr.as_str(), state);
                self.apply(value, rest, scope, state)
            }
            _ => {
                let object = self.block_object(block, state);
                self.apply(object, ops, scope, state)
            }
        }
    }

    /// All attributes of a block, with nested blocks as lists of objects.
    fn block_object(&self, block: &Block, state: &mut EvalState) -> Value {
        let mut map = BTreeMap::new();
        for attr in block.attributes() {
            map.insert(attr.name().to_string(), self.attribute(block, attr.name(), state));
        }
        for child in block.children() {
            let object = self.block_object(child, state);
            match map
                .entry(child.block_type().to_string())
                .or_insert_with(|| Value::List(Vec::new()))
            {
                Value::List(items) => items.push(object),
                _ => return Value::Unresolved,
            }
        }
        Value::Map(map)
    }

    fn variable(&self, tree: &ModuleTree, module: &Module, name: &str, state: &mut EvalState) -> Value {
        if module.is_root() {
            if let Some(value) = tree.root_input(name) {
                return value.clone();
            }
        } else if let Some(call) = tree.call_block(module) {
            if call.has_attribute(name) {
                return self.attribute(call, name, state);
            }
        }

        match module.variable(name) {
            Some(block) if block.has_attribute("default") => self.attribute(block, "default", state),
            _ => Value::Unresolved,
        }
    }

    fn module_output(
        &self,
        child: &Module,
        ops: &[TraversalOperator],
        scope: &Scope<'_>,
        state: &mut EvalState,
    ) -> Value {
        match ops.split_first() {
            Some((TraversalOperator::GetAttr(output), rest)) => {
                let value = child
                    .output(output.as_str())
                    .map_or(Value::Unresolved, |block| self.attribute(block, "value", state));
                self.apply(value, rest, scope, state)
            }
            _ => {
                let outputs = child
                    .blocks_of_type("output")
                    .filter_map(|block| {
                        let name = block.type_label()?.to_string();
                        Some((name, self.attribute(block, "value", state)))
                    })
                    .collect::<BTreeMap<_, _>>();
                self.apply(Value::Map(outputs), ops, scope, state)
            }
        }
    }

    /// Apply attribute access, indexing and splats to a value.
    fn apply(&self, mut value: Value, ops: &[TraversalOperator], scope: &Scope<'_>, state: &mut EvalState) -> Value {
        for (i, op) in ops.iter().enumerate() {
            if value.is_unresolved() {
                return Value::Unresolved;
            }
            value = match op {
                TraversalOperator::GetAttr(name) => value.get(name.as_str()),
                TraversalOperator::Index(index) => {
                    let key = self.eval(index, scope, state);
                    value.index(&key)
                }
                TraversalOperator::LegacyIndex(index) => {
                    usize::try_from(*index).map_or(Value::Unresolved, |i| value.index(&Value::from(i)))
                }
                TraversalOperator::AttrSplat | TraversalOperator::FullSplat => {
                    let rest = &ops[i + 1..];
                    return match value {
                        Value::List(items) => Value::List(
                            items
                                .into_iter()
                                .map(|item| self.apply(item, rest, scope, state))
                                .collect(),
                        ),
                        Value::Nil => Value::List(Vec::new()),
                        other => Value::List(vec![self.apply(other, rest, scope, state)]),
                    };
                }
                #[allow(unreachable_patterns)]
                _ => Value::Unresolved,
            };
        }
        value
    }
}

/// Something selectable by instance key.
trait Keyed {
    fn key(&self) -> Option<&InstanceKey>;
}

impl Keyed for Block {
    fn key(&self) -> Option<&InstanceKey> {
        self.instance_key()
    }
}

impl Keyed for Module {
    fn key(&self) -> Option<&InstanceKey> {
        self.call_site().and_then(|c| c.key.as_ref())
    }
}

/// The only instance, if the block or call is not expanded.
fn single_unkeyed<'a, T: Keyed>(instances: &[&'a T]) -> Option<&'a T> {
    match instances {
        [only] if only.key().is_none() => Some(*only),
        _ => None,
    }
}

/// `(key, value)` pairs of a list (index keys) or map (string keys).
pub(crate) fn iteration_entries(collection: &Value) -> Option<Vec<(Value, Value)>> {
    match collection {
        Value::List(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v.clone()))
                .collect(),
        ),
        Value::Map(map) => Some(
            map.iter()
                .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
                .collect(),
        ),
        _ => None,
    }
}

fn binary_op(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> Value {
    use BinaryOperator as Op;

    match operator {
        Op::And => match (lhs.as_bool(), rhs.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::Bool(false),
            (Some(true), Some(true)) => Value::Bool(true),
            _ => Value::Unresolved,
        },
        Op::Or => match (lhs.as_bool(), rhs.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::Bool(true),
            (Some(false), Some(false)) => Value::Bool(false),
            _ => Value::Unresolved,
        },
        Op::Eq | Op::NotEq => {
            if !lhs.is_fully_resolved() || !rhs.is_fully_resolved() {
                return Value::Unresolved;
            }
            let equal = lhs.equals(rhs);
            Value::Bool(if operator == Op::Eq { equal } else { !equal })
        }
        _ => {
            let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) else {
                return Value::Unresolved;
            };
            match operator {
                Op::Less => Value::Bool(l < r),
                Op::LessEq => Value::Bool(l <= r),
                Op::Greater => Value::Bool(l > r),
                Op::GreaterEq => Value::Bool(l >= r),
                Op::Plus => Value::Number(l + r),
                Op::Minus => Value::Number(l - r),
                Op::Mul => Value::Number(l * r),
                Op::Div if r != 0.0 => Value::Number(l / r),
                Op::Mod if r != 0.0 => Value::Number(l % r),
                _ => Value::Unresolved,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModuleTreeBuilder;
    use crate::parser::{HclParser, Parser};
    use crate::Config;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use test_case::test_case;

    fn constant(text: &str) -> Value {
        let expr = crate::model::parse_expression(text).unwrap();
        evaluate_constant(&expr)
    }

    fn tree(content: &str) -> ModuleTree {
        let parser = HclParser::new(&Config::default());
        let file = parser.parse_content(content, Path::new("main.tf")).unwrap();
        ModuleTreeBuilder::new(&Config::default()).build(vec![file], None)
    }

    fn local(tree: &ModuleTree, name: &str) -> Value {
        tree.root().local(name).unwrap().value(name, tree)
    }

    #[test_case("1 + 2 * 3", Value::Number(7.0) ; "arithmetic")]
    #[test_case("10 % 4", Value::Number(2.0) ; "modulo")]
    #[test_case("-(2)", Value::Number(-2.0) ; "negation")]
    #[test_case("!false", Value::Bool(true) ; "not")]
    #[test_case("3 >= 2", Value::Bool(true) ; "comparison")]
    #[test_case("\"a\" == \"a\"", Value::Bool(true) ; "equality")]
    #[test_case("1 == \"1\"", Value::Bool(false) ; "type strict equality")]
    #[test_case("true ? \"yes\" : \"no\"", Value::from("yes") ; "conditional")]
    #[test_case("\"x-${1 + 1}\"", Value::from("x-2") ; "interpolation")]
    #[test_case("[for s in [\"a\", \"b\"] : upper(s)]", Value::List(vec![Value::from("A"), Value::from("B")]) ; "for list")]
    #[test_case("length({a = 1, b = 2})", Value::Number(2.0) ; "function")]
    #[test_case("[1, 2, 3][1]", Value::Number(2.0) ; "index")]
    #[test_case("1 / 0", Value::Unresolved ; "division by zero")]
    #[test_case("substr(\"hello\", 1, 18446744073709551615)", Value::from("ello") ; "substr unbounded length")]
    fn test_constant_expressions(text: &str, expected: Value) {
        assert!(constant(text).identical(&expected), "{text}");
    }

    #[test]
    fn test_unresolved_condition_is_unresolved() {
        // Both branches are equal literals, the result is still unknown.
        assert!(constant("var.enabled ? \"x\" : \"x\"").is_unresolved());
        assert!(constant("timestamp() == \"\" ? 1 : 2").is_unresolved());
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(constant("false && var.x"), Value::Bool(false));
        assert_eq!(constant("var.x && false"), Value::Bool(false));
        assert_eq!(constant("true || var.x"), Value::Bool(true));
        assert!(constant("true && var.x").is_unresolved());
        assert!(constant("var.x == var.x").is_unresolved());
    }

    #[test]
    fn test_template_directives_are_unresolved() {
        assert!(constant("\"%{if true}a%{endif}\"").is_unresolved());
        assert!(constant("\"prefix-${var.x}\"").is_unresolved());
    }

    #[test]
    fn test_for_object_and_grouping() {
        let value = constant("{for k, v in {a = 1, b = 2} : v => k}");
        assert_eq!(value.get("1"), Value::from("a"));

        let grouped = constant("{for s in [\"ab\", \"ac\", \"b\"] : substr(s, 0, 1) => s...}");
        assert_eq!(grouped.get("a").len(), Some(2));

        let filtered = constant("[for n in [1, 2, 3, 4] : n if n % 2 == 0]");
        assert_eq!(filtered, Value::List(vec![Value::Number(2.0), Value::Number(4.0)]));
    }

    #[test]
    fn test_splat_on_values() {
        let value = constant("[{id = \"a\"}, {id = \"b\"}][*].id");
        assert_eq!(value, Value::List(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn test_references_in_tree() {
        let tree = tree(
            r#"
variable "env" {
  default = "prod"
}

locals {
  name   = "app-${var.env}"
  upper  = upper(local.name)
  key_id = aws_kms_key.main.key_id
  arn    = aws_kms_key.main.arn
}

resource "aws_kms_key" "main" {
  key_id = "alias/app"
}
"#,
        );

        assert_eq!(local(&tree, "name"), Value::from("app-prod"));
        assert_eq!(local(&tree, "upper"), Value::from("APP-PROD"));
        assert_eq!(local(&tree, "key_id"), Value::from("alias/app"));
        assert!(local(&tree, "arn").is_unresolved());
    }

    #[test]
    fn test_self_cycle_terminates() {
        let tree = tree(
            r#"
locals {
  a = local.b
  b = "${local.a}-x"
  c = local.c
}
"#,
        );

        assert!(local(&tree, "a").is_unresolved());
        assert!(local(&tree, "b").is_unresolved());
        assert!(local(&tree, "c").is_unresolved());
        // Cycle results are not memoized, evaluating again is stable.
        assert!(local(&tree, "a").identical(&local(&tree, "a")));
    }

    #[test]
    fn test_memoized_values_are_identical() {
        let tree = tree(
            r#"
locals {
  names = [for i in range(3) : "disk-${i}"]
}
"#,
        );
        let first = local(&tree, "names");
        let second = local(&tree, "names");
        assert!(first.identical(&second));
        assert_eq!(first.len(), Some(3));
    }

    #[test]
    fn test_count_and_each_bindings() {
        let tree = tree(
            r#"
resource "aws_ebs_volume" "disk" {
  count = 2
  size  = 10 * (count.index + 1)
}

resource "aws_s3_bucket" "b" {
  for_each = { logs = "private", web = "public-read" }
  acl      = each.value
  bucket   = each.key
}

locals {
  second = aws_ebs_volume.disk[1].size
  sizes  = aws_ebs_volume.disk[*].size
  web    = aws_s3_bucket.b["web"].acl
  ambiguous = aws_ebs_volume.disk.size
}
"#,
        );

        assert_eq!(local(&tree, "second"), Value::Number(20.0));
        assert_eq!(
            local(&tree, "sizes"),
            Value::List(vec![Value::Number(10.0), Value::Number(20.0)])
        );
        assert_eq!(local(&tree, "web"), Value::from("public-read"));
        assert!(local(&tree, "ambiguous").is_unresolved());
    }

    #[test]
    fn test_root_inputs_override_defaults() {
        let parser = HclParser::new(&Config::default());
        let file = parser
            .parse_content(
                "variable \"env\" {\n  default = \"dev\"\n}\nlocals {\n  env = var.env\n}\n",
                Path::new("main.tf"),
            )
            .unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("env".to_string(), Value::from("prod"));
        let tree = ModuleTreeBuilder::new(&Config::default())
            .with_inputs(inputs)
            .build(vec![file], None);

        assert_eq!(local(&tree, "env"), Value::from("prod"));
    }
}
