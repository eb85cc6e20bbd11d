//! Reference resolution.
//!
//! Resolution maps a reference expression to the block(s) it names. It
//! works on addresses, never on evaluated values, so it succeeds for
//! references to computed attributes (`aws_kms_key.k.arn`) that the
//! evaluator can only report as `Unresolved`.
//!
//! Indirections are followed when they are themselves references:
//! `var.x` in a called module follows the call-site argument,
//! `local.x` follows the local's expression and `module.m.out` follows the
//! output's `value`. Each indirection is keyed by `(module, name)`;
//! re-entering one is a cycle.

use super::address::{is_reference_expression, unwrap_reference};
use super::{Address, Attribute, Bindings, Block, BlockId, InstanceKey, Module, ModuleId, ModuleTree};
use crate::error::ResolutionError;
use crate::eval::Scope;
use hcl::Expression;
use std::collections::HashSet;
use std::sync::Arc;

type Resolved<'t> = Result<Vec<&'t Block>, ResolutionError>;

/// One resolved outgoing reference of a block.
#[derive(Debug, Clone)]
pub struct Reference<'t> {
    /// Name of the referencing attribute
    pub attribute: String,
    /// Qualified address of the block declaring the attribute
    pub owner: String,
    /// The reference expression as written
    pub expression: String,
    /// The referenced block
    pub target: &'t Block,
    /// Attribute path accessed on the target, e.g. `["arn"]`
    pub path: Vec<String>,
}

impl ModuleTree {
    /// Resolve the reference held by `attr` of block `from`.
    ///
    /// Returns every matching block instance: a splat, an unindexed
    /// reference to an expanded block or an undecided conditional can name
    /// several. A reference to a block expanded to zero instances resolves
    /// to an empty list.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no declared block matches
    /// - `Cycle` when following indirections re-enters itself
    /// - `MalformedAddress` when the expression is not a reference
    pub fn resolve_reference<'t>(&'t self, attr: &Attribute, from: &Block) -> Resolved<'t> {
        self.resolve_expression(attr.expr(), from)
    }

    /// Resolve a reference expression written in block `from`.
    ///
    /// # Errors
    ///
    /// See [`ModuleTree::resolve_reference`].
    pub fn resolve_expression<'t>(&'t self, expr: &Expression, from: &Block) -> Resolved<'t> {
        let mut resolver = Resolver::new(self);
        resolver.expression(expr, from.module_id(), from.bindings())
    }

    /// Every resolvable reference made by `block` or its nested blocks.
    #[must_use]
    pub fn references<'t>(&'t self, block: &Block) -> Vec<Reference<'t>> {
        let mut out = Vec::new();
        self.collect_references(block, &mut out);
        out
    }

    fn collect_references<'t>(&'t self, block: &Block, out: &mut Vec<Reference<'t>>) {
        for attr in block.attributes() {
            for expr in attr.references() {
                let Ok(targets) = self.resolve_expression(&expr, block) else {
                    continue;
                };
                let path = Address::from_expression(&expr, crate::eval::evaluate_constant)
                    .map(|address| address.attribute_path(&expr))
                    .unwrap_or_default();
                for target in targets {
                    out.push(Reference {
                        attribute: attr.name().to_string(),
                        owner: attr.owner().to_string(),
                        expression: expr.to_string(),
                        target,
                        path: path.clone(),
                    });
                }
            }
        }
        for child in block.children() {
            self.collect_references(child, out);
        }
    }
}

struct Resolver<'t> {
    tree: &'t ModuleTree,
    visiting: HashSet<(ModuleId, String)>,
    depth: usize,
}

impl<'t> Resolver<'t> {
    fn new(tree: &'t ModuleTree) -> Self {
        Self {
            tree,
            visiting: HashSet::new(),
            depth: 0,
        }
    }

    fn expression(&mut self, expr: &Expression, module: ModuleId, bindings: &Bindings) -> Resolved<'t> {
        let expr = unwrap_reference(expr);
        let scope = Scope::module(module).with_bindings(Arc::clone(bindings));

        match expr.as_ref() {
            Expression::Conditional(cond) => {
                let decided = self.tree.evaluator().evaluate(&cond.cond_expr, &scope).as_bool();
                match decided {
                    Some(true) => self.expression(&cond.true_expr, module, bindings),
                    Some(false) => self.expression(&cond.false_expr, module, bindings),
                    None => {
                        let when_true = self.expression(&cond.true_expr, module, bindings);
                        let when_false = self.expression(&cond.false_expr, module, bindings);
                        match (when_true, when_false) {
                            (Ok(mut a), Ok(b)) => {
                                a.extend(b);
                                Ok(dedup(a))
                            }
                            (Ok(a), Err(_)) | (Err(_), Ok(a)) => Ok(a),
                            (Err(e), Err(_)) => Err(e),
                        }
                    }
                }
            }
            Expression::Traversal(_) => {
                let evaluator = self.tree.evaluator();
                let address = Address::from_expression(&expr, |index| evaluator.evaluate(index, &scope))?;
                self.address(&address, module)
            }
            other => Err(ResolutionError::MalformedAddress {
                expression: other.to_string(),
            }),
        }
    }

    fn address(&mut self, address: &Address, module_id: ModuleId) -> Resolved<'t> {
        let tree = self.tree;
        let module = tree.module(module_id);

        match address {
            Address::Resource {
                resource_type,
                name,
                key,
            } => select(module, "resource", &[resource_type, name], key.as_ref(), address),
            Address::Data { data_type, name, key } => {
                select(module, "data", &[data_type, name], key.as_ref(), address)
            }
            Address::ModuleCall { name, key } => match tree.find_call_owner(module_id, name) {
                Some(owner) => select(owner, "module", &[name], key.as_ref(), address),
                None => Err(not_found(module, address)),
            },
            Address::Variable { name } => self.variable(module, name, address),
            Address::Local { name } => self.local(module, name, address),
            Address::ModuleOutput { name, key, output } => {
                self.module_output(module, name, key.as_ref(), output, address)
            }
        }
    }

    fn variable(&mut self, module: &'t Module, name: &str, address: &Address) -> Resolved<'t> {
        if let Some(call) = self.tree.call_block(module) {
            if let Some(argument) = call.get_attribute(name).filter(|a| followable(a.expr())) {
                return self.follow(module, &address.to_string(), |r| {
                    r.expression(argument.expr(), call.module_id(), call.bindings())
                });
            }
        }
        module
            .variable(name)
            .map(|block| vec![block])
            .ok_or_else(|| not_found(module, address))
    }

    fn local(&mut self, module: &'t Module, name: &str, address: &Address) -> Resolved<'t> {
        let Some(block) = module.local(name) else {
            return Err(not_found(module, address));
        };
        match block.get_attribute(name) {
            Some(attr) if followable(attr.expr()) => {
                self.follow(module, &address.to_string(), |r| r.expression(attr.expr(), module.id(), block.bindings()))
            }
            _ => Ok(vec![block]),
        }
    }

    fn module_output(
        &mut self,
        module: &'t Module,
        name: &str,
        key: Option<&InstanceKey>,
        output: &str,
        address: &Address,
    ) -> Resolved<'t> {
        let tree = self.tree;
        let Some(owner) = tree.find_call_owner(module.id(), name) else {
            return Err(not_found(module, address));
        };
        if owner.is_cyclic_call(name) {
            return Err(ResolutionError::Cycle {
                address: qualified(module, &address.to_string()),
            });
        }

        let all = owner.child_instances(name);
        if all.is_empty() {
            return Ok(Vec::new());
        }
        let mut children = tree.call_instances(owner, name, key);
        if children.is_empty() {
            // A call whose count could not be evaluated has one unkeyed
            // instance; every key selects it.
            match all {
                [only] if tree.module(*only).call_site().and_then(|c| c.key.as_ref()).is_none() => {
                    children.push(tree.module(*only));
                }
                _ => return Err(not_found(module, address)),
            }
        }

        let mut found = Vec::new();
        let mut first_error = None;
        for child in children {
            if child.is_opaque() {
                continue;
            }
            let Some(block) = child.output(output) else {
                continue;
            };
            match block.get_attribute("value") {
                Some(value) if followable(value.expr()) => {
                    let result = self.follow(child, &format!("output.{output}"), |r| {
                        r.expression(value.expr(), child.id(), block.bindings())
                    });
                    match result {
                        Ok(targets) => found.extend(targets),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                _ => found.push(block),
            }
        }

        if found.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
            if children_all_opaque(tree, owner, name) {
                return Ok(Vec::new());
            }
            return Err(not_found(module, address));
        }
        Ok(dedup(found))
    }

    /// Follow an indirection, guarding against cycles and runaway depth.
    fn follow(
        &mut self,
        module: &Module,
        name: &str,
        resolve: impl FnOnce(&mut Self) -> Resolved<'t>,
    ) -> Resolved<'t> {
        let key = (module.id(), name.to_string());
        if self.visiting.contains(&key) || self.depth >= self.tree.max_depth {
            let address = qualified(module, name);
            tracing::debug!(address = %address, "Reference cycle detected");
            return Err(ResolutionError::Cycle { address });
        }

        self.visiting.insert(key.clone());
        self.depth += 1;
        let result = resolve(self);
        self.depth -= 1;
        self.visiting.remove(&key);
        result
    }
}

/// Instances of a block, narrowed to `key` when given.
fn select<'t, S: AsRef<str>>(
    module: &'t Module,
    block_type: &str,
    labels: &[S],
    key: Option<&InstanceKey>,
    address: &Address,
) -> Resolved<'t> {
    if !module.is_declared(block_type, labels) {
        return Err(not_found(module, address));
    }
    let instances = module.find(block_type, labels);
    let Some(key) = key else {
        return Ok(instances);
    };
    if instances.is_empty() {
        return Ok(instances);
    }

    let selected: Vec<&Block> = instances
        .iter()
        .copied()
        .filter(|b| b.instance_key() == Some(key))
        .collect();
    match (selected.is_empty(), instances.as_slice()) {
        (false, _) => Ok(selected),
        // A block whose count could not be evaluated stays a single
        // unkeyed instance; every index selects it.
        (true, [only]) if only.instance_key().is_none() => Ok(vec![*only]),
        (true, _) => Err(not_found(module, address)),
    }
}

fn children_all_opaque(tree: &ModuleTree, owner: &Module, name: &str) -> bool {
    owner
        .child_instances(name)
        .iter()
        .all(|id| tree.module(*id).is_opaque())
}

/// True if an indirection should be followed rather than stopping at the
/// declaring block.
fn followable(expr: &Expression) -> bool {
    is_reference_expression(expr) || matches!(unwrap_reference(expr).as_ref(), Expression::Conditional(_))
}

fn qualified(module: &Module, name: &str) -> String {
    if module.is_root() {
        name.to_string()
    } else {
        format!("{}.{name}", module.path())
    }
}

fn not_found(module: &Module, address: &Address) -> ResolutionError {
    ResolutionError::NotFound {
        address: qualified(module, &address.to_string()),
    }
}

fn dedup(blocks: Vec<&Block>) -> Vec<&Block> {
    let mut seen: HashSet<BlockId> = HashSet::new();
    blocks.into_iter().filter(|b| seen.insert(b.id())).collect()
}
