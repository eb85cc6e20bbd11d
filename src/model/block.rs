//! Blocks and attributes.

use super::address::is_reference_expression;
use super::{Bindings, BlockId, InstanceKey, ModuleId, ModuleTree};
use crate::types::Location;
use crate::value::Value;
use dashmap::DashMap;
use hcl::Expression;

/// A named property of a block: the raw expression plus where it was
/// written. Evaluation goes through [`Block::value`].
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    expr: Expression,
    location: Location,
    owner: String,
}

impl Attribute {
    pub(crate) fn new(name: String, expr: Expression, location: Location, owner: String) -> Self {
        Self {
            name,
            expr,
            location,
            owner,
        }
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unevaluated expression.
    #[must_use]
    pub const fn expr(&self) -> &Expression {
        &self.expr
    }

    /// Where the attribute was declared.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Qualified address of the block that declares this attribute.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// True iff the expression syntactically names another block's
    /// address, as opposed to a literal or computed expression.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        is_reference_expression(&self.expr)
    }

    /// True if the expression is a reference to a `data` block.
    #[must_use]
    pub fn is_data_block_reference(&self) -> bool {
        self.reference_root().as_deref() == Some("data")
    }

    /// Root name of a reference expression (`var`, `module`, `data`,
    /// a resource type, ...).
    #[must_use]
    pub fn reference_root(&self) -> Option<String> {
        if !self.is_reference() {
            return None;
        }
        super::address::reference_root(&self.expr)
    }

    /// Every reference expression nested anywhere in this attribute,
    /// for example both traversals of `"${var.a}-${aws_s3_bucket.b.id}"`.
    #[must_use]
    pub fn references(&self) -> Vec<Expression> {
        let mut found = Vec::new();
        collect_references(&self.expr, &mut found);
        found
    }
}

fn collect_references(expr: &Expression, found: &mut Vec<Expression>) {
    match expr {
        Expression::Traversal(traversal) => {
            if is_reference_expression(expr) {
                found.push(expr.clone());
            } else {
                collect_references(&traversal.expr, found);
            }
            for op in &traversal.operators {
                if let hcl::expr::TraversalOperator::Index(index) = op {
                    collect_references(index, found);
                }
            }
        }
        Expression::Array(items) => items.iter().for_each(|e| collect_references(e, found)),
        Expression::Object(object) => {
            for (key, value) in object {
                if let hcl::expr::ObjectKey::Expression(key) = key {
                    collect_references(key, found);
                }
                collect_references(value, found);
            }
        }
        Expression::TemplateExpr(template) => {
            if let Ok(template) = hcl::template::Template::from_expr(template) {
                collect_template_references(&template, found);
            }
        }
        Expression::FuncCall(call) => call.args.iter().for_each(|e| collect_references(e, found)),
        Expression::Parenthesis(inner) => collect_references(inner, found),
        Expression::Conditional(cond) => {
            collect_references(&cond.cond_expr, found);
            collect_references(&cond.true_expr, found);
            collect_references(&cond.false_expr, found);
        }
        Expression::Operation(op) => match op.as_ref() {
            hcl::expr::Operation::Unary(unary) => collect_references(&unary.expr, found),
            hcl::expr::Operation::Binary(binary) => {
                collect_references(&binary.lhs_expr, found);
                collect_references(&binary.rhs_expr, found);
            }
            #[allow(unreachable_patterns)]
            _ => {}
        },
        Expression::ForExpr(for_expr) => {
            collect_references(&for_expr.collection_expr, found);
            if let Some(key) = &for_expr.key_expr {
                collect_references(key, found);
            }
            collect_references(&for_expr.value_expr, found);
            if let Some(cond) = &for_expr.cond_expr {
                collect_references(cond, found);
            }
        }
        _ => {}
    }
}

fn collect_template_references(template: &hcl::template::Template, found: &mut Vec<Expression>) {
    use hcl::template::{Directive, Element};

    for element in template.elements() {
        match element {
            Element::Literal(_) => {}
            Element::Interpolation(interp) => collect_references(&interp.expr, found),
            Element::Directive(Directive::If(directive)) => {
                collect_references(&directive.cond_expr, found);
                collect_template_references(&directive.true_template, found);
                if let Some(false_template) = &directive.false_template {
                    collect_template_references(false_template, found);
                }
            }
            Element::Directive(Directive::For(directive)) => {
                collect_references(&directive.collection_expr, found);
                collect_template_references(&directive.template, found);
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}

/// One block instance: a resource, data source, module call, variable,
/// output, locals block or any nested block.
///
/// Identity is `(block_type, labels)` plus the instance key for blocks
/// expanded by `count`/`for_each`. Blocks are built once by the module
/// builder and never mutated afterwards, except for the memo of evaluated
/// attribute values.
#[derive(Debug)]
pub struct Block {
    id: BlockId,
    module: ModuleId,
    block_type: String,
    labels: Vec<String>,
    key: Option<InstanceKey>,
    address: String,
    attributes: Vec<Attribute>,
    children: Vec<Block>,
    location: Location,
    bindings: Bindings,
    memo: DashMap<String, Value>,
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: BlockId,
        module: ModuleId,
        block_type: String,
        labels: Vec<String>,
        key: Option<InstanceKey>,
        address: String,
        attributes: Vec<Attribute>,
        children: Vec<Block>,
        location: Location,
        bindings: Bindings,
    ) -> Self {
        Self {
            id,
            module,
            block_type,
            labels,
            key,
            address,
            attributes,
            children,
            location,
            bindings,
            memo: DashMap::new(),
        }
    }

    /// Stable identity of this instance.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// The module instance that owns this block.
    #[must_use]
    pub const fn module_id(&self) -> ModuleId {
        self.module
    }

    /// Block type (`resource`, `data`, `module`, ...).
    #[must_use]
    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    /// Labels in declaration order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// First label: the resource/data type, or the name of a module,
    /// variable or output.
    #[must_use]
    pub fn type_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// Last label: the local name of a resource or data source.
    #[must_use]
    pub fn name_label(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    /// Instance key for blocks expanded by `count`/`for_each`.
    #[must_use]
    pub const fn instance_key(&self) -> Option<&InstanceKey> {
        self.key.as_ref()
    }

    /// Address within the owning module, e.g. `data.aws_kms_key.k[0]`.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address prefixed with the module path, e.g.
    /// `module.disks[0].aws_ebs_volume.this`.
    #[must_use]
    pub fn qualified_address(&self) -> String {
        match &self.location.module {
            Some(path) => format!("{path}.{}", self.address),
            None => self.address.clone(),
        }
    }

    /// Where the block header was declared.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Attributes in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Nested blocks in declaration order (`dynamic` blocks already
    /// expanded).
    #[must_use]
    pub fn children(&self) -> &[Block] {
        &self.children
    }

    /// Nested blocks of one type.
    pub fn child_blocks<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.children.iter().filter(move |c| c.block_type == block_type)
    }

    /// True if an attribute or a nested block has this name.
    #[must_use]
    pub fn has_child(&self, name: &str) -> bool {
        self.has_attribute(name) || self.children.iter().any(|c| c.block_type == name)
    }

    /// True for a `resource` block of the given type.
    #[must_use]
    pub fn is_resource_of(&self, resource_type: &str) -> bool {
        self.block_type == "resource" && self.type_label() == Some(resource_type)
    }

    /// True if the attribute is declared. Lookup is exact and
    /// case-sensitive.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Exact negation of [`Block::has_attribute`].
    #[must_use]
    pub fn missing_attribute(&self, name: &str) -> bool {
        !self.has_attribute(name)
    }

    /// The declared attribute, without evaluating it.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// True iff the attribute is declared and its expression names
    /// another block's address.
    #[must_use]
    pub fn is_reference_expression(&self, name: &str) -> bool {
        self.get_attribute(name).is_some_and(Attribute::is_reference)
    }

    /// Evaluate an attribute. Memoized per block instance.
    ///
    /// A missing attribute evaluates to `Unresolved`; use
    /// [`Block::has_attribute`] to tell it apart from an explicit `null`.
    #[must_use]
    pub fn value(&self, name: &str, tree: &ModuleTree) -> Value {
        tree.evaluator().attribute_value(self, name)
    }

    /// True if the block binds a `count`/`for_each`/iterator root name.
    #[must_use]
    pub fn is_bound(&self, root: &str) -> bool {
        self.bindings.contains_key(root)
    }

    pub(crate) const fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub(crate) fn memoized(&self, name: &str) -> Option<Value> {
        self.memo.get(name).map(|v| v.value().clone())
    }

    /// Drop memoized values, including those of nested blocks.
    pub(crate) fn clear_memo(&self) {
        self.memo.clear();
        self.children.iter().for_each(Self::clear_memo);
    }

    /// Store a computed value unless another thread got there first, and
    /// return whichever value is stored.
    pub(crate) fn memoize(&self, name: &str, value: Value) -> Value {
        self.memo.entry(name.to_string()).or_insert(value).value().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn attr(name: &str, expr: &str) -> Attribute {
        let body: hcl::Body = hcl::from_str(&format!("{name} = {expr}")).unwrap();
        let expr = body.attributes().next().unwrap().expr.clone();
        Attribute::new(name.to_string(), expr, Location::new("main.tf", 1), "aws_ebs_volume.example".to_string())
    }

    fn block(attributes: Vec<Attribute>) -> Block {
        Block::new(
            BlockId(0),
            ModuleId::ROOT,
            "resource".to_string(),
            vec!["aws_ebs_volume".to_string(), "example".to_string()],
            None,
            "aws_ebs_volume.example".to_string(),
            attributes,
            Vec::new(),
            Location::new("main.tf", 1),
            Arc::default(),
        )
    }

    #[test]
    fn test_has_and_missing_are_complements() {
        let b = block(vec![attr("size", "40"), attr("encrypted", "null")]);
        for name in ["size", "encrypted", "kms_key_id", "Size", ""] {
            assert_ne!(b.has_attribute(name), b.missing_attribute(name), "{name}");
        }
        assert!(b.has_attribute("encrypted"));
        assert!(b.missing_attribute("Size"));
    }

    #[test]
    fn test_identity_accessors() {
        let b = block(Vec::new());
        assert_eq!(b.type_label(), Some("aws_ebs_volume"));
        assert_eq!(b.name_label(), Some("example"));
        assert!(b.is_resource_of("aws_ebs_volume"));
        assert!(!b.is_resource_of("aws_kms_key"));
        assert_eq!(b.qualified_address(), "aws_ebs_volume.example");
    }

    #[test]
    fn test_reference_detection() {
        assert!(attr("a", "aws_kms_key.k.arn").is_reference());
        assert!(attr("a", "data.aws_kms_key.k.key_id").is_data_block_reference());
        assert!(attr("a", "var.key").is_reference());
        assert!(attr("a", "module.keys.arn").is_reference());
        assert!(attr("a", "\"${local.key}\"").is_reference());
        assert!(!attr("a", "\"alias/aws/ebs\"").is_reference());
        assert!(!attr("a", "count.index").is_reference());
        assert!(!attr("a", "upper(var.key)").is_reference());
        assert!(!attr("a", "var.key").is_data_block_reference());
        assert_eq!(attr("a", "aws_kms_key.k.arn").reference_root().as_deref(), Some("aws_kms_key"));
    }

    #[test]
    fn test_nested_references() {
        let a = attr("name", "\"${var.env}-${aws_s3_bucket.logs.id}\"");
        let found: Vec<String> = a.references().iter().map(ToString::to_string).collect();
        assert_eq!(found, vec!["var.env", "aws_s3_bucket.logs.id"]);

        let c = attr("key", "var.enabled ? aws_kms_key.k.arn : null");
        assert_eq!(c.references().len(), 2);
    }

    #[test]
    fn test_memoize_first_writer_wins() {
        let b = block(Vec::new());
        assert!(b.memoized("x").is_none());
        assert_eq!(b.memoize("x", Value::from("first")), Value::from("first"));
        assert_eq!(b.memoize("x", Value::from("second")), Value::from("first"));
        assert_eq!(b.memoized("x"), Some(Value::from("first")));
    }
}
