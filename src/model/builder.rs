//! Module tree construction.
//!
//! This module provides the `ModuleTreeBuilder`, which turns parsed files
//! into an expanded [`ModuleTree`].
//!
//! # Algorithm
//!
//! For each module, starting at the root:
//!
//! 1. **Provisional phase**: convert raw blocks one-to-one so that `count`
//!    and `for_each` expressions can see the module's variables, locals and
//!    resources.
//! 2. **Planning phase**: evaluate `count`/`for_each` of resources, data
//!    sources and module calls into instance keys and bindings.
//! 3. **Instantiation phase**: create the final blocks, one per instance,
//!    expanding `dynamic` nested blocks.
//! 4. **Loading phase**: load each module call instance through the
//!    [`ModuleLoader`] and build it recursively. A source already on the
//!    current call path is a module-source cycle and is not entered.
//! 5. **Re-planning**: blocks whose `count`/`for_each` could not be
//!    evaluated are planned again once the calls are loaded, since they
//!    may read module outputs. This repeats while it makes progress;
//!    whatever stays unresolved keeps a single unkeyed instance.
//!
//! Values memoized while building are dropped at the end so that later
//! evaluation sees the complete tree.

use super::block::{Attribute, Block};
use super::module::{block_key, BlockKey, CallSite, Module, ModuleTree};
use super::{Bindings, BlockId, InstanceKey, ModuleId};
use crate::config::Config;
use crate::error::Result;
use crate::eval::{iteration_entries, Scope};
use crate::parser::{HclParser, LocalModuleLoader, ModuleLoader, ParsedFile, RawBlock};
use crate::types::Location;
use crate::value::Value;
use hcl::Expression;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds a [`ModuleTree`] from parsed files.
///
/// # Example
///
/// ```rust
/// use tfsieve::model::ModuleTreeBuilder;
/// use tfsieve::parser::{HclParser, Parser};
/// use tfsieve::Config;
/// use std::path::Path;
///
/// let config = Config::default();
/// let file = HclParser::new(&config)
///     .parse_content("resource \"aws_ebs_volume\" \"d\" {\n  count = 2\n}\n", Path::new("main.tf"))
///     .unwrap();
/// let tree = ModuleTreeBuilder::new(&config).build(vec![file], None);
/// assert_eq!(tree.root().find("resource", &["aws_ebs_volume", "d"]).len(), 2);
/// ```
pub struct ModuleTreeBuilder {
    parser: HclParser,
    loader: Box<dyn ModuleLoader>,
    inputs: BTreeMap<String, Value>,
    configured_inputs: BTreeMap<String, Value>,
    max_depth: usize,
    max_instances: usize,
    max_module_depth: usize,
}

struct BuildState {
    tree: ModuleTree,
    next_block: u32,
    sources: Vec<String>,
}

type Instance = (Option<InstanceKey>, Bindings);

impl ModuleTreeBuilder {
    /// Create a builder reading local modules from disk.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            parser: HclParser::new(config),
            loader: Box::new(LocalModuleLoader::new(config)),
            inputs: BTreeMap::new(),
            configured_inputs: config.evaluation.variable_values(),
            max_depth: config.evaluation.max_depth,
            max_instances: config.evaluation.max_instances,
            max_module_depth: config.evaluation.max_module_depth,
        }
    }

    /// Use a different module loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Root module input values, typically read from `.tfvars` files.
    ///
    /// Variables set in the configuration file take precedence.
    #[must_use]
    pub fn with_inputs(mut self, inputs: BTreeMap<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Parse a directory and build its tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or a file fails to
    /// parse (unless `continue_on_error` is set).
    pub fn build_directory(&self, directory: &Path) -> Result<ModuleTree> {
        let canonical = std::fs::canonicalize(directory).map_err(|_| {
            crate::err!(DirectoryNotFound {
                path: directory.to_path_buf(),
            })
        })?;
        let files = self.parser.parse_directory(&canonical)?;
        Ok(self.build(files, Some(&canonical)))
    }

    /// Build the tree rooted at the given files.
    #[must_use]
    pub fn build(&self, root_files: Vec<ParsedFile>, root_dir: Option<&Path>) -> ModuleTree {
        tracing::info!(files = root_files.len(), "Building module tree");

        let mut state = BuildState {
            tree: ModuleTree::new(self.max_depth, self.max_instances),
            next_block: 0,
            sources: Vec::new(),
        };
        let mut inputs = self.inputs.clone();
        inputs.extend(self.configured_inputs.clone());
        state.tree.root_inputs = inputs;

        let root_key = root_dir.map_or_else(|| "<root>".to_string(), |d| d.display().to_string());
        self.build_module(
            &mut state,
            root_files,
            root_dir.map(Path::to_path_buf),
            root_key,
            None,
            None,
            String::new(),
        );

        for (_, block) in state.tree.all_blocks() {
            block.clear_memo();
        }

        tracing::info!(
            modules = state.tree.modules().len(),
            blocks = state.tree.block_count(),
            diagnostics = state.tree.diagnostics().len(),
            "Module tree built"
        );
        state.tree
    }

    #[allow(clippy::too_many_arguments)]
    fn build_module(
        &self,
        state: &mut BuildState,
        files: Vec<ParsedFile>,
        directory: Option<PathBuf>,
        source_key: String,
        parent: Option<ModuleId>,
        call: Option<CallSite>,
        path: String,
    ) -> ModuleId {
        let id = ModuleId(state.tree.modules.len());
        tracing::debug!(module = %path, source = %source_key, "Building module");

        state
            .tree
            .modules
            .push(Module::new(id, path.clone(), parent, call, directory.clone()));
        state.tree.by_path.insert(path.clone(), id);
        state.sources.push(source_key);

        for file in &files {
            if !state.tree.files.contains(&file.path) {
                state.tree.files.push(file.path.clone());
            }
            state
                .tree
                .ignores
                .entry(file.path.clone())
                .or_default()
                .extend(file.ignores.iter().cloned());
        }

        let raw_blocks: Vec<&RawBlock> = files.iter().flat_map(|f| &f.blocks).collect();
        let declared: HashSet<_> = raw_blocks
            .iter()
            .map(|b| block_key(&b.block_type, &b.labels))
            .collect();
        let module_path = (!path.is_empty()).then_some(path.as_str());

        // Provisional blocks, so that expansion can evaluate against them.
        let provisional: Vec<Block> = {
            let mut factory = BlockFactory::new(&state.tree, id, module_path, &mut state.next_block, self.max_instances);
            factory.expand_dynamic = false;
            raw_blocks
                .iter()
                .map(|raw| factory.top_level(raw, None, Bindings::default()))
                .collect()
        };
        state.tree.module_mut(id).set_blocks(provisional, declared.clone());

        let (mut plans, diagnostics) = {
            let mut factory = BlockFactory::new(&state.tree, id, module_path, &mut state.next_block, self.max_instances);
            let plans: Vec<Option<Vec<Instance>>> = raw_blocks.iter().map(|raw| factory.instances(raw)).collect();
            (plans, factory.diagnostics)
        };
        state.tree.diagnostics.extend(diagnostics);

        let all: Vec<usize> = (0..raw_blocks.len()).collect();
        self.instantiate(state, id, module_path, &raw_blocks, &plans, &all, &declared);
        let planned: Vec<usize> = all.iter().copied().filter(|i| plans[*i].is_some()).collect();
        self.load_calls(state, id, directory.as_deref(), &path, &raw_blocks, &planned);

        // count/for_each reading module outputs can only be planned once
        // those calls are loaded.
        let mut pending: Vec<usize> = all.into_iter().filter(|i| plans[*i].is_none()).collect();
        while !pending.is_empty() {
            for (_, block) in state.tree.all_blocks() {
                block.clear_memo();
            }
            let (replanned, diagnostics) = {
                let mut factory =
                    BlockFactory::new(&state.tree, id, module_path, &mut state.next_block, self.max_instances);
                let replanned: Vec<(usize, Vec<Instance>)> = pending
                    .iter()
                    .filter_map(|&i| factory.instances(raw_blocks[i]).map(|plan| (i, plan)))
                    .collect();
                (replanned, factory.diagnostics)
            };
            state.tree.diagnostics.extend(diagnostics);
            if replanned.is_empty() {
                break;
            }

            let resolved: Vec<usize> = replanned.iter().map(|(i, _)| *i).collect();
            for (i, plan) in replanned {
                plans[i] = Some(plan);
            }
            pending.retain(|i| plans[*i].is_none());
            self.instantiate(state, id, module_path, &raw_blocks, &plans, &resolved, &declared);
            self.load_calls(state, id, directory.as_deref(), &path, &raw_blocks, &resolved);
        }

        for &i in &pending {
            let raw = raw_blocks[i];
            tracing::trace!(
                address = %block_address(&raw.block_type, &raw.labels, None),
                module = %path,
                "Unresolved count/for_each, keeping a single instance"
            );
        }
        self.load_calls(state, id, directory.as_deref(), &path, &raw_blocks, &pending);

        state.sources.pop();
        id
    }

    /// Replace the blocks of `raw_blocks[i]` for each `i` in `rebuild` with
    /// one block per planned instance. Every rebuilt raw block currently
    /// holds a single block (provisional or unplanned).
    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &self,
        state: &mut BuildState,
        id: ModuleId,
        module_path: Option<&str>,
        raw_blocks: &[&RawBlock],
        plans: &[Option<Vec<Instance>>],
        rebuild: &[usize],
        declared: &HashSet<BlockKey>,
    ) {
        let (fresh, diagnostics) = {
            let mut factory = BlockFactory::new(&state.tree, id, module_path, &mut state.next_block, self.max_instances);
            let fresh: Vec<(usize, Vec<Block>)> = rebuild
                .iter()
                .map(|&i| {
                    let raw = raw_blocks[i];
                    let plan = plans[i].clone().unwrap_or_else(single_instance);
                    let blocks = plan
                        .into_iter()
                        .map(|(key, bindings)| factory.top_level(raw, key, bindings))
                        .collect();
                    (i, blocks)
                })
                .collect();
            (fresh, factory.diagnostics)
        };
        state.tree.diagnostics.extend(diagnostics);

        let module = state.tree.module_mut(id);
        let mut current = module.take_blocks().into_iter();
        let mut groups: Vec<Vec<Block>> = plans
            .iter()
            .enumerate()
            .map(|(i, plan)| {
                let size = if rebuild.contains(&i) {
                    1
                } else {
                    plan.as_ref().map_or(1, Vec::len)
                };
                current.by_ref().take(size).collect()
            })
            .collect();
        for (i, blocks) in fresh {
            groups[i] = blocks;
        }
        module.set_blocks(groups.into_iter().flatten().collect(), declared.clone());
    }

    /// Load every instance of the module calls among `raw_blocks[i]`,
    /// `i` in `indices`, and mark those calls settled.
    fn load_calls(
        &self,
        state: &mut BuildState,
        id: ModuleId,
        directory: Option<&Path>,
        path: &str,
        raw_blocks: &[&RawBlock],
        indices: &[usize],
    ) {
        let names: BTreeSet<&str> = indices
            .iter()
            .map(|&i| raw_blocks[i])
            .filter(|raw| raw.block_type == "module")
            .filter_map(|raw| raw.labels.first().map(String::as_str))
            .collect();
        if names.is_empty() {
            return;
        }

        let calls: Vec<(String, Option<InstanceKey>, Option<String>)> = state
            .tree
            .module(id)
            .blocks_of_type("module")
            .filter_map(|block| {
                let name = block.type_label().filter(|n| names.contains(n))?.to_string();
                let source = block.value("source", &state.tree).as_string();
                Some((name, block.instance_key().cloned(), source))
            })
            .collect();

        for (name, key, source) in calls {
            self.load_call(state, id, directory, path, name, key, source);
        }
        let module = state.tree.module_mut(id);
        for name in names {
            module.settle_call(name);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn load_call(
        &self,
        state: &mut BuildState,
        parent: ModuleId,
        directory: Option<&Path>,
        parent_path: &str,
        name: String,
        key: Option<InstanceKey>,
        source: Option<String>,
    ) {
        let suffix = key.as_ref().map(ToString::to_string).unwrap_or_default();
        let path = if parent_path.is_empty() {
            format!("module.{name}{suffix}")
        } else {
            format!("{parent_path}.module.{name}{suffix}")
        };
        let call = CallSite {
            name: name.clone(),
            key,
            source: source.clone(),
        };

        if state.sources.len() > self.max_module_depth {
            state
                .tree
                .diagnostics
                .push(format!("{path}: module nesting deeper than {} levels", self.max_module_depth));
            return;
        }

        let Some(source) = source else {
            state
                .tree
                .diagnostics
                .push(format!("{path}: module source cannot be determined statically"));
            self.opaque_child(state, parent, call, path);
            return;
        };

        match self.loader.load(&source, directory) {
            Ok(Some(loaded)) => {
                if state.sources.contains(&loaded.key) {
                    tracing::warn!(module = %path, source = %source, "Module source cycle detected");
                    state
                        .tree
                        .diagnostics
                        .push(format!("{path}: module source cycle through '{source}'"));
                    state.tree.module_mut(parent).mark_cyclic(&name);
                    return;
                }
                let child = self.build_module(
                    state,
                    loaded.files,
                    loaded.directory,
                    loaded.key,
                    Some(parent),
                    Some(call),
                    path,
                );
                state.tree.module_mut(parent).add_child(&name, child);
            }
            Ok(None) => {
                tracing::debug!(module = %path, source = %source, "Module source not loaded, treating as opaque");
                state
                    .tree
                    .diagnostics
                    .push(format!("{path}: module source '{source}' is not local"));
                self.opaque_child(state, parent, call, path);
            }
            Err(e) => {
                tracing::warn!(module = %path, source = %source, error = %e, "Failed to load module");
                state.tree.diagnostics.push(format!("{path}: {e}"));
                self.opaque_child(state, parent, call, path);
            }
        }
    }

    fn opaque_child(&self, state: &mut BuildState, parent: ModuleId, call: CallSite, path: String) {
        let id = ModuleId(state.tree.modules.len());
        let name = call.name.clone();
        let mut module = Module::new(id, path.clone(), Some(parent), Some(call), None);
        module.mark_opaque();
        state.tree.modules.push(module);
        state.tree.by_path.insert(path, id);
        state.tree.module_mut(parent).add_child(&name, id);
    }
}

fn single_instance() -> Vec<Instance> {
    vec![(None, Bindings::default())]
}

/// Converts raw blocks of one module into model blocks.
struct BlockFactory<'a> {
    tree: &'a ModuleTree,
    module: ModuleId,
    path: Option<&'a str>,
    next_block: &'a mut u32,
    max_instances: usize,
    expand_dynamic: bool,
    diagnostics: Vec<String>,
}

impl<'a> BlockFactory<'a> {
    fn new(
        tree: &'a ModuleTree,
        module: ModuleId,
        path: Option<&'a str>,
        next_block: &'a mut u32,
        max_instances: usize,
    ) -> Self {
        Self {
            tree,
            module,
            path,
            next_block,
            max_instances,
            expand_dynamic: true,
            diagnostics: Vec::new(),
        }
    }

    fn next_id(&mut self) -> BlockId {
        let id = BlockId(*self.next_block);
        *self.next_block += 1;
        id
    }

    fn evaluate(&self, expr: &Expression, bindings: &Bindings) -> Value {
        let scope = Scope::module(self.module).with_bindings(Arc::clone(bindings));
        self.tree.evaluator().evaluate(expr, &scope)
    }

    fn qualify(&self, address: &str) -> String {
        match self.path {
            Some(path) => format!("{path}.{address}"),
            None => address.to_string(),
        }
    }

    /// Instance keys and bindings for `count`/`for_each`, or `None` while
    /// the expression cannot be evaluated.
    fn instances(&mut self, raw: &RawBlock) -> Option<Vec<Instance>> {
        if !matches!(raw.block_type.as_str(), "resource" | "data" | "module") {
            return Some(single_instance());
        }
        let address = self.qualify(&block_address(&raw.block_type, &raw.labels, None));

        if let Some(count) = raw.attribute("count") {
            let value = self.evaluate(&count.expr, &Bindings::default());
            let Some(n) = value.as_number().filter(|n| *n >= 0.0 && n.fract() == 0.0) else {
                tracing::trace!(address = %address, value = %value, "Unresolved count");
                return None;
            };
            let n = self.cap(&address, n as usize);
            return Some((0..n)
                .map(|i| {
                    let index = BTreeMap::from([("index".to_string(), Value::from(i))]);
                    let bindings = BTreeMap::from([("count".to_string(), Value::Map(index))]);
                    (Some(InstanceKey::Index(i)), Arc::new(bindings))
                })
                .collect());
        }

        if let Some(for_each) = raw.attribute("for_each") {
            let value = self.evaluate(&for_each.expr, &Bindings::default());
            let entries: Vec<(String, Value)> = match &value {
                Value::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                Value::List(items) => {
                    let Some(keys) = items
                        .iter()
                        .map(|i| i.as_str().map(String::from))
                        .collect::<Option<BTreeSet<_>>>()
                    else {
                        return None;
                    };
                    keys.into_iter().map(|k| (k.clone(), Value::String(k))).collect()
                }
                _ => {
                    tracing::trace!(address = %address, "Unresolved for_each");
                    return None;
                }
            };
            let n = self.cap(&address, entries.len());
            return Some(
                entries
                .into_iter()
                .take(n)
                .map(|(key, value)| {
                    let each = BTreeMap::from([
                        ("key".to_string(), Value::from(key.as_str())),
                        ("value".to_string(), value),
                    ]);
                    let bindings = BTreeMap::from([("each".to_string(), Value::Map(each))]);
                    (Some(InstanceKey::Key(key)), Arc::new(bindings))
                })
                .collect(),
            );
        }

        Some(single_instance())
    }

    fn cap(&mut self, address: &str, n: usize) -> usize {
        if n > self.max_instances {
            self.diagnostics.push(format!(
                "{address}: {n} instances exceed the limit of {}, expanding the first {}",
                self.max_instances, self.max_instances
            ));
            return self.max_instances;
        }
        n
    }

    fn top_level(&mut self, raw: &RawBlock, key: Option<InstanceKey>, bindings: Bindings) -> Block {
        let address = block_address(&raw.block_type, &raw.labels, key.as_ref());
        self.block(
            raw,
            raw.block_type.clone(),
            raw.labels.clone(),
            key,
            address,
            &raw.location,
            bindings,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn block(
        &mut self,
        source: &RawBlock,
        block_type: String,
        labels: Vec<String>,
        key: Option<InstanceKey>,
        address: String,
        location: &Location,
        bindings: Bindings,
    ) -> Block {
        let id = self.next_id();
        let owner = self.qualify(&address);
        let attributes = source
            .attributes
            .iter()
            .map(|a| Attribute::new(a.name.clone(), a.expr.clone(), a.location.in_module(self.path), owner.clone()))
            .collect();
        let children = self.children(source, &address, &bindings);

        Block::new(
            id,
            self.module,
            block_type,
            labels,
            key,
            address,
            attributes,
            children,
            location.in_module(self.path),
            bindings,
        )
    }

    fn children(&mut self, parent: &RawBlock, parent_address: &str, bindings: &Bindings) -> Vec<Block> {
        let mut out = Vec::new();
        for child in &parent.children {
            if child.block_type == "dynamic" {
                if self.expand_dynamic {
                    out.extend(self.dynamic(child, parent_address, bindings));
                }
                continue;
            }
            let address = nested_address(parent_address, &child.block_type, &child.labels);
            out.push(self.block(
                child,
                child.block_type.clone(),
                child.labels.clone(),
                None,
                address,
                &child.location,
                Arc::clone(bindings),
            ));
        }
        out
    }

    /// Expand `dynamic "x" { for_each = ..., content { ... } }` into `x`
    /// blocks, one per element.
    fn dynamic(&mut self, raw: &RawBlock, parent_address: &str, bindings: &Bindings) -> Vec<Block> {
        let Some(block_type) = raw.labels.first() else {
            return Vec::new();
        };
        let Some(content) = raw.children.iter().find(|c| c.block_type == "content") else {
            return Vec::new();
        };
        let iterator = raw
            .attribute("iterator")
            .and_then(|a| match &a.expr {
                Expression::Variable(v) => Some(v.as_str().to_string()),
                _ => None,
            })
            .unwrap_or_else(|| block_type.clone());
        let address = nested_address(parent_address, block_type, &[]);

        let collection = raw
            .attribute("for_each")
            .map_or(Value::Unresolved, |a| self.evaluate(&a.expr, bindings));
        let Some(mut entries) = iteration_entries(&collection) else {
            tracing::trace!(address = %self.qualify(&address), "Unresolved dynamic for_each, keeping a single block");
            return vec![self.block(
                content,
                block_type.clone(),
                Vec::new(),
                None,
                address,
                &content.location,
                Arc::clone(bindings),
            )];
        };
        let qualified = self.qualify(&address);
        let n = self.cap(&qualified, entries.len());
        entries.truncate(n);

        let mut out = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let mut scope = (**bindings).clone();
            let iteration = BTreeMap::from([("key".to_string(), key), ("value".to_string(), value)]);
            scope.insert(iterator.clone(), Value::Map(iteration));
            let scope: Bindings = Arc::new(scope);

            let labels = raw
                .attribute("labels")
                .map(|a| self.evaluate(&a.expr, &scope))
                .and_then(|v| v.as_list().map(|l| l.iter().filter_map(Value::as_string).collect()))
                .unwrap_or_default();

            out.push(self.block(
                content,
                block_type.clone(),
                labels,
                None,
                address.clone(),
                &content.location,
                scope,
            ));
        }
        out
    }
}

/// Address of a top-level block within its module.
fn block_address(block_type: &str, labels: &[String], key: Option<&InstanceKey>) -> String {
    let key = key.map(ToString::to_string).unwrap_or_default();
    match (block_type, labels) {
        ("resource", [resource_type, name]) => format!("{resource_type}.{name}{key}"),
        ("data", [data_type, name]) => format!("data.{data_type}.{name}{key}"),
        ("module", [name]) => format!("module.{name}{key}"),
        ("variable", [name]) => format!("var.{name}"),
        ("locals", []) => "locals".to_string(),
        _ => {
            let mut parts = vec![block_type];
            parts.extend(labels.iter().map(String::as_str));
            format!("{}{key}", parts.join("."))
        }
    }
}

fn nested_address(parent: &str, block_type: &str, labels: &[String]) -> String {
    let mut address = format!("{parent}.{block_type}");
    for label in labels {
        address.push('.');
        address.push_str(label);
    }
    address
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{MemoryModuleLoader, Parser};
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> ParsedFile {
        HclParser::new(&Config::default())
            .parse_content(content, Path::new("main.tf"))
            .unwrap()
    }

    fn build(content: &str) -> ModuleTree {
        ModuleTreeBuilder::new(&Config::default()).build(vec![parse(content)], None)
    }

    fn build_with_modules(content: &str, modules: &[(&str, &str)]) -> ModuleTree {
        let mut loader = MemoryModuleLoader::new();
        for (source, body) in modules {
            loader.insert_hcl(*source, "module.tf", body).unwrap();
        }
        ModuleTreeBuilder::new(&Config::default())
            .with_loader(Box::new(loader))
            .build(vec![parse(content)], None)
    }

    fn addresses(tree: &ModuleTree) -> Vec<String> {
        tree.all_blocks().map(|(_, b)| b.qualified_address()).collect()
    }

    #[test]
    fn test_count_expansion() {
        let tree = build(
            r#"
variable "n" {
  default = 2
}

resource "aws_ebs_volume" "data" {
  count = var.n
  size  = 10
}
"#,
        );
        let volumes = tree.root().find("resource", &["aws_ebs_volume", "data"]);
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[1].address(), "aws_ebs_volume.data[1]");
        assert_eq!(volumes[1].instance_key(), Some(&InstanceKey::Index(1)));
        assert!(volumes[0].is_bound("count"));
    }

    #[test]
    fn test_count_zero_is_declared() {
        let tree = build(
            r#"
resource "aws_ebs_volume" "none" {
  count = 0
}
"#,
        );
        assert!(tree.root().find("resource", &["aws_ebs_volume", "none"]).is_empty());
        assert!(tree.root().is_declared("resource", &["aws_ebs_volume", "none"]));
        assert!(!tree.root().is_declared("resource", &["aws_ebs_volume", "other"]));
    }

    #[test]
    fn test_for_each_expansion() {
        let tree = build(
            r#"
resource "aws_s3_bucket" "b" {
  for_each = toset(["web", "logs", "web"])
  bucket   = each.key
}
"#,
        );
        let buckets = tree.root().find("resource", &["aws_s3_bucket", "b"]);
        let keys: Vec<&str> = buckets.iter().map(|b| b.address()).collect();
        assert_eq!(keys, vec!["aws_s3_bucket.b[\"logs\"]", "aws_s3_bucket.b[\"web\"]"]);
        assert_eq!(buckets[1].value("bucket", &tree), Value::from("web"));
    }

    #[test]
    fn test_unresolved_count_keeps_single_instance() {
        let tree = build(
            r#"
resource "aws_ebs_volume" "d" {
  count = length(data.aws_availability_zones.all.names)
}
"#,
        );
        let volumes = tree.root().find("resource", &["aws_ebs_volume", "d"]);
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].instance_key(), None);
        assert!(!volumes[0].is_bound("count"));
    }

    #[test]
    fn test_instance_cap() {
        let mut config = Config::default();
        config.evaluation.max_instances = 3;
        let tree = ModuleTreeBuilder::new(&config).build(
            vec![parse("resource \"aws_ebs_volume\" \"d\" {\n  count = 10\n}\n")],
            None,
        );
        assert_eq!(tree.root().find("resource", &["aws_ebs_volume", "d"]).len(), 3);
        assert_eq!(tree.diagnostics().len(), 1);
    }

    #[test]
    fn test_dynamic_blocks() {
        let tree = build(
            r#"
resource "aws_security_group" "sg" {
  dynamic "ingress" {
    for_each = [22, 443]
    iterator = rule
    content {
      from_port = rule.value
    }
  }
}
"#,
        );
        let sg = &tree.root().blocks()[0];
        let ingress: Vec<&Block> = sg.child_blocks("ingress").collect();
        assert_eq!(ingress.len(), 2);
        assert_eq!(ingress[1].value("from_port", &tree), Value::Number(443.0));
        assert_eq!(ingress[0].location().line, 6);
        assert!(!sg.has_child("dynamic"));
    }

    #[test]
    fn test_local_module_instances() {
        let tree = build_with_modules(
            r#"
module "disks" {
  source = "./disks"
  count  = 2
  size   = 10 + count.index
}
"#,
            &[(
                "./disks",
                r#"
variable "size" {}

resource "aws_ebs_volume" "this" {
  size = var.size
}

output "size" {
  value = aws_ebs_volume.this.size
}
"#,
            )],
        );

        assert_eq!(tree.modules().len(), 3);
        let second = tree.module_by_path("module.disks[1]").unwrap();
        let volume = second.find("resource", &["aws_ebs_volume", "this"])[0];
        assert_eq!(volume.qualified_address(), "module.disks[1].aws_ebs_volume.this");
        assert_eq!(volume.value("size", &tree), Value::Number(11.0));
        assert!(addresses(&tree).contains(&"module.disks[0].output.size".to_string()));
    }

    #[test]
    fn test_cardinality_from_module_outputs() {
        let tree = build_with_modules(
            r#"
module "net" {
  source = "./net"
}

module "pair" {
  source = "./net"
  count  = 2
}

locals {
  n = module.net.n
}

resource "aws_ebs_volume" "v" {
  count = module.net.n
}

resource "aws_ebs_volume" "via_local" {
  count = local.n
}

resource "aws_ebs_volume" "per_zone" {
  for_each = toset(module.net.zones)
}

resource "aws_ebs_volume" "per_pair" {
  count = length(module.pair[*].n)
}

module "disks" {
  source = "./disks"
  count  = module.net.n - 1
}
"#,
            &[
                ("./net", "output \"n\" {\n  value = 3\n}\n\noutput \"zones\" {\n  value = [\"a\", \"b\"]\n}\n"),
                ("./disks", "resource \"aws_ebs_volume\" \"this\" {}\n"),
            ],
        );
        let root = tree.root();

        assert_eq!(root.find("resource", &["aws_ebs_volume", "v"]).len(), 3);
        assert_eq!(root.find("resource", &["aws_ebs_volume", "via_local"]).len(), 3);
        assert_eq!(root.find("resource", &["aws_ebs_volume", "per_zone"]).len(), 2);
        assert_eq!(root.find("resource", &["aws_ebs_volume", "per_pair"]).len(), 2);
        assert_eq!(root.child_instances("disks").len(), 2);
        assert!(tree.module_by_path("module.disks[1]").is_some());

        let third = root.find("resource", &["aws_ebs_volume", "v"])[2];
        assert_eq!(third.address(), "aws_ebs_volume.v[2]");
        assert!(root.is_call_settled("net"));
    }

    #[test]
    fn test_module_source_cycle_is_diagnosed() {
        let tree = build_with_modules(
            "module \"a\" {\n  source = \"./a\"\n}\n",
            &[("./a", "module \"again\" {\n  source = \"./a\"\n}\n")],
        );
        assert_eq!(tree.modules().len(), 2);
        let a = tree.module_by_path("module.a").unwrap();
        assert!(a.is_cyclic_call("again"));
        assert!(tree.diagnostics().iter().any(|d| d.contains("cycle")));
    }

    #[test]
    fn test_remote_module_is_opaque() {
        let tree = build("module \"vpc\" {\n  source = \"terraform-aws-modules/vpc/aws\"\n}\n");
        let vpc = tree.module_by_path("module.vpc").unwrap();
        assert!(vpc.is_opaque());
        assert!(vpc.blocks().is_empty());
    }

    #[test]
    fn test_block_ids_are_unique() {
        let tree = build(
            r#"
resource "aws_ebs_volume" "a" {
  count = 3
}

resource "aws_ebs_volume" "b" {}
"#,
        );
        let ids: HashSet<BlockId> = tree.all_blocks().map(|(_, b)| b.id()).collect();
        assert_eq!(ids.len(), 4);
    }
}
