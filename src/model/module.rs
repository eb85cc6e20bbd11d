//! Modules and the module tree arena.

use super::{Block, BlockId, InstanceKey, ModuleId};
use crate::eval::Evaluator;
use crate::parser::IgnoreDirective;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

pub(crate) type BlockKey = (String, Vec<String>);

/// How a child module instance was called from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Name of the `module` block in the parent
    pub name: String,
    /// Instance key when the call uses `count`/`for_each`
    pub key: Option<InstanceKey>,
    /// The module `source` as written
    pub source: Option<String>,
}

/// One module instance: the root configuration or one instance of a
/// module call.
///
/// A module owns its blocks. Child module instances are referenced by id
/// through the call name, never owned.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    path: String,
    parent: Option<ModuleId>,
    call: Option<CallSite>,
    directory: Option<PathBuf>,
    opaque: bool,
    blocks: Vec<Block>,
    index: HashMap<BlockKey, Vec<usize>>,
    declared: HashSet<BlockKey>,
    children: BTreeMap<String, Vec<ModuleId>>,
    cyclic_calls: HashSet<String>,
    settled_calls: HashSet<String>,
}

impl Module {
    pub(crate) fn new(
        id: ModuleId,
        path: String,
        parent: Option<ModuleId>,
        call: Option<CallSite>,
        directory: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            path,
            parent,
            call,
            directory,
            opaque: false,
            blocks: Vec::new(),
            index: HashMap::new(),
            declared: HashSet::new(),
            children: BTreeMap::new(),
            cyclic_calls: HashSet::new(),
            settled_calls: HashSet::new(),
        }
    }

    /// Arena id.
    #[must_use]
    pub const fn id(&self) -> ModuleId {
        self.id
    }

    /// Module path, e.g. `module.network[0].module.subnets`. Empty for the
    /// root module.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True for the root module.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The calling module, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    /// How this instance was called.
    #[must_use]
    pub const fn call_site(&self) -> Option<&CallSite> {
        self.call.as_ref()
    }

    /// Directory the module was read from.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// True when the module source could not be read (remote or failed
    /// sources). Opaque modules have no blocks; their outputs are unknown.
    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// Top-level blocks in declaration order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Top-level blocks of one type.
    pub fn blocks_of_type<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.block_type() == block_type)
    }

    /// Every instance of the block `(block_type, labels)`.
    #[must_use]
    pub fn find<S: AsRef<str>>(&self, block_type: &str, labels: &[S]) -> Vec<&Block> {
        let key = block_key(block_type, labels);
        self.index
            .get(&key)
            .map(|positions| positions.iter().map(|&i| &self.blocks[i]).collect())
            .unwrap_or_default()
    }

    /// True if the block is declared, even when it expanded to zero
    /// instances.
    #[must_use]
    pub fn is_declared<S: AsRef<str>>(&self, block_type: &str, labels: &[S]) -> bool {
        self.declared.contains(&block_key(block_type, labels))
    }

    /// A block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id() == id)
    }

    /// `variable "name"` declaration.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Block> {
        self.find("variable", &[name]).into_iter().next()
    }

    /// `output "name"` declaration.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Block> {
        self.find("output", &[name]).into_iter().next()
    }

    /// The `locals` block declaring `name`.
    #[must_use]
    pub fn local(&self, name: &str) -> Option<&Block> {
        self.blocks_of_type("locals").find(|b| b.has_attribute(name))
    }

    /// Instances of `module "name"` call blocks.
    #[must_use]
    pub fn module_calls(&self, name: &str) -> Vec<&Block> {
        self.find("module", &[name])
    }

    /// Child module instances created for a call, ordered by key.
    #[must_use]
    pub fn child_instances(&self, call: &str) -> &[ModuleId] {
        self.children.get(call).map_or(&[], Vec::as_slice)
    }

    /// All child module instances.
    pub fn children(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.children.values().flatten().copied()
    }

    /// True if loading the call would have re-entered a module already on
    /// the call path.
    #[must_use]
    pub fn is_cyclic_call(&self, call: &str) -> bool {
        self.cyclic_calls.contains(call)
    }

    /// True once the call's instances are final and loaded.
    ///
    /// Output values of a call that is still being planned are unknown.
    #[must_use]
    pub fn is_call_settled(&self, call: &str) -> bool {
        self.settled_calls.contains(call)
    }

    pub(crate) fn set_blocks(&mut self, blocks: Vec<Block>, declared: HashSet<BlockKey>) {
        let mut index: HashMap<BlockKey, Vec<usize>> = HashMap::new();
        for (i, block) in blocks.iter().enumerate() {
            index
                .entry(block_key(block.block_type(), block.labels()))
                .or_default()
                .push(i);
        }
        self.blocks = blocks;
        self.index = index;
        self.declared = declared;
    }

    pub(crate) fn take_blocks(&mut self) -> Vec<Block> {
        self.index.clear();
        std::mem::take(&mut self.blocks)
    }

    pub(crate) fn settle_call(&mut self, call: &str) {
        self.settled_calls.insert(call.to_string());
    }

    pub(crate) fn add_child(&mut self, call: &str, child: ModuleId) {
        self.children.entry(call.to_string()).or_default().push(child);
    }

    pub(crate) fn mark_cyclic(&mut self, call: &str) {
        self.cyclic_calls.insert(call.to_string());
    }

    pub(crate) fn mark_opaque(&mut self) {
        self.opaque = true;
    }
}

pub(crate) fn block_key<S: AsRef<str>>(block_type: &str, labels: &[S]) -> BlockKey {
    (
        block_type.to_string(),
        labels.iter().map(|l| l.as_ref().to_string()).collect(),
    )
}

/// The expanded module graph of one configuration.
///
/// Modules live in an arena indexed by [`ModuleId`]; the root module is
/// always [`ModuleId::ROOT`]. Built by [`super::ModuleTreeBuilder`].
#[derive(Debug)]
pub struct ModuleTree {
    pub(crate) modules: Vec<Module>,
    pub(crate) by_path: HashMap<String, ModuleId>,
    pub(crate) root_inputs: BTreeMap<String, Value>,
    pub(crate) ignores: HashMap<PathBuf, Vec<IgnoreDirective>>,
    pub(crate) files: Vec<PathBuf>,
    pub(crate) diagnostics: Vec<String>,
    pub(crate) max_depth: usize,
    pub(crate) max_instances: usize,
}

impl ModuleTree {
    pub(crate) fn new(max_depth: usize, max_instances: usize) -> Self {
        Self {
            modules: Vec::new(),
            by_path: HashMap::new(),
            root_inputs: BTreeMap::new(),
            ignores: HashMap::new(),
            files: Vec::new(),
            diagnostics: Vec::new(),
            max_depth,
            max_instances,
        }
    }

    /// The root module.
    ///
    /// # Panics
    ///
    /// Never for trees produced by the builder, which always creates a root.
    #[must_use]
    pub fn root(&self) -> &Module {
        &self.modules[ModuleId::ROOT.index()]
    }

    /// A module by id.
    #[must_use]
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.index()]
    }

    /// All module instances, root first.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// A module by path (`""` is the root).
    #[must_use]
    pub fn module_by_path(&self, path: &str) -> Option<&Module> {
        self.by_path.get(path).map(|id| self.module(*id))
    }

    /// Every top-level block of every module.
    pub fn all_blocks(&self) -> impl Iterator<Item = (&Module, &Block)> {
        self.modules
            .iter()
            .flat_map(|m| m.blocks().iter().map(move |b| (m, b)))
    }

    /// Number of top-level blocks across modules.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.modules.iter().map(|m| m.blocks().len()).sum()
    }

    /// Root module input value (`.tfvars` or configured), if given.
    #[must_use]
    pub fn root_input(&self, name: &str) -> Option<&Value> {
        self.root_inputs.get(name)
    }

    /// Inline ignore directives of a file.
    #[must_use]
    pub fn ignores_for(&self, file: &Path) -> &[IgnoreDirective] {
        self.ignores.get(file).map_or(&[], Vec::as_slice)
    }

    /// Files that contributed blocks.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Problems recorded while building (module-source cycles, unloadable
    /// sources, capped expansions).
    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// An evaluator over this tree.
    #[must_use]
    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(self)
    }

    /// The `module` block in the parent that created `module`.
    #[must_use]
    pub fn call_block(&self, module: &Module) -> Option<&Block> {
        let parent = self.module(module.parent()?);
        let call = module.call_site()?;
        parent
            .module_calls(&call.name)
            .into_iter()
            .find(|b| b.instance_key() == call.key.as_ref())
    }

    /// The module declaring call `name`, searching `from` and then its
    /// ancestors.
    #[must_use]
    pub fn find_call_owner(&self, from: ModuleId, name: &str) -> Option<&Module> {
        let mut current = Some(from);
        while let Some(id) = current {
            let module = self.module(id);
            if module.is_declared("module", &[name]) {
                return Some(module);
            }
            current = module.parent();
        }
        None
    }

    /// Child module instances of call `name` on `owner`, narrowed to `key`
    /// when given.
    #[must_use]
    pub fn call_instances(&self, owner: &Module, name: &str, key: Option<&InstanceKey>) -> Vec<&Module> {
        owner
            .child_instances(name)
            .iter()
            .map(|id| self.module(*id))
            .filter(|m| key.is_none() || m.call_site().and_then(|c| c.key.as_ref()) == key)
            .collect()
    }
}
