//! Reference graph.
//!
//! A directed graph of the top-level blocks of a [`ModuleTree`], with an
//! edge from a block to every block one of its attributes resolves to.
//!
//! ```text
//! aws_ebs_volume.data ──kms_key_id──▶ data.aws_kms_key.ebs
//!                                           │
//!                                        key_id
//!                                           ▼
//!                                      var.alias
//! ```
//!
//! # Implementation Details
//!
//! We use `petgraph::Graph<GraphNode, GraphEdge, Directed>`. Nodes are
//! indexed twice: by petgraph `NodeIndex` for traversal, and by qualified
//! address (e.g. `module.network[0].aws_subnet.a`) through a
//! `HashMap<String, NodeIndex>` for lookups.
//!
//! Only references that resolve become edges; `NotFound` and `Cycle`
//! outcomes are dropped.
//!
//! # Example
//!
//! ```rust
//! use tfsieve::graph::ReferenceGraph;
//! use tfsieve::parser::{HclParser, Parser};
//! use tfsieve::{Config, ModuleTreeBuilder};
//! use std::path::Path;
//!
//! let content = r#"
//! resource "aws_kms_key" "k" {}
//! resource "aws_ebs_volume" "v" {
//!   kms_key_id = aws_kms_key.k.arn
//! }
//! "#;
//! let file = HclParser::new(&Config::default())
//!     .parse_content(content, Path::new("main.tf"))
//!     .unwrap();
//! let tree = ModuleTreeBuilder::new(&Config::default()).build(vec![file], None);
//!
//! let graph = ReferenceGraph::build(&tree);
//! assert_eq!(graph.dependencies_of("aws_ebs_volume.v"), vec!["aws_kms_key.k"]);
//! ```

mod export;

use crate::model::{Block, ModuleTree};
use crate::types::Location;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;

/// A block in the graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    /// Qualified address
    pub address: String,
    /// Block type (`resource`, `data`, `variable`, ...)
    pub block_type: String,
    /// Declaration site
    pub location: Location,
}

/// A resolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    /// Referencing attribute
    pub attribute: String,
    /// Expression as written
    pub expression: String,
}

/// Reference graph of a module tree.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    inner: DiGraph<GraphNode, GraphEdge>,
    node_index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    /// Build the graph of every top-level block in `tree`.
    #[must_use]
    pub fn build(tree: &ModuleTree) -> Self {
        let mut graph = Self::default();
        for (_, block) in tree.all_blocks() {
            graph.add_block(block);
        }

        for (_, block) in tree.all_blocks() {
            let from = graph.add_block(block);
            for reference in tree.references(block) {
                let to = graph.add_block(reference.target);
                let edge = GraphEdge {
                    attribute: reference.attribute,
                    expression: reference.expression,
                };
                let duplicate = graph
                    .inner
                    .edges_connecting(from, to)
                    .any(|e| *e.weight() == edge);
                if !duplicate {
                    graph.inner.add_edge(from, to, edge);
                }
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built reference graph"
        );
        graph
    }

    fn add_block(&mut self, block: &Block) -> NodeIndex {
        let address = block.qualified_address();
        if let Some(idx) = self.node_index.get(&address) {
            return *idx;
        }
        let idx = self.inner.add_node(GraphNode {
            address: address.clone(),
            block_type: block.block_type().to_string(),
            location: block.location().clone(),
        });
        self.node_index.insert(address, idx);
        idx
    }

    /// Number of blocks.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of reference edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// A node by qualified address.
    #[must_use]
    pub fn node(&self, address: &str) -> Option<&GraphNode> {
        self.node_index.get(address).map(|idx| &self.inner[*idx])
    }

    /// All nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner.node_weights()
    }

    /// All edges as `(from, to, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode, &GraphEdge)> {
        self.inner
            .edge_references()
            .map(|e| (&self.inner[e.source()], &self.inner[e.target()], e.weight()))
    }

    /// Addresses `address` refers to directly, sorted.
    #[must_use]
    pub fn dependencies_of(&self, address: &str) -> Vec<&str> {
        self.neighbors(address, petgraph::Direction::Outgoing)
    }

    /// Addresses referring to `address` directly, sorted.
    #[must_use]
    pub fn dependents_of(&self, address: &str) -> Vec<&str> {
        self.neighbors(address, petgraph::Direction::Incoming)
    }

    fn neighbors(&self, address: &str, direction: petgraph::Direction) -> Vec<&str> {
        let Some(idx) = self.node_index.get(address) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .inner
            .neighbors_directed(*idx, direction)
            .map(|n| self.inner[n].address.as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Groups of blocks that reference each other in a loop.
    ///
    /// Strongly connected components with more than one block, plus blocks
    /// referencing themselves. Each group and the list are sorted.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|n| self.inner.contains_edge(*n, *n))
            })
            .map(|scc| {
                let mut group: Vec<String> =
                    scc.iter().map(|n| self.inner[*n].address.clone()).collect();
                group.sort();
                group
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Render as Graphviz DOT.
    #[must_use]
    pub fn to_dot(&self) -> String {
        export::to_dot(self)
    }
}
