//! Graphviz DOT rendering of the reference graph.

use super::ReferenceGraph;
use std::fmt::Write;

/// Render `graph` as DOT. Nodes are grouped into one cluster per module.
pub(super) fn to_dot(graph: &ReferenceGraph) -> String {
    let mut dot = String::new();
    dot.push_str("digraph tfsieve {\n");
    dot.push_str("    rankdir=LR;\n");
    dot.push_str("    node [shape=box, style=rounded];\n\n");

    let mut modules: Vec<Option<&str>> = graph
        .nodes()
        .map(|n| n.location.module.as_deref())
        .collect();
    modules.sort_unstable();
    modules.dedup();

    for (i, module) in modules.iter().enumerate() {
        let indent = if module.is_some() { "        " } else { "    " };
        if let Some(path) = module {
            let _ = writeln!(dot, "    subgraph cluster_{i} {{");
            let _ = writeln!(dot, "        label=\"{}\";", escape_dot_string(path));
            dot.push_str("        style=dashed;\n");
        }
        for node in graph.nodes().filter(|n| n.location.module.as_deref() == *module) {
            let _ = writeln!(
                dot,
                "{indent}\"{}\" [{}];",
                escape_dot_string(&node.address),
                node_style(&node.block_type)
            );
        }
        if module.is_some() {
            dot.push_str("    }\n");
        }
    }
    dot.push('\n');

    for (from, to, edge) in graph.edges() {
        let _ = writeln!(
            dot,
            "    \"{}\" -> \"{}\" [label=\"{}\"];",
            escape_dot_string(&from.address),
            escape_dot_string(&to.address),
            escape_dot_string(&edge.attribute)
        );
    }

    dot.push_str("}\n");
    dot
}

fn node_style(block_type: &str) -> &'static str {
    match block_type {
        "data" => "fillcolor=lightblue, style=\"rounded,filled\"",
        "variable" | "locals" | "output" => "shape=ellipse",
        "module" => "fillcolor=lightyellow, style=\"rounded,filled\"",
        _ => "fillcolor=white, style=\"rounded,filled\"",
    }
}

/// Escape a string for use in DOT labels.
fn escape_dot_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
