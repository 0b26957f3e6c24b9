//! Dump a scene graph as a graphviz diagram.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::node::NodeRef;

/// Flatten the graph under `root` into a [`DiGraph`]: node weights are class
/// names, edge weights are child indices. Shared subgraphs appear once.
pub fn scene_graph(root: &NodeRef) -> DiGraph<String, usize> {
    let mut graph = DiGraph::new();
    let mut seen: HashMap<usize, NodeIndex> = HashMap::new();
    visit(root, &mut graph, &mut seen);
    graph
}

fn visit(
    node: &NodeRef,
    graph: &mut DiGraph<String, usize>,
    seen: &mut HashMap<usize, NodeIndex>,
) -> NodeIndex {
    let id = crate::node::node_addr(node);
    if let Some(&ix) = seen.get(&id) {
        return ix;
    }
    let ix = graph.add_node(node.class().tag().name());
    seen.insert(id, ix);
    if let Some(children) = node.children() {
        for (i, child) in children.snapshot().iter().enumerate() {
            let child_ix = visit(child, graph, seen);
            graph.add_edge(ix, child_ix, i);
        }
    }
    ix
}

pub fn write_dot<N, E>(filename: &str, graph: &DiGraph<N, E>, config: &[petgraph::dot::Config])
where
    N: core::fmt::Display,
    E: core::fmt::Display,
{
    let dot = to_dot(graph, config);
    std::fs::write(filename, dot).unwrap();
}

pub fn to_dot<N, E>(graph: &DiGraph<N, E>, config: &[petgraph::dot::Config]) -> String
where
    N: core::fmt::Display,
    E: core::fmt::Display,
{
    use petgraph::dot::Dot;

    let dot = format!(
        "{}",
        Dot::with_attr_getters(
            &graph,
            config,
            &|_, _| "bgcolor=\"#222222\"  fontcolor = \"#777777\" color = \"#777777\" ".to_string(),
            &|_, _| {
                "bgcolor=\"#222222\"  fontcolor = \"#cccccc\" color = \"#cccccc\" ".to_string()
            }
        )
    );
    dot.replace("digraph {", "digraph {\n    bgcolor=\"#131313\" ")
}
