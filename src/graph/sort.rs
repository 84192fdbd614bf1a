//! Dependency ordering of graph nodes.

use crate::error::{ForgeError, ForgeResult};
use crate::graph::edge::Edge;
use crate::graph::node::{Node, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Producers-before-consumers order.
///
/// Depth-first post-order over producer links, started from every sink
/// (a node none of whose outputs is consumed) in declaration order and then
/// from every node not reached yet. Meeting a node that is still on the
/// active path means the graph has a cycle.
pub fn topological_order(nodes: &[Node], edges: &[Edge]) -> ForgeResult<Vec<NodeId>> {
    let is_sink = |node: &Node| {
        node.outputs
            .iter()
            .all(|e| edges[e.0].consumers.is_empty())
    };
    let roots = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| is_sink(n))
        .map(|(i, _)| NodeId(i))
        .chain((0..nodes.len()).map(NodeId));

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    // (node, index of the next input port to visit)
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    for root in roots {
        if marks[root.0] != Mark::Unvisited {
            continue;
        }
        marks[root.0] = Mark::OnPath;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (id, port) = *top;
            let node = &nodes[id.0];
            if port < node.inputs.len() {
                top.1 += 1;
                let parent = edges[node.inputs[port].0].producer;
                match marks[parent.0] {
                    Mark::Unvisited => {
                        marks[parent.0] = Mark::OnPath;
                        stack.push((parent, 0));
                    }
                    Mark::OnPath => {
                        return Err(ForgeError::CyclicGraph(nodes[parent.0].name.clone()));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[id.0] = Mark::Done;
                order.push(id);
                stack.pop();
            }
        }
    }
    Ok(order)
}

/// Position of every node in `order`, indexed by node id.
pub fn positions(order: &[NodeId], node_count: usize) -> Vec<usize> {
    let mut positions = vec![usize::MAX; node_count];
    for (pos, id) in order.iter().enumerate() {
        positions[id.0] = pos;
    }
    positions
}
