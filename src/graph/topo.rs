//! Topological ordering of the build graph.

use super::{Node, NodeId};
use crate::error::BuildError;

/// Visitation state of a node during the depth-first traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Unstarted,
    Working,
    Finished,
}

/// Produce a reverse post-order over `nodes`: for every edge `u → v`, `u`
/// precedes `v`.
///
/// The traversal keeps an explicit stack of `(node, next-edge)` frames so
/// arbitrarily deep graphs cannot overflow the call stack. An edge into a
/// `Working` node is a back edge, which proves a cycle.
pub(crate) fn sort(nodes: &[Node]) -> Result<Vec<NodeId>, BuildError> {
    let mut color = vec![Color::Unstarted; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    for root in 0..nodes.len() {
        if color[root] != Color::Unstarted {
            continue;
        }
        color[root] = Color::Working;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let u = frame.0;
            let next = nodes[u].out_edges.get(frame.1).copied();
            frame.1 += 1;
            match next {
                Some(v) => match color[v] {
                    Color::Unstarted => {
                        color[v] = Color::Working;
                        stack.push((v, 0));
                    }
                    Color::Working => {
                        return Err(BuildError::Cycle(nodes[v].path.clone()));
                    }
                    Color::Finished => {}
                },
                None => {
                    color[u] = Color::Finished;
                    order.push(u);
                    stack.pop();
                }
            }
        }
    }

    order.reverse();
    Ok(order)
}
