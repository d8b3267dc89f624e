//! Ancestry resolver: which earlier steps can feed values into a node.

use std::collections::{HashSet, VecDeque};

use crate::dag;
use crate::graph::WorkflowGraph;
use crate::models::{Node, NodeId};
use crate::EngineError;

/// Every node that causally precedes `node_id`, ordered from the trigger
/// (earliest) to the immediate predecessor (latest).
///
/// Reverse breadth-first walk over incoming connections. The visited set
/// covers ancestors reachable along several paths after a merge, and keeps
/// the walk finite even if the graph somehow contained a cycle.
///
/// # Errors
/// [`EngineError::NoSuchNode`] if `node_id` is not in the graph.
pub fn ancestors_of(graph: &WorkflowGraph, node_id: NodeId) -> Result<Vec<&Node>, EngineError> {
    if !graph.contains(node_id) {
        return Err(EngineError::NoSuchNode(node_id));
    }

    let mut visited: HashSet<NodeId> = HashSet::from([node_id]);
    let mut discovered: Vec<NodeId> = Vec::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([node_id]);

    while let Some(current) = queue.pop_front() {
        for conn in graph.incoming(current) {
            if visited.insert(conn.source_id) {
                discovered.push(conn.source_id);
                queue.push_back(conn.source_id);
            }
        }
    }

    let ordered: Vec<NodeId> = match dag::topological_order(graph) {
        Ok(order) => order.into_iter().filter(|id| discovered.contains(id)).collect(),
        // Unreachable for graphs built by the editor; farthest-first is the
        // best order a cyclic graph allows.
        Err(_) => discovered.into_iter().rev().collect(),
    };

    Ok(ordered
        .into_iter()
        .filter_map(|id| graph.get_node(id))
        .collect())
}
