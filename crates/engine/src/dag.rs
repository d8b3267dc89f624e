//! DAG checks: run on every loaded document and used by the editor before
//! committing a new connection.
//!
//! Rules enforced by [`check_structure`]:
//! 1. Node IDs and connection IDs must be unique.
//! 2. Every connection must reference existing nodes (both ends).
//! 3. No self loops.
//! 4. At most one trigger, and it has no incoming connections.
//! 5. The directed graph must be acyclic (topological sort must succeed).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::WorkflowGraph;
use crate::models::{Connection, Node, NodeId, NodeKind};
use crate::EngineError;

/// Validate a node/connection set and return node IDs in topological order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] / [`EngineError::DuplicateConnectionId`]
/// - [`EngineError::UnknownNodeReference`] if a connection names a missing node.
/// - [`EngineError::SelfLoop`]
/// - [`EngineError::TriggerAlreadyConfigured`] for a second trigger.
/// - [`EngineError::TriggerHasInputs`] if a trigger is a connection target.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn check_structure(
    nodes: &[Node],
    connections: &[Connection],
) -> Result<Vec<NodeId>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Unique IDs
    // -----------------------------------------------------------------------
    let mut seen_nodes: HashSet<NodeId> = HashSet::new();
    for node in nodes {
        if !seen_nodes.insert(node.id) {
            return Err(EngineError::DuplicateNodeId(node.id));
        }
    }

    let mut seen_connections = HashSet::new();
    for conn in connections {
        if !seen_connections.insert(conn.id) {
            return Err(EngineError::DuplicateConnectionId(conn.id));
        }
    }

    // -----------------------------------------------------------------------
    // 2. + 3. Connection endpoints
    // -----------------------------------------------------------------------
    for conn in connections {
        if !seen_nodes.contains(&conn.source_id) {
            return Err(EngineError::UnknownNodeReference {
                connection_id: conn.id,
                node_id: conn.source_id,
                side: "source",
            });
        }
        if !seen_nodes.contains(&conn.target_id) {
            return Err(EngineError::UnknownNodeReference {
                connection_id: conn.id,
                node_id: conn.target_id,
                side: "target",
            });
        }
        if conn.source_id == conn.target_id {
            return Err(EngineError::SelfLoop(conn.source_id));
        }
    }

    // -----------------------------------------------------------------------
    // 4. Trigger shape
    // -----------------------------------------------------------------------
    let mut triggers = nodes.iter().filter(|n| n.kind == NodeKind::Trigger);
    if let Some(trigger) = triggers.next() {
        if triggers.next().is_some() {
            return Err(EngineError::TriggerAlreadyConfigured);
        }
        if connections.iter().any(|c| c.target_id == trigger.id) {
            return Err(EngineError::TriggerHasInputs(trigger.id));
        }
    }

    // -----------------------------------------------------------------------
    // 5. Topological sort
    // -----------------------------------------------------------------------
    let sorted = kahn(nodes, connections);

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

/// Node IDs of `graph` in topological order, ties broken by insertion order.
///
/// # Errors
/// [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn topological_order(graph: &WorkflowGraph) -> Result<Vec<NodeId>, EngineError> {
    let sorted = kahn(graph.all_nodes(), graph.all_connections());
    if sorted.len() != graph.len() {
        return Err(EngineError::CycleDetected);
    }
    Ok(sorted)
}

/// Kahn's algorithm. Returns fewer IDs than `nodes` when a cycle exists.
fn kahn(nodes: &[Node], connections: &[Connection]) -> Vec<NodeId> {
    // Build adjacency list and in-degree map.
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut in_degree: HashMap<NodeId, usize> = HashMap::new();

    for node in nodes {
        adjacency.entry(node.id).or_default();
        in_degree.entry(node.id).or_insert(0);
    }

    for conn in connections {
        adjacency.entry(conn.source_id).or_default().push(conn.target_id);
        *in_degree.entry(conn.target_id).or_insert(0) += 1;
    }

    // Seed with nodes that have no incoming edges, oldest first.
    let mut queue: VecDeque<NodeId> = nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id);

        if let Some(neighbours) = adjacency.get(&node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    sorted
}

/// Returns `true` if `to` can be reached from `from` by following connections.
///
/// A node always reaches itself.
pub fn reaches(graph: &WorkflowGraph, from: NodeId, to: NodeId) -> bool {
    let mut stack = vec![from];
    let mut visited = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        stack.extend(graph.outgoing(current).iter().map(|c| c.target_id));
    }

    false
}
