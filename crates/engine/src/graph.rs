//! The node graph model: authoritative store of nodes and connections.
//!
//! Only referential integrity is enforced here (a connection must name
//! existing nodes). Business rules live in [`WorkflowEditor`](crate::WorkflowEditor),
//! which is the only writer.

use crate::dag;
use crate::models::{Connection, ConnectionId, Node, NodeId, NodeKind, WorkflowDocument};
use crate::status::NodeStatus;
use crate::EngineError;

/// Nodes in insertion order plus the directed connections between them.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    next_node_id: u64,
    next_connection_id: u64,
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
            next_node_id: 1,
            next_connection_id: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only queries
    // -----------------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get_node(id).is_some()
    }

    /// Connections leaving `id`, in creation order.
    pub fn outgoing(&self, id: NodeId) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.source_id == id).collect()
    }

    /// Connections entering `id`, in creation order.
    pub fn incoming(&self, id: NodeId) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.target_id == id).collect()
    }

    /// All nodes, oldest first.
    pub fn all_nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn all_connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn trigger(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Trigger)
    }

    /// The most recently added node that still exists.
    pub fn last_node(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn connection_between(&self, source: NodeId, target: NodeId) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.source_id == source && c.target_id == target)
    }

    // -----------------------------------------------------------------------
    // Writes (crate-private; the editor owns the rules)
    // -----------------------------------------------------------------------

    pub(crate) fn peek_node_id(&self) -> NodeId {
        NodeId(self.next_node_id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Append `node`, optionally connected from `source`.
    ///
    /// The node's ID must be the one returned by [`peek_node_id`](Self::peek_node_id).
    pub(crate) fn insert_node(
        &mut self,
        node: Node,
        source: Option<NodeId>,
    ) -> Result<Option<ConnectionId>, EngineError> {
        if let Some(source) = source {
            if !self.contains(source) {
                return Err(EngineError::NoSuchNode(source));
            }
        }

        let node_id = node.id;
        self.next_node_id = self.next_node_id.max(node_id.0 + 1);
        self.nodes.push(node);

        Ok(source.map(|source| self.push_connection(source, node_id)))
    }

    /// Add an edge between two existing nodes.
    pub(crate) fn insert_connection(
        &mut self,
        source: NodeId,
        target: NodeId,
    ) -> Result<ConnectionId, EngineError> {
        for id in [source, target] {
            if !self.contains(id) {
                return Err(EngineError::NoSuchNode(id));
            }
        }
        Ok(self.push_connection(source, target))
    }

    fn push_connection(&mut self, source: NodeId, target: NodeId) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        self.connections.push(Connection {
            id,
            source_id: source,
            target_id: target,
        });
        id
    }

    /// Remove a node and every connection touching it.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<(Node, Vec<Connection>)> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        let node = self.nodes.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) =
            self.connections.drain(..).partition(|c| c.touches(id));
        self.connections = kept;

        Some((node, removed))
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Rebuild a graph from a document after running the structural checks.
    ///
    /// A persisted `Running` status is reset to `Configured`: no test can be
    /// in flight across a load.
    pub fn from_document(doc: &WorkflowDocument) -> Result<Self, EngineError> {
        dag::check_structure(&doc.nodes, &doc.connections)?;

        let mut nodes = doc.nodes.clone();
        for node in &mut nodes {
            if node.status == NodeStatus::Running {
                node.status = NodeStatus::Configured;
            }
        }

        let next_node_id = nodes.iter().map(|n| n.id.0).max().unwrap_or(0) + 1;
        let next_connection_id = doc.connections.iter().map(|c| c.id.0).max().unwrap_or(0) + 1;

        Ok(Self {
            nodes,
            connections: doc.connections.clone(),
            next_node_id,
            next_connection_id,
        })
    }

    pub fn to_document(&self, flow_name: impl Into<String>) -> WorkflowDocument {
        WorkflowDocument {
            flow_name: flow_name.into(),
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn node(graph: &WorkflowGraph, kind: NodeKind) -> Node {
        Node::new(graph.peek_node_id(), kind, "mock", None)
    }

    #[test]
    fn queries_follow_connections() {
        let mut graph = WorkflowGraph::new();
        let a = node(&graph, NodeKind::Trigger);
        graph.insert_node(a, None).unwrap();
        let b = node(&graph, NodeKind::Action);
        let conn = graph.insert_node(b, Some(NodeId(1))).unwrap();

        assert!(conn.is_some());
        assert_eq!(graph.outgoing(NodeId(1)).len(), 1);
        assert_eq!(graph.incoming(NodeId(2)).len(), 1);
        assert!(graph.incoming(NodeId(1)).is_empty());
        assert_eq!(graph.last_node().map(|n| n.id), Some(NodeId(2)));
        assert_eq!(graph.trigger().map(|n| n.id), Some(NodeId(1)));
    }

    #[test]
    fn insert_with_missing_source_leaves_graph_untouched() {
        let mut graph = WorkflowGraph::new();
        let before = graph.clone();
        let orphan = node(&graph, NodeKind::Action);

        assert_eq!(
            graph.insert_node(orphan, Some(NodeId(42))),
            Err(EngineError::NoSuchNode(NodeId(42)))
        );
        assert_eq!(graph, before);
    }

    #[test]
    fn remove_node_cascades_to_connections() {
        let mut graph = WorkflowGraph::new();
        graph.insert_node(node(&graph, NodeKind::Trigger), None).unwrap();
        graph.insert_node(node(&graph, NodeKind::Action), Some(NodeId(1))).unwrap();
        graph.insert_node(node(&graph, NodeKind::Action), Some(NodeId(2))).unwrap();

        let (removed, conns) = graph.remove_node(NodeId(2)).unwrap();
        assert_eq!(removed.id, NodeId(2));
        assert_eq!(conns.len(), 2);
        assert!(graph.all_connections().is_empty());
        assert!(graph.remove_node(NodeId(2)).is_none());
    }

    #[test]
    fn ids_are_never_reused_after_deletion() {
        let mut graph = WorkflowGraph::new();
        graph.insert_node(node(&graph, NodeKind::Trigger), None).unwrap();
        graph.remove_node(NodeId(1));
        assert_eq!(graph.peek_node_id(), NodeId(2));
    }

    #[test]
    fn document_load_resets_running_status_and_continues_ids() {
        let mut graph = WorkflowGraph::new();
        graph.insert_node(node(&graph, NodeKind::Trigger), None).unwrap();
        graph.node_mut(NodeId(1)).unwrap().status = NodeStatus::Running;

        let doc = graph.to_document("flow");
        let loaded = WorkflowGraph::from_document(&doc).unwrap();

        assert_eq!(loaded.get_node(NodeId(1)).unwrap().status, NodeStatus::Configured);
        assert_eq!(loaded.peek_node_id(), NodeId(2));
    }
}
