//! Graph wrapper using petgraph::StableDiGraph with custom NodeId/EdgeId

use crate::model::*;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::path::Path;

/// A directed multigraph with stable node/edge indices.
///
/// Node and edge indices follow insertion order, so iteration over a graph
/// built without removals is deterministic.
#[derive(Clone)]
pub struct Graph {
    inner: StableDiGraph<GraphNode, GraphEdge>,
}

/// Nodes and edges parsed from exactly one commit.
pub type StructuralGraph = Graph;

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            inner: StableDiGraph::new(),
        }
    }

    /// Add a node to graph. Returns assigned NodeId and stores it on the node.
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let idx = self.inner.add_node(node);
        let id = NodeId(idx.index() as u64);
        if let Some(weight) = self.inner.node_weight_mut(idx) {
            weight.id = id;
        }
        id
    }

    /// Add an edge to graph. Returns assigned EdgeId, or `None` when an endpoint is missing.
    pub fn add_edge(&mut self, edge: GraphEdge) -> Option<EdgeId> {
        let source = NodeIndex::new(edge.source.0 as usize);
        let target = NodeIndex::new(edge.target.0 as usize);
        if !self.inner.contains_node(source) || !self.inner.contains_node(target) {
            return None;
        }
        let idx = self.inner.add_edge(source, target, edge);
        let id = EdgeId(idx.index() as u64);
        if let Some(weight) = self.inner.edge_weight_mut(idx) {
            weight.id = id;
        }
        Some(id)
    }

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        let idx = NodeIndex::new(id.0 as usize);
        self.inner.node_weight(idx)
    }

    /// Get a mutable node by ID.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        let idx = NodeIndex::new(id.0 as usize);
        self.inner.node_weight_mut(idx)
    }

    /// Get an edge by ID.
    pub fn edge(&self, id: EdgeId) -> Option<&GraphEdge> {
        let idx = EdgeIndex::new(id.0 as usize);
        self.inner.edge_weight(idx)
    }

    /// Get a mutable edge by ID.
    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut GraphEdge> {
        let idx = EdgeIndex::new(id.0 as usize);
        self.inner.edge_weight_mut(idx)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all nodes in insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate over all edges in insertion order.
    pub fn all_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Get all outgoing edges from a node.
    pub fn edges_from(&self, source: NodeId) -> impl Iterator<Item = &GraphEdge> {
        let idx = NodeIndex::new(source.0 as usize);
        self.inner
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(move |edge_ref| self.inner.edge_weight(edge_ref.id()))
    }

    /// Get all incoming edges to a node.
    pub fn edges_to(&self, target: NodeId) -> impl Iterator<Item = &GraphEdge> {
        let idx = NodeIndex::new(target.0 as usize);
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .filter_map(move |edge_ref| self.inner.edge_weight(edge_ref.id()))
    }

    /// Check if an edge exists between two nodes of a specific kind.
    pub fn has_edge_between(&self, source: NodeId, target: NodeId, kind: EdgeKind) -> bool {
        self.edges_from(source)
            .any(|e| e.target == target && e.kind == kind)
    }

    /// Find a node by fully qualified name.
    pub fn find_node_by_qualified(&self, qualified_name: &str) -> Option<NodeId> {
        self.all_nodes()
            .find(|n| n.qualified_name == qualified_name)
            .map(|n| n.id)
    }

    /// Find a node by kind and identity key.
    pub fn find_by_key(&self, kind: NodeKind, key: &str) -> Option<NodeId> {
        self.all_nodes()
            .find(|n| n.kind == kind && identity_key(n) == key)
            .map(|n| n.id)
    }

    /// Get all nodes of a specific kind.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_ {
        self.all_nodes()
            .filter(move |n| n.kind == kind)
            .map(|n| n.id)
    }

    /// Nodes declared in the given relative file path.
    pub fn nodes_in_file<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.all_nodes().filter(move |n| n.file_path == path)
    }

    /// The type declaring a member, following the incoming `Declares` edge.
    pub fn enclosing_type(&self, member: NodeId) -> Option<NodeId> {
        self.edges_to(member)
            .find(|e| {
                e.kind == EdgeKind::Declares
                    && self.node(e.source).is_some_and(|n| n.kind == NodeKind::Type)
            })
            .map(|e| e.source)
    }

    /// Stamp every node with one version, as produced by a single-snapshot run.
    pub fn stamp_version(&mut self, commit: &str) {
        for idx in self.inner.node_indices().collect::<Vec<_>>() {
            if let Some(node) = self.inner.node_weight_mut(idx) {
                node.versions.insert(commit.to_string());
                node.first_version.get_or_insert_with(|| commit.to_string());
                node.last_version = Some(commit.to_string());
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns the working tree of one commit into a [`StructuralGraph`].
///
/// Implementations must assign identity keys deterministically: parsing the
/// same tree twice yields the same keys.
pub trait SnapshotParser {
    fn parse(&self, root: &Path, commit: &CommitInfo) -> anyhow::Result<StructuralGraph>;
}
