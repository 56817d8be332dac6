//! Fold a chain of pairwise merges into one multi-version graph

use crate::graph::Graph;
use crate::matcher::{KindKey, StatusCounts};
use crate::merger::{EdgeDeduper, MergedGraph};
use crate::model::*;
use std::collections::{BTreeMap, HashMap};

/// Running multi-version graph, joined across pairs by (kind, identity key).
#[derive(Debug, Default)]
pub struct TimelineAggregator {
    graph: Graph,
    index: HashMap<KindKey, NodeId>,
    edges: EdgeDeduper,
    commits: Vec<CommitInfo>,
    catalog: BTreeMap<CommitId, CommitInfo>,
    pairs: usize,
}

impl TimelineAggregator {
    pub fn new() -> Self {
        TimelineAggregator::default()
    }

    /// Aggregate pairs given oldest first.
    pub fn aggregate<'a>(pairs: impl IntoIterator<Item = &'a MergedGraph>) -> Self {
        let mut aggregator = TimelineAggregator::new();
        for merged in pairs {
            aggregator.fold(merged);
        }
        aggregator
    }

    /// Fold the next (newer) pair into the running graph.
    pub fn fold(&mut self, merged: &MergedGraph) {
        self.record_commit(&merged.pair.from);
        self.record_commit(&merged.pair.to);
        for (id, info) in &merged.catalog {
            self.catalog.entry(id.clone()).or_insert_with(|| info.clone());
        }

        let mut local: HashMap<NodeId, NodeId> = HashMap::new();
        let mut joined = 0;
        for node in merged.graph.all_nodes() {
            let key = (node.kind, identity_key(node));
            let existing = self.index.get(&key).copied().or_else(|| self.reindex_renamed(node, &key));
            let id = match existing.and_then(|id| self.graph.node_mut(id).map(|n| (id, n))) {
                Some((id, current)) => {
                    update_node(current, node);
                    joined += 1;
                    id
                }
                None => {
                    let id = self.graph.add_node(node.clone());
                    self.index.insert(key, id);
                    id
                }
            };
            local.insert(node.id, id);
        }

        let mut added_edges = 0;
        for edge in merged.graph.all_edges() {
            let (Some(&source), Some(&target)) = (local.get(&edge.source), local.get(&edge.target))
            else {
                continue;
            };
            if self.edges.insert(&mut self.graph, edge.with_endpoints(source, target)) {
                added_edges += 1;
            }
        }

        self.pairs += 1;
        tracing::info!(
            "Folded pair {} ({}..{}): {} nodes joined, {} total nodes, {} new edges",
            self.pairs,
            merged.pair.from.short_id,
            merged.pair.to.short_id,
            joined,
            self.graph.node_count(),
            added_edges
        );
    }

    /// Move a node indexed under its former identity to its new key.
    fn reindex_renamed(&mut self, node: &GraphNode, key: &KindKey) -> Option<NodeId> {
        let old_key = (node.kind, node.meta(meta::RENAMED_FROM)?.to_string());
        let id = self.index.remove(&old_key)?;
        tracing::debug!("Re-indexing {} as {}", old_key.1, key.1);
        self.index.insert(key.clone(), id);
        Some(id)
    }

    fn record_commit(&mut self, commit: &CommitInfo) {
        if self.commits.iter().all(|c| c.id != commit.id) {
            self.commits.push(commit.clone());
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Commits seen so far, oldest first.
    pub fn commits(&self) -> &[CommitInfo] {
        &self.commits
    }

    pub fn catalog(&self) -> &BTreeMap<CommitId, CommitInfo> {
        &self.catalog
    }

    pub fn pair_count(&self) -> usize {
        self.pairs
    }

    /// `V0` for the newest commit, `V-1` for its predecessor and so on.
    pub fn version_label(&self, commit: &str) -> Option<String> {
        let position = self.commits.iter().position(|c| c.id == commit)?;
        let back = self.commits.len() - 1 - position;
        Some(if back == 0 { "V0".to_string() } else { format!("V-{back}") })
    }

    /// Labels for every commit, oldest first.
    pub fn labels(&self) -> Vec<(String, &CommitInfo)> {
        self.commits
            .iter()
            .filter_map(|c| self.version_label(&c.id).map(|label| (label, c)))
            .collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.graph.all_nodes().filter_map(|n| n.version_status) {
            counts.record(status);
        }
        counts
    }
}

/// Take the newer pair's snapshot and status, keeping accumulated history.
fn update_node(current: &mut GraphNode, newer: &GraphNode) {
    let mut versions = std::mem::take(&mut current.versions);
    versions.extend(newer.versions.iter().cloned());
    let first = current.first_version.take().or_else(|| newer.first_version.clone());
    let id = current.id;

    let renamed_from = current.metadata.remove(meta::RENAMED_FROM);

    *current = newer.clone();
    current.id = id;
    if let Some(old_key) = renamed_from {
        current.metadata.entry(meta::RENAMED_FROM.to_string()).or_insert(old_key);
    }
    current.versions = versions;
    current.first_version = first;
    if current.last_version.is_none() {
        current.last_version = newer.last_version.clone();
    }
}
