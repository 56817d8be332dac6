//! Merge two matched snapshots into one graph with evolution edges

use crate::diagnostics::{Diagnostics, Side, Warning};
use crate::evolution::{endpoints, evolution_edge, member_change_edge, VersionFlow};
use crate::graph::Graph;
use crate::locate::{resolve, Resolution};
use crate::matcher::{MatchResult, SnapshotIndex, StatusCounts};
use crate::model::*;
use crate::refactoring::{CodeLocation, RefactoringOperation};
use std::collections::{BTreeMap, HashMap};

/// Detector name stored on evolution edges when none is configured.
pub const DEFAULT_DETECTOR: &str = "RefactoringMiner";

/// The two commits a merge spans, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionPair {
    pub from: CommitInfo,
    pub to: CommitInfo,
}

impl VersionPair {
    pub fn new(from: CommitInfo, to: CommitInfo) -> Self {
        VersionPair { from, to }
    }
}

/// Result of merging one pair of snapshots.
#[derive(Debug, Clone)]
pub struct MergedGraph {
    pub graph: Graph,
    pub v1_to_merged: HashMap<NodeId, NodeId>,
    pub v2_to_merged: HashMap<NodeId, NodeId>,
    pub pair: VersionPair,
    /// Commit metadata for every version appearing on a node.
    pub catalog: BTreeMap<CommitId, CommitInfo>,
}

impl MergedGraph {
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.graph.all_nodes().filter_map(|n| n.version_status) {
            counts.record(status);
        }
        counts
    }

    pub fn evolution_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.graph.all_edges().filter(|e| e.kind.is_evolution())
    }
}

/// Inserts edges into a graph once per (source, kind, target).
///
/// A duplicate with higher confidence replaces the stored edge's attributes.
#[derive(Debug, Default)]
pub struct EdgeDeduper {
    seen: HashMap<EdgeTriple, EdgeId>,
}

impl EdgeDeduper {
    pub fn new() -> Self {
        EdgeDeduper::default()
    }

    /// Returns `true` when the edge was added as a new triple.
    pub fn insert(&mut self, graph: &mut Graph, edge: GraphEdge) -> bool {
        let triple = edge.triple();
        if let Some(&existing) = self.seen.get(&triple) {
            if let Some(stored) = graph.edge_mut(existing) {
                if edge.confidence > stored.confidence {
                    stored.confidence = edge.confidence;
                    stored.label = edge.label;
                    stored.attributes = edge.attributes;
                }
            }
            return false;
        }
        match graph.add_edge(edge) {
            Some(id) => {
                self.seen.insert(triple, id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Builds a [`MergedGraph`] from two snapshots and their match result.
#[derive(Debug)]
pub struct GraphMerger {
    detected_by: String,
}

impl GraphMerger {
    pub fn new() -> Self {
        GraphMerger {
            detected_by: DEFAULT_DETECTOR.to_string(),
        }
    }

    /// Name recorded as `detectedBy` on evolution edges.
    pub fn with_detector(mut self, detected_by: impl Into<String>) -> Self {
        self.detected_by = detected_by.into();
        self
    }

    pub fn merge(
        &self,
        v1: &Graph,
        v2: &Graph,
        matched: &MatchResult,
        operations: &[RefactoringOperation],
        pair: &VersionPair,
        diagnostics: &mut Diagnostics,
    ) -> MergedGraph {
        let mut merged = MergedGraph {
            graph: Graph::new(),
            v1_to_merged: HashMap::new(),
            v2_to_merged: HashMap::new(),
            pair: pair.clone(),
            catalog: BTreeMap::new(),
        };
        merged.catalog.insert(pair.from.id.clone(), pair.from.clone());
        merged.catalog.insert(pair.to.id.clone(), pair.to.clone());

        self.merge_nodes(v1, v2, matched, pair, &mut merged);

        let mut dedup = EdgeDeduper::new();
        let structural = self.merge_structural_edges(v1, v2, &mut merged, &mut dedup);
        let evolution =
            self.synthesize_evolution_edges(v1, v2, matched, operations, &mut merged, &mut dedup, diagnostics);
        let propagated = self.propagate_member_evolution(v1, v2, &mut merged, &evolution, &mut dedup);

        let counts = merged.status_counts();
        tracing::info!(
            "Merged {}..{}: {} nodes ({} unchanged, {} modified, {} added, {} deleted), {} structural edges, {} evolution edges, {} propagated",
            pair.from.short_id,
            pair.to.short_id,
            merged.graph.node_count(),
            counts.unchanged,
            counts.modified,
            counts.added,
            counts.deleted,
            structural,
            evolution.len(),
            propagated
        );
        merged
    }

    fn merge_nodes(
        &self,
        v1: &Graph,
        v2: &Graph,
        matched: &MatchResult,
        pair: &VersionPair,
        merged: &mut MergedGraph,
    ) {
        let from = pair.from.id.as_str();
        let to = pair.to.id.as_str();

        for &v1_id in matched.v1_index.canonical_ids() {
            let Some(old) = matched.v1_index.node(v1, v1_id) else { continue };
            let status = matched
                .v1_status
                .get(&v1_id)
                .copied()
                .unwrap_or(VersionStatus::Deleted);

            let paired = matched
                .mapping
                .v2_for(v1_id)
                .and_then(|v2_id| matched.v2_index.node(v2, v2_id).map(|n| (v2_id, n)));
            let merged_id = match paired {
                Some((v2_id, new)) => {
                    let mut node = new.clone();
                    node.versions.extend(old.versions.iter().cloned());
                    node.versions.insert(from.to_string());
                    node.versions.insert(to.to_string());
                    node.first_version = Some(
                        old.first_version
                            .clone()
                            .unwrap_or_else(|| from.to_string()),
                    );
                    node.last_version = Some(to.to_string());
                    node.version_status = Some(status);
                    if let Some(rekey) = matched.rekey_for_v2(v2_id) {
                        node.metadata
                            .insert(meta::RENAMED_FROM.to_string(), rekey.old_key.clone());
                    }
                    let id = merged.graph.add_node(node);
                    merged.v2_to_merged.insert(v2_id, id);
                    id
                }
                None => {
                    let mut node = old.clone();
                    node.versions.insert(from.to_string());
                    node.first_version.get_or_insert_with(|| from.to_string());
                    node.last_version = Some(from.to_string());
                    node.version_status = Some(VersionStatus::Deleted);
                    merged.graph.add_node(node)
                }
            };
            merged.v1_to_merged.insert(v1_id, merged_id);
        }

        for &v2_id in matched.v2_index.canonical_ids() {
            if merged.v2_to_merged.contains_key(&v2_id) {
                continue;
            }
            let Some(new) = matched.v2_index.node(v2, v2_id) else { continue };
            let mut node = new.clone();
            node.versions.insert(to.to_string());
            node.first_version.get_or_insert_with(|| to.to_string());
            node.last_version = Some(to.to_string());
            node.version_status = Some(VersionStatus::Added);
            let id = merged.graph.add_node(node);
            merged.v2_to_merged.insert(v2_id, id);
        }

        alias_collisions(v1, &matched.v1_index, &mut merged.v1_to_merged);
        alias_collisions(v2, &matched.v2_index, &mut merged.v2_to_merged);
    }

    /// Copy V1 then V2 edges through the id maps, once per triple.
    fn merge_structural_edges(
        &self,
        v1: &Graph,
        v2: &Graph,
        merged: &mut MergedGraph,
        dedup: &mut EdgeDeduper,
    ) -> usize {
        let mut added = 0;
        let sides = [(v1, &merged.v1_to_merged), (v2, &merged.v2_to_merged)];
        let mut translated = Vec::new();
        for (graph, ids) in sides {
            for edge in graph.all_edges() {
                match (ids.get(&edge.source), ids.get(&edge.target)) {
                    (Some(&s), Some(&t)) => translated.push(edge.with_endpoints(s, t)),
                    _ => tracing::debug!(
                        "Dropping {} edge with unmapped endpoint {:?} -> {:?}",
                        edge.kind.as_str(),
                        edge.source,
                        edge.target
                    ),
                }
            }
        }
        for edge in translated {
            if dedup.insert(&mut merged.graph, edge) {
                added += 1;
            }
        }
        added
    }

    /// Emit one evolution edge per resolved endpoint pair.
    #[allow(clippy::too_many_arguments)]
    fn synthesize_evolution_edges(
        &self,
        v1: &Graph,
        v2: &Graph,
        matched: &MatchResult,
        operations: &[RefactoringOperation],
        merged: &mut MergedGraph,
        dedup: &mut EdgeDeduper,
        diagnostics: &mut Diagnostics,
    ) -> Vec<EmittedEdge> {
        let flow_from = merged.pair.from.id.clone();
        let flow_to = merged.pair.to.id.clone();
        let mut emitted = Vec::new();

        for op in operations {
            let sources = resolve_side(op, &op.before, v1, &matched.v1_index, &merged.v1_to_merged);
            let targets = resolve_side(op, &op.after, v2, &matched.v2_index, &merged.v2_to_merged);

            let failed = match (sources.is_empty(), targets.is_empty()) {
                (true, _) => Some((Side::Before, op.before.first())),
                (false, true) => Some((Side::After, op.after.first())),
                (false, false) => None,
            };
            if let Some((side, location)) = failed {
                diagnostics.record(Warning::UnresolvedRefactoringLocation {
                    operation: op.kind.as_str().to_string(),
                    side,
                    location: location
                        .map(CodeLocation::describe)
                        .unwrap_or_else(|| "<none>".to_string()),
                });
                continue;
            }

            let source_ids: Vec<NodeId> = sources.iter().map(|r| r.merged).collect();
            let target_ids: Vec<NodeId> = targets.iter().map(|r| r.merged).collect();
            let local = |side: &[Resolved], id: NodeId| {
                side.iter().find(|r| r.merged == id).map(|r| r.local)
            };
            for (source, target) in endpoints(op, &source_ids, &target_ids) {
                let (Some(v1_local), Some(v2_local)) = (local(&sources, source), local(&targets, target))
                else {
                    continue;
                };
                let (Some(from), Some(to)) = (
                    matched.v1_index.node(v1, v1_local),
                    matched.v2_index.node(v2, v2_local),
                ) else {
                    continue;
                };
                let edge = evolution_edge(
                    op,
                    (source, target),
                    from,
                    to,
                    VersionFlow { from: &flow_from, to: &flow_to },
                    &self.detected_by,
                );
                let triple = edge.triple();
                if dedup.insert(&mut merged.graph, edge) {
                    emitted.push(EmittedEdge { triple, v1_local, v2_local });
                }
            }
        }
        emitted
    }

    /// Mirror member-level evolution onto the enclosing types when they differ.
    ///
    /// Enclosing types are looked up in each side's own snapshot, so a re-keyed
    /// move (a self-loop in the merged graph) still links the old and new owner.
    fn propagate_member_evolution(
        &self,
        v1: &Graph,
        v2: &Graph,
        merged: &mut MergedGraph,
        evolution: &[EmittedEdge],
        dedup: &mut EdgeDeduper,
    ) -> usize {
        let mut propagated = Vec::new();
        for emitted in evolution {
            let (source, kind, target) = emitted.triple;
            let (Some(from), Some(to)) = (merged.graph.node(source), merged.graph.node(target))
            else {
                continue;
            };
            if !from.kind.is_member() || !to.kind.is_member() {
                continue;
            }
            let from_type = v1
                .enclosing_type(emitted.v1_local)
                .and_then(|t| merged.v1_to_merged.get(&t).copied());
            let to_type = v2
                .enclosing_type(emitted.v2_local)
                .and_then(|t| merged.v2_to_merged.get(&t).copied());
            let (Some(from_type), Some(to_type)) = (from_type, to_type) else {
                continue;
            };
            if from_type == to_type {
                continue;
            }
            let Some(member_edge) = merged
                .graph
                .edges_from(source)
                .find(|e| e.target == target && e.kind == kind)
            else {
                continue;
            };
            propagated.push(member_change_edge(from_type, to_type, from.kind, member_edge));
        }

        let mut added = 0;
        for edge in propagated {
            if dedup.insert(&mut merged.graph, edge) {
                added += 1;
            }
        }
        added
    }
}

impl Default for GraphMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Point colliding (non-canonical) node ids at their winner's merged node.
fn alias_collisions(graph: &Graph, index: &SnapshotIndex, ids: &mut HashMap<NodeId, NodeId>) {
    for node in graph.all_nodes() {
        if ids.contains_key(&node.id) {
            continue;
        }
        if let Some(merged) = index.canonical(node.id).and_then(|c| ids.get(&c).copied()) {
            ids.insert(node.id, merged);
        }
    }
}

/// A location resolved on one side: the snapshot's canonical id and its merged id.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    local: NodeId,
    merged: NodeId,
}

/// An evolution edge plus the snapshot nodes its endpoints came from.
#[derive(Debug, Clone, Copy)]
struct EmittedEdge {
    triple: EdgeTriple,
    v1_local: NodeId,
    v2_local: NodeId,
}

/// Resolve every location of one side, deduplicated by merged id, in order.
fn resolve_side(
    op: &RefactoringOperation,
    locations: &[CodeLocation],
    graph: &Graph,
    index: &SnapshotIndex,
    to_merged: &HashMap<NodeId, NodeId>,
) -> Vec<Resolved> {
    let mut resolved: Vec<Resolved> = Vec::new();
    for location in locations {
        let id = match resolve(graph, location, op.kind_hint(location)) {
            Resolution::Found(id) => id,
            Resolution::Unmatched => {
                tracing::debug!("No node at {} for {}", location.describe(), op.kind.as_str());
                continue;
            }
            Resolution::Ambiguous(candidates) => {
                tracing::debug!(
                    "{} candidates at {} for {}",
                    candidates.len(),
                    location.describe(),
                    op.kind.as_str()
                );
                continue;
            }
        };
        let Some(local) = index.canonical(id) else { continue };
        let Some(&merged) = to_merged.get(&local) else { continue };
        if resolved.iter().all(|r| r.merged != merged) {
            resolved.push(Resolved { local, merged });
        }
    }
    resolved
}
