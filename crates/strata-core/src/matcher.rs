//! Entity matching between two structural snapshots

use crate::diagnostics::{Diagnostics, Warning};
use crate::graph::Graph;
use crate::locate::resolve;
use crate::model::{fingerprint, identity_key, GraphNode, NodeId, NodeKind, VersionStatus};
use crate::refactoring::{RefactoringKind, RefactoringOperation};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Index key: node kind plus identity key.
pub type KindKey = (NodeKind, String);

/// Partial one-to-one relation between V1 and V2 node ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMapping {
    forward: BTreeMap<NodeId, NodeId>,
    backward: BTreeMap<NodeId, NodeId>,
}

impl NodeMapping {
    pub fn new() -> Self {
        NodeMapping::default()
    }

    pub fn insert(&mut self, v1: NodeId, v2: NodeId) {
        self.forward.insert(v1, v2);
        self.backward.insert(v2, v1);
    }

    pub fn v2_for(&self, v1: NodeId) -> Option<NodeId> {
        self.forward.get(&v1).copied()
    }

    pub fn v1_for(&self, v2: NodeId) -> Option<NodeId> {
        self.backward.get(&v2).copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Matched pairs ordered by V1 id.
    pub fn pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.forward.iter().map(|(a, b)| (*a, *b))
    }
}

/// One graph indexed by (kind, identity key), with collisions folded into the first-seen node.
#[derive(Debug, Clone, Default)]
pub struct SnapshotIndex {
    by_key: HashMap<KindKey, NodeId>,
    canonical: HashMap<NodeId, NodeId>,
    folded: HashMap<NodeId, GraphNode>,
    order: Vec<NodeId>,
}

impl SnapshotIndex {
    pub fn build(graph: &Graph, diagnostics: &mut Diagnostics) -> Self {
        let mut index = SnapshotIndex::default();
        for node in graph.all_nodes() {
            let key = (node.kind, identity_key(node));
            match index.by_key.get(&key).copied() {
                Some(first) => {
                    diagnostics.record(Warning::IdentityCollision {
                        kind: node.kind,
                        key: key.1.clone(),
                    });
                    let winner = index
                        .folded
                        .entry(first)
                        .or_insert_with(|| graph.node(first).cloned().unwrap_or_else(|| node.clone()));
                    winner.absorb(node);
                    index.canonical.insert(node.id, first);
                }
                None => {
                    index.by_key.insert(key, node.id);
                    index.canonical.insert(node.id, node.id);
                    index.order.push(node.id);
                }
            }
        }
        index
    }

    /// The first-seen node standing for `id` (itself unless it collided).
    pub fn canonical(&self, id: NodeId) -> Option<NodeId> {
        self.canonical.get(&id).copied()
    }

    pub fn lookup(&self, kind: NodeKind, key: &str) -> Option<NodeId> {
        self.by_key.get(&(kind, key.to_string())).copied()
    }

    /// Canonical ids in graph insertion order.
    pub fn canonical_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Canonical node with folded attributes.
    pub fn node<'a>(&'a self, graph: &'a Graph, id: NodeId) -> Option<&'a GraphNode> {
        self.folded.get(&id).or_else(|| graph.node(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A V2 method re-keyed under its V1 identity because of a refactoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Rekey {
    pub v1: NodeId,
    pub v2: NodeId,
    pub old_key: String,
    pub new_key: String,
    pub operation: RefactoringKind,
}

/// Number of nodes per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub unchanged: usize,
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: VersionStatus) {
        match status {
            VersionStatus::Unchanged => self.unchanged += 1,
            VersionStatus::Modified => self.modified += 1,
            VersionStatus::Added => self.added += 1,
            VersionStatus::Deleted => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unchanged + self.modified + self.added + self.deleted
    }
}

/// Output of [`EntityMatcher::match_graphs`].
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub mapping: NodeMapping,
    /// Status of every canonical V1 node: UNCHANGED, MODIFIED or DELETED.
    pub v1_status: BTreeMap<NodeId, VersionStatus>,
    /// Status of every canonical V2 node: UNCHANGED, MODIFIED or ADDED.
    pub v2_status: BTreeMap<NodeId, VersionStatus>,
    pub v1_index: SnapshotIndex,
    pub v2_index: SnapshotIndex,
    pub rekeys: Vec<Rekey>,
}

impl MatchResult {
    /// One count per logical entity: matched pairs count once.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.v1_status.values() {
            counts.record(*status);
        }
        for (v2, status) in &self.v2_status {
            if self.mapping.v1_for(*v2).is_none() {
                counts.record(*status);
            }
        }
        counts
    }

    pub fn rekey_for_v2(&self, v2: NodeId) -> Option<&Rekey> {
        self.rekeys.iter().find(|r| r.v2 == v2)
    }
}

/// Pairs nodes of two snapshots by identity key and classifies their fate.
#[derive(Debug, Default)]
pub struct EntityMatcher;

impl EntityMatcher {
    pub fn new() -> Self {
        EntityMatcher
    }

    /// Match `v1` against `v2`.
    ///
    /// Method refactorings that change identity (rename, move, signature change)
    /// are applied first so the renamed method pairs with its former self.
    pub fn match_graphs(
        &self,
        v1: &Graph,
        v2: &Graph,
        operations: &[RefactoringOperation],
        diagnostics: &mut Diagnostics,
    ) -> MatchResult {
        let v1_index = SnapshotIndex::build(v1, diagnostics);
        let v2_index = SnapshotIndex::build(v2, diagnostics);
        let rekeys = self.resolve_rekeys(v1, v2, &v1_index, &v2_index, operations);

        let mut v2_keys: HashMap<KindKey, NodeId> = v2_index.by_key.clone();
        for rekey in &rekeys {
            v2_keys.remove(&(NodeKind::Method, rekey.new_key.clone()));
            v2_keys.insert((NodeKind::Method, rekey.old_key.clone()), rekey.v2);
        }

        let mut mapping = NodeMapping::new();
        let mut v1_status = BTreeMap::new();
        let mut v2_status = BTreeMap::new();

        for &v1_id in v1_index.canonical_ids() {
            let Some(old) = v1_index.node(v1, v1_id) else { continue };
            let key = (old.kind, identity_key(old));
            let matched = v2_keys
                .get(&key)
                .copied()
                .and_then(|v2_id| v2_index.node(v2, v2_id).map(|new| (v2_id, new)));
            match matched {
                Some((v2_id, new)) => {
                    let status = if fingerprint(old) == fingerprint(new) {
                        VersionStatus::Unchanged
                    } else {
                        VersionStatus::Modified
                    };
                    mapping.insert(v1_id, v2_id);
                    v1_status.insert(v1_id, status);
                    v2_status.insert(v2_id, status);
                }
                None => {
                    v1_status.insert(v1_id, VersionStatus::Deleted);
                }
            }
        }
        for &v2_id in v2_index.canonical_ids() {
            v2_status.entry(v2_id).or_insert(VersionStatus::Added);
        }

        let result = MatchResult {
            mapping,
            v1_status,
            v2_status,
            v1_index,
            v2_index,
            rekeys,
        };
        let counts = result.status_counts();
        tracing::debug!(
            "Matched {} pairs: {} unchanged, {} modified, {} added, {} deleted, {} re-keyed",
            result.mapping.len(),
            counts.unchanged,
            counts.modified,
            counts.added,
            counts.deleted,
            result.rekeys.len()
        );
        result
    }

    /// Pick at most one identity-changing operation per V1 and per V2 method.
    fn resolve_rekeys(
        &self,
        v1: &Graph,
        v2: &Graph,
        v1_index: &SnapshotIndex,
        v2_index: &SnapshotIndex,
        operations: &[RefactoringOperation],
    ) -> Vec<Rekey> {
        struct Candidate<'a> {
            rekey: Rekey,
            confidence: f32,
            path: &'a str,
            line: u32,
            order: usize,
        }

        let mut candidates = Vec::new();
        for (order, op) in operations.iter().enumerate() {
            if !op.kind.rekeys_method() {
                continue;
            }
            let (Some(before), Some(after)) = (op.before.first(), op.after.first()) else {
                continue;
            };
            let old_id = resolve(v1, before, Some(NodeKind::Method))
                .node()
                .and_then(|id| v1_index.canonical(id));
            let new_id = resolve(v2, after, Some(NodeKind::Method))
                .node()
                .and_then(|id| v2_index.canonical(id));
            let (Some(old_id), Some(new_id)) = (old_id, new_id) else { continue };
            let (Some(old), Some(new)) = (v1_index.node(v1, old_id), v2_index.node(v2, new_id))
            else {
                continue;
            };
            let old_key = identity_key(old);
            let new_key = identity_key(new);
            // Both identities survive on their own side: plain key matching decides.
            if old_key == new_key
                || v2_index.lookup(NodeKind::Method, &old_key).is_some()
                || v1_index.lookup(NodeKind::Method, &new_key).is_some()
            {
                continue;
            }
            candidates.push(Candidate {
                rekey: Rekey {
                    v1: old_id,
                    v2: new_id,
                    old_key,
                    new_key,
                    operation: op.kind.clone(),
                },
                confidence: op.confidence,
                path: before.file_path.as_str(),
                line: before.start_line,
                order,
            });
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.path.cmp(b.path))
                .then_with(|| a.line.cmp(&b.line))
                .then_with(|| a.order.cmp(&b.order))
        });

        let mut used_v1 = HashSet::new();
        let mut used_v2 = HashSet::new();
        let mut accepted = Vec::new();
        for candidate in candidates {
            if used_v1.contains(&candidate.rekey.v1) || used_v2.contains(&candidate.rekey.v2) {
                tracing::debug!(
                    "Skipping {} {} -> {}: identity already claimed",
                    candidate.rekey.operation.as_str(),
                    candidate.rekey.old_key,
                    candidate.rekey.new_key
                );
                continue;
            }
            used_v1.insert(candidate.rekey.v1);
            used_v2.insert(candidate.rekey.v2);
            accepted.push(candidate.rekey);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactoring::CodeLocation;

    fn method(name: &str, signature: &str, body: &str, lines: (u32, u32)) -> GraphNode {
        GraphNode::new(NodeKind::Method, name, signature)
            .with_file("src/A.java")
            .with_lines(lines.0, lines.1)
            .with_source(body)
    }

    fn rename(from: (&str, u32), to: (&str, u32), confidence: f32) -> RefactoringOperation {
        RefactoringOperation::new(RefactoringKind::RenameMethod)
            .with_before(
                CodeLocation::new("src/A.java", from.1, from.1 + 2)
                    .with_element(format!("public {}(x int) : void", from.0)),
            )
            .with_after(
                CodeLocation::new("src/A.java", to.1, to.1 + 2)
                    .with_element(format!("public {}(x int) : void", to.0)),
            )
            .with_confidence(confidence)
    }

    #[test]
    fn test_collision_keeps_first_and_aliases_later() {
        let mut graph = Graph::new();
        let first = graph.add_node(method("m", "pkg.A#m()", "{}", (3, 5)));
        let mut dup = method("m", "pkg.A#m()", "{ other }", (3, 5));
        dup.doc = Some("doc".to_string());
        let second = graph.add_node(dup);

        let mut diagnostics = Diagnostics::new();
        let index = SnapshotIndex::build(&graph, &mut diagnostics);

        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(index.len(), 1);
        assert_eq!(index.canonical(second), Some(first));
        let folded = index.node(&graph, first).unwrap();
        assert_eq!(folded.source.as_deref(), Some("{}"));
        assert_eq!(folded.doc.as_deref(), Some("doc"));
    }

    #[test]
    fn test_rename_becomes_one_pair() {
        let mut v1 = Graph::new();
        let foo = v1.add_node(method("foo", "pkg.A#foo(int)", "{ a(); }", (3, 5)));
        let mut v2 = Graph::new();
        let bar = v2.add_node(method("bar", "pkg.A#bar(int)", "{ a(); }", (3, 5)));

        let mut diagnostics = Diagnostics::new();
        let result = EntityMatcher::new().match_graphs(
            &v1,
            &v2,
            &[rename(("foo", 3), ("bar", 3), 1.0)],
            &mut diagnostics,
        );

        assert_eq!(result.mapping.v2_for(foo), Some(bar));
        assert_eq!(result.rekeys.len(), 1);
        assert_eq!(result.rekeys[0].old_key, "pkg.A#foo(int)");
        let counts = result.status_counts();
        assert_eq!(counts.added + counts.deleted, 0);
        assert_eq!(counts.modified, 1);
    }

    #[test]
    fn test_conflicting_renames_prefer_confidence() {
        let mut v1 = Graph::new();
        let foo = v1.add_node(method("foo", "pkg.A#foo(int)", "{}", (3, 5)));
        let baz = v1.add_node(method("baz", "pkg.A#baz(int)", "{}", (10, 12)));
        let mut v2 = Graph::new();
        let bar = v2.add_node(method("bar", "pkg.A#bar(int)", "{}", (3, 5)));

        let operations = vec![
            rename(("baz", 10), ("bar", 3), 0.6),
            rename(("foo", 3), ("bar", 3), 0.9),
        ];
        let mut diagnostics = Diagnostics::new();
        let result = EntityMatcher::new().match_graphs(&v1, &v2, &operations, &mut diagnostics);

        assert_eq!(result.mapping.v2_for(foo), Some(bar));
        assert_eq!(result.v1_status.get(&baz), Some(&VersionStatus::Deleted));
    }

    #[test]
    fn test_equal_confidence_prefers_earliest_location() {
        let mut v1 = Graph::new();
        let early = v1.add_node(method("early", "pkg.A#early(int)", "{}", (3, 5)));
        v1.add_node(method("late", "pkg.A#late(int)", "{}", (20, 22)));
        let mut v2 = Graph::new();
        let bar = v2.add_node(method("bar", "pkg.A#bar(int)", "{}", (3, 5)));

        let operations = vec![
            rename(("late", 20), ("bar", 3), 1.0),
            rename(("early", 3), ("bar", 3), 1.0),
        ];
        let mut diagnostics = Diagnostics::new();
        let result = EntityMatcher::new().match_graphs(&v1, &v2, &operations, &mut diagnostics);
        assert_eq!(result.mapping.v1_for(bar), Some(early));
    }

    #[test]
    fn test_mapping_never_crosses_kinds() {
        let mut v1 = Graph::new();
        v1.add_node(GraphNode::new(NodeKind::Type, "A", "pkg.A"));
        let mut v2 = Graph::new();
        v2.add_node(GraphNode::new(NodeKind::Package, "A", "pkg.A"));

        let mut diagnostics = Diagnostics::new();
        let result = EntityMatcher::new().match_graphs(&v1, &v2, &[], &mut diagnostics);
        assert!(result.mapping.is_empty());
        assert_eq!(result.status_counts().added, 1);
        assert_eq!(result.status_counts().deleted, 1);
    }
}
