//! Resolve refactoring code locations to graph nodes

use crate::graph::Graph;
use crate::model::{normalize_path, GraphNode, NodeId, NodeKind};
use crate::refactoring::CodeLocation;

/// Lines of slack allowed between a detector's range and a parsed node's range.
pub const LINE_TOLERANCE: u32 = 2;

/// Outcome of resolving one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(NodeId),
    Unmatched,
    /// Several nodes fit equally well.
    Ambiguous(Vec<NodeId>),
}

impl Resolution {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Resolution::Found(id) => Some(*id),
            Resolution::Unmatched | Resolution::Ambiguous(_) => None,
        }
    }
}

/// Find the node a location points at.
///
/// Candidates are methods, types and fields (or only `hint` when given) in a
/// matching file whose line range fits the location. Candidates named like the
/// location's code element win over others; among the rest the closest range wins.
pub fn resolve(graph: &Graph, location: &CodeLocation, hint: Option<NodeKind>) -> Resolution {
    if location.start_line == 0 || location.file_path.is_empty() {
        return Resolution::Unmatched;
    }
    let target_path = location.file_path.replace('\\', "/");

    let candidates: Vec<&GraphNode> = graph
        .all_nodes()
        .filter(|n| match hint {
            Some(kind) => n.kind == kind,
            None => matches!(n.kind, NodeKind::Method | NodeKind::Type | NodeKind::Field),
        })
        .filter(|n| path_matches(&normalize_path(&n.file_path), &target_path))
        .filter(|n| lines_match(n, location))
        .collect();

    let pool: Vec<&GraphNode> = match location.element_name() {
        Some(name) => {
            let named: Vec<&GraphNode> =
                candidates.iter().copied().filter(|n| n.name == name).collect();
            if named.is_empty() { candidates } else { named }
        }
        None => candidates,
    };

    let Some(best) = pool.iter().map(|n| distance(n, location)).min() else {
        return Resolution::Unmatched;
    };
    let winners: Vec<NodeId> = pool
        .iter()
        .filter(|n| distance(n, location) == best)
        .map(|n| n.id)
        .collect();
    match winners.as_slice() {
        [single] => Resolution::Found(*single),
        _ => Resolution::Ambiguous(winners),
    }
}

/// Equal paths, or one is a suffix of the other on a directory boundary.
fn path_matches(node_path: &str, target: &str) -> bool {
    if node_path.is_empty() {
        return false;
    }
    node_path == target
        || ends_with_segment(node_path, target)
        || ends_with_segment(target, node_path)
}

fn ends_with_segment(long: &str, short: &str) -> bool {
    long.len() > short.len()
        && long.ends_with(short)
        && long[..long.len() - short.len()].ends_with('/')
}

fn lines_match(node: &GraphNode, location: &CodeLocation) -> bool {
    let (Some(start), Some(end)) = (node.line_start, node.line_end) else {
        return false;
    };
    if start == 0 {
        return false;
    }
    match node.kind {
        NodeKind::Field => start.abs_diff(location.start_line) <= LINE_TOLERANCE,
        NodeKind::Method | NodeKind::Type => {
            let loc_end = location.end_line.max(location.start_line);
            start <= loc_end + LINE_TOLERANCE && end + LINE_TOLERANCE >= location.start_line
        }
        NodeKind::Project | NodeKind::Package | NodeKind::File => false,
    }
}

fn distance(node: &GraphNode, location: &CodeLocation) -> u64 {
    let start = node.line_start.unwrap_or_default();
    let end = node.line_end.unwrap_or(start);
    u64::from(start.abs_diff(location.start_line)) + u64::from(end.abs_diff(location.end_line))
}
