//! Test builders for snapshots, commits and merges

use crate::diagnostics::Diagnostics;
use crate::graph::Graph;
use crate::matcher::EntityMatcher;
use crate::merger::{GraphMerger, MergedGraph, VersionPair};
use crate::model::*;
use crate::refactoring::{CodeLocation, RefactoringKind, RefactoringOperation};

pub const FILE_A: &str = "src/main/java/pkg/A.java";

/// Commit whose timestamp is `day` days after the epoch.
pub fn commit(id: &str, day: i64) -> CommitInfo {
    CommitInfo::new(id, day * 86_400)
        .with_message(format!("commit {id}"))
        .with_author("dev")
}

pub fn type_node(qualified: &str, lines: (u32, u32)) -> GraphNode {
    let name = qualified.rsplit('.').next().unwrap_or(qualified);
    GraphNode::new(NodeKind::Type, name, qualified)
        .with_file(FILE_A)
        .with_lines(lines.0, lines.1)
        .with_source(format!("public class {name}"))
        .with_meta(meta::MODIFIERS, "public")
}

/// Method `owner#name(params)` with the given body.
pub fn method_node(owner: &str, name: &str, params: &str, body: &str, lines: (u32, u32)) -> GraphNode {
    GraphNode::new(NodeKind::Method, name, format!("{owner}#{name}({params})"))
        .with_file(FILE_A)
        .with_lines(lines.0, lines.1)
        .with_source(body)
        .with_meta(meta::RETURN_TYPE, "void")
        .with_meta(meta::MODIFIERS, "public")
}

pub fn field_node(owner: &str, name: &str, ty: &str, line: u32) -> GraphNode {
    GraphNode::new(NodeKind::Field, name, format!("{owner}#{name}"))
        .with_file(FILE_A)
        .with_lines(line, line)
        .with_source(format!("private {ty} {name};"))
        .with_meta(meta::TYPE, ty)
}

/// `pkg.A` declaring `pkg.A#m()` with the given body.
pub fn type_with_method(body: &str) -> Graph {
    let mut graph = Graph::new();
    let ty = graph.add_node(type_node("pkg.A", (3, 20)));
    let m = graph.add_node(method_node("pkg.A", "m", "", body, (5, 8)));
    graph.add_edge(GraphEdge::new(ty, m, EdgeKind::Declares));
    graph
}

/// `pkg.A` declaring one method `name(int)`, calling helper `h()`.
pub fn type_with_named_method(name: &str) -> Graph {
    let mut graph = Graph::new();
    let ty = graph.add_node(type_node("pkg.A", (3, 20)));
    let m = graph.add_node(method_node("pkg.A", name, "int", "{ h(); }", (5, 8)));
    let h = graph.add_node(method_node("pkg.A", "h", "", "{}", (10, 12)));
    graph.add_edge(GraphEdge::new(ty, m, EdgeKind::Declares));
    graph.add_edge(GraphEdge::new(ty, h, EdgeKind::Declares));
    graph.add_edge(GraphEdge::new(m, h, EdgeKind::Calls));
    graph
}

pub fn rename_method(from: &str, to: &str, lines: (u32, u32)) -> RefactoringOperation {
    RefactoringOperation::new(RefactoringKind::RenameMethod)
        .with_description(format!("Rename Method {from}(int) renamed to {to}(int) in class pkg.A"))
        .with_before(
            CodeLocation::new(FILE_A, lines.0, lines.1)
                .with_element(format!("public {from}(x int) : void"))
                .with_kind(NodeKind::Method),
        )
        .with_after(
            CodeLocation::new(FILE_A, lines.0, lines.1)
                .with_element(format!("public {to}(x int) : void"))
                .with_kind(NodeKind::Method),
        )
}

/// Match and merge two snapshots in one go.
pub fn merge_pair(
    v1: &Graph,
    v2: &Graph,
    operations: &[RefactoringOperation],
    from: &CommitInfo,
    to: &CommitInfo,
) -> (MergedGraph, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let matched = EntityMatcher::new().match_graphs(v1, v2, operations, &mut diagnostics);
    let merged = GraphMerger::new().merge(
        v1,
        v2,
        &matched,
        operations,
        &VersionPair::new(from.clone(), to.clone()),
        &mut diagnostics,
    );
    (merged, diagnostics)
}

pub fn status_of(graph: &Graph, kind: NodeKind, key: &str) -> Option<VersionStatus> {
    graph
        .find_by_key(kind, key)
        .and_then(|id| graph.node(id))
        .and_then(|n| n.version_status)
}
