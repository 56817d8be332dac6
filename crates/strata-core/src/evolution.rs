//! Evolution edges synthesized from refactoring operations

use crate::model::{EdgeKind, GraphEdge, GraphNode, NodeId, NodeKind};
use crate::refactoring::{CodeLocation, RefactoringFamily, RefactoringOperation};

/// Attribute value for propagated member edges.
pub const MEMBER_CHANGED: &str = "MEMBER_CHANGED";

/// Separator for list-valued attributes.
pub const LIST_SEPARATOR: &str = "; ";

/// Commit labels of the pair an evolution edge belongs to.
#[derive(Debug, Clone, Copy)]
pub struct VersionFlow<'a> {
    pub from: &'a str,
    pub to: &'a str,
}

/// Source/target pairs for one operation, given its resolved endpoints.
///
/// Extractions fan out from the first source, inlines fan in to the first
/// target, everything else connects first to first.
pub fn endpoints(
    op: &RefactoringOperation,
    sources: &[NodeId],
    targets: &[NodeId],
) -> Vec<(NodeId, NodeId)> {
    let (Some(&first_source), Some(&first_target)) = (sources.first(), targets.first()) else {
        return Vec::new();
    };
    match op.kind.family() {
        RefactoringFamily::Extract => targets.iter().map(|&t| (first_source, t)).collect(),
        RefactoringFamily::Inline => sources.iter().map(|&s| (s, first_target)).collect(),
        _ => vec![(first_source, first_target)],
    }
}

/// Build the evolution edge for `op` between two merged nodes.
///
/// `from` and `to` are the snapshot nodes on each side; they supply the old and
/// new names even when both endpoints are the same merged node.
pub fn evolution_edge(
    op: &RefactoringOperation,
    (source, target): (NodeId, NodeId),
    from: &GraphNode,
    to: &GraphNode,
    flow: VersionFlow<'_>,
    detected_by: &str,
) -> GraphEdge {
    let kind = op.kind.edge_kind();
    let mut edge = GraphEdge::new(source, target, kind);
    edge.confidence = op.confidence;
    edge.label = Some(op.kind.as_str().to_string());

    let attrs = &mut edge.attributes;
    attrs.insert("refactoringType".into(), op.kind.as_str().to_string());
    attrs.insert("detectedBy".into(), detected_by.to_string());
    if !op.description.is_empty() {
        attrs.insert("description".into(), op.description.clone());
    }
    insert_list(attrs, "leftLocations", op.before.iter().map(CodeLocation::describe));
    insert_list(attrs, "rightLocations", op.after.iter().map(CodeLocation::describe));
    insert_list(attrs, "leftElements", elements(&op.before));
    insert_list(attrs, "rightElements", elements(&op.after));
    attrs.insert("fromVersion".into(), flow.from.to_string());
    attrs.insert("toVersion".into(), flow.to.to_string());
    attrs.insert("versionFlow".into(), format!("{}->{}", flow.from, flow.to));

    match kind {
        EdgeKind::Renamed => {
            attrs.insert("oldName".into(), from.name.clone());
            attrs.insert("newName".into(), to.name.clone());
        }
        EdgeKind::Moved => {
            attrs.insert("oldLocation".into(), from.qualified_name.clone());
            attrs.insert("newLocation".into(), to.qualified_name.clone());
        }
        EdgeKind::ChangedSignature => {
            attrs.insert("oldSignature".into(), from.qualified_name.clone());
            attrs.insert("newSignature".into(), to.qualified_name.clone());
            if let Some(change) = op.kind.sub_type() {
                attrs.insert("changeType".into(), change.to_string());
            }
        }
        EdgeKind::Extracted => {
            if let Some(sub) = op.kind.sub_type() {
                attrs.insert("extractType".into(), sub.to_string());
            }
        }
        EdgeKind::Inlined => {
            if let Some(sub) = op.kind.sub_type() {
                attrs.insert("inlineType".into(), sub.to_string());
            }
        }
        EdgeKind::Refactored => {
            let sub = op.kind.sub_type().unwrap_or(op.kind.as_str());
            attrs.insert("subType".into(), sub.to_string());
        }
        _ => {}
    }
    edge
}

/// `Refactored` edge between two types whose members took part in a refactoring.
pub fn member_change_edge(
    from_type: NodeId,
    to_type: NodeId,
    member_kind: NodeKind,
    member_edge: &GraphEdge,
) -> GraphEdge {
    let mut edge = GraphEdge::new(from_type, to_type, EdgeKind::Refactored);
    edge.confidence = member_edge.confidence;
    edge.label = Some(MEMBER_CHANGED.to_string());
    let refactoring = member_edge
        .attr("refactoringType")
        .unwrap_or(member_edge.kind.as_str())
        .to_string();
    let attrs = &mut edge.attributes;
    attrs.insert("refactoringType".into(), MEMBER_CHANGED.to_string());
    attrs.insert("subType".into(), MEMBER_CHANGED.to_string());
    attrs.insert("propagatedMemberType".into(), member_kind.as_str().to_string());
    attrs.insert("propagatedMemberRefactoring".into(), refactoring);
    for key in ["detectedBy", "fromVersion", "toVersion", "versionFlow"] {
        if let Some(value) = member_edge.attr(key) {
            attrs.insert(key.into(), value.to_string());
        }
    }
    edge
}

fn elements(locations: &[CodeLocation]) -> impl Iterator<Item = String> + '_ {
    locations
        .iter()
        .filter_map(|l| l.code_element.as_deref())
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

/// Insert a deduplicated, order-preserving list attribute; empty lists are omitted.
fn insert_list(
    attrs: &mut std::collections::BTreeMap<String, String>,
    key: &str,
    values: impl Iterator<Item = String>,
) {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    if !seen.is_empty() {
        attrs.insert(key.to_string(), seen.join(LIST_SEPARATOR));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactoring::RefactoringKind;

    fn node(id: u64, name: &str, qualified: &str) -> GraphNode {
        let mut node = GraphNode::new(NodeKind::Method, name, qualified);
        node.id = NodeId(id);
        node
    }

    #[test]
    fn test_renamed_edge_attributes() {
        let op = RefactoringOperation::new(RefactoringKind::RenameMethod)
            .with_description("Rename Method foo(int) renamed to bar(int) in class pkg.A")
            .with_before(CodeLocation::new("A.java", 3, 5).with_element("foo(x int) : void"))
            .with_before(CodeLocation::new("A.java", 3, 5).with_element("foo(x int) : void"))
            .with_after(CodeLocation::new("A.java", 3, 5).with_element("bar(x int) : void"))
            .with_confidence(0.9);
        let edge = evolution_edge(
            &op,
            (NodeId(1), NodeId(2)),
            &node(1, "foo", "pkg.A#foo(int)"),
            &node(2, "bar", "pkg.A#bar(int)"),
            VersionFlow { from: "c1", to: "c2" },
            "RefactoringMiner",
        );

        assert_eq!(edge.kind, EdgeKind::Renamed);
        assert_eq!(edge.triple(), (NodeId(1), EdgeKind::Renamed, NodeId(2)));
        assert_eq!(edge.attr("oldName"), Some("foo"));
        assert_eq!(edge.attr("newName"), Some("bar"));
        assert_eq!(edge.attr("leftLocations"), Some("A.java:3-5::foo(x int) : void"));
        assert_eq!(edge.attr("versionFlow"), Some("c1->c2"));
        assert!((edge.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_fan_out_by_family() {
        let extract = RefactoringOperation::new(RefactoringKind::ExtractMethod);
        let inline = RefactoringOperation::new(RefactoringKind::InlineMethod);
        let rename = RefactoringOperation::new(RefactoringKind::RenameMethod);
        let s = [NodeId(1), NodeId(2)];
        let t = [NodeId(3), NodeId(4)];

        assert_eq!(endpoints(&extract, &s, &t), vec![(NodeId(1), NodeId(3)), (NodeId(1), NodeId(4))]);
        assert_eq!(endpoints(&inline, &s, &t), vec![(NodeId(1), NodeId(3)), (NodeId(2), NodeId(3))]);
        assert_eq!(endpoints(&rename, &s, &t), vec![(NodeId(1), NodeId(3))]);
        assert!(endpoints(&rename, &[], &t).is_empty());
    }

    #[test]
    fn test_unknown_kind_is_refactored_with_raw_subtype() {
        let op = RefactoringOperation::new(RefactoringKind::Other("ENCAPSULATE_ATTRIBUTE".into()));
        let edge = evolution_edge(
            &op,
            (NodeId(1), NodeId(2)),
            &node(1, "a", "pkg.A#a"),
            &node(2, "a", "pkg.A#a"),
            VersionFlow { from: "c1", to: "c2" },
            "RefactoringMiner",
        );
        assert_eq!(edge.kind, EdgeKind::Refactored);
        assert_eq!(edge.attr("subType"), Some("ENCAPSULATE_ATTRIBUTE"));
    }
}
