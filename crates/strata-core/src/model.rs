//! Core data structures for the versioned structural graph

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a node inside one graph. Assigned by [`crate::Graph::add_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub u64);

/// Identifier of an edge inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EdgeId(pub u64);

/// Full commit hash (or any resolvable revision string for fakes).
pub type CommitId = String;

/// Well-known metadata keys shared by the parser, matcher and exporter.
pub mod meta {
    pub const TYPE: &str = "type";
    pub const RETURN_TYPE: &str = "returnType";
    pub const MODIFIERS: &str = "modifiers";
    pub const PACKAGE: &str = "package";
    pub const IMPORTS: &str = "imports";
    pub const TYPE_KIND: &str = "typeKind";
    pub const METHOD_KIND: &str = "methodKind";
    pub const RENAMED_FROM: &str = "renamedFrom";
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Project,
    Package,
    File,
    Type,
    Method,
    Field,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Project => "Project",
            NodeKind::Package => "Package",
            NodeKind::File => "File",
            NodeKind::Type => "Type",
            NodeKind::Method => "Method",
            NodeKind::Field => "Field",
        }
    }

    /// Methods and fields live inside a type and reach it through a `Declares` edge.
    pub fn is_member(&self) -> bool {
        matches!(self, NodeKind::Method | NodeKind::Field)
    }
}

/// Classification of a merged node's fate between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Unchanged,
    Modified,
    Added,
    Deleted,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Unchanged => "UNCHANGED",
            VersionStatus::Modified => "MODIFIED",
            VersionStatus::Added => "ADDED",
            VersionStatus::Deleted => "DELETED",
        }
    }
}

/// A single node in a structural or merged graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Simple name (`m`, `A`, `A.java`).
    pub name: String,
    /// Qualified name, method signature, or relative path for files.
    pub qualified_name: String,
    /// Path of the declaring file relative to the project root.
    pub file_path: PathBuf,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub source: Option<String>,
    pub doc: Option<String>,
    pub summary: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub versions: BTreeSet<CommitId>,
    pub version_status: Option<VersionStatus>,
    pub first_version: Option<CommitId>,
    pub last_version: Option<CommitId>,
}

impl GraphNode {
    pub fn new(kind: NodeKind, name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        GraphNode {
            id: NodeId::default(),
            kind,
            name: name.into(),
            qualified_name: qualified_name.into(),
            file_path: PathBuf::new(),
            line_start: None,
            line_end: None,
            source: None,
            doc: None,
            summary: None,
            metadata: BTreeMap::new(),
            versions: BTreeSet::new(),
            version_status: None,
            first_version: None,
            last_version: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = file_path.into();
        self
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.line_start = Some(start);
        self.line_end = Some(end);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Fill attributes this node lacks from `other`. Existing values are never overwritten.
    pub fn absorb(&mut self, other: &GraphNode) {
        if self.source.is_none() {
            self.source = other.source.clone();
        }
        if self.doc.is_none() {
            self.doc = other.doc.clone();
        }
        if self.summary.is_none() {
            self.summary = other.summary.clone();
        }
        if self.line_start.is_none() {
            self.line_start = other.line_start;
            self.line_end = other.line_end;
        }
        for (key, value) in &other.metadata {
            self.metadata.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self.versions.extend(other.versions.iter().cloned());
    }
}

/// Deterministic name of the logical entity a node stands for, independent of snapshot.
pub fn identity_key(node: &GraphNode) -> String {
    match node.kind {
        NodeKind::Project | NodeKind::Package | NodeKind::Type | NodeKind::Method => {
            node.qualified_name.clone()
        }
        NodeKind::File => normalize_path(&node.file_path),
        NodeKind::Field => format!(
            "{}:{}",
            node.qualified_name,
            node.meta(meta::TYPE).unwrap_or_default()
        ),
    }
}

/// Hash over the attributes whose change makes a matched node MODIFIED.
///
/// Types hash their declaration header only, so a method body edit leaves the
/// enclosing type untouched.
pub fn fingerprint(node: &GraphNode) -> u64 {
    let mut hasher = DefaultHasher::new();
    node.kind.hash(&mut hasher);
    match node.kind {
        NodeKind::Method => {
            node.source.hash(&mut hasher);
            node.qualified_name.hash(&mut hasher);
            node.meta(meta::MODIFIERS).hash(&mut hasher);
            node.meta(meta::RETURN_TYPE).hash(&mut hasher);
        }
        NodeKind::Field => {
            node.source.hash(&mut hasher);
            node.meta(meta::TYPE).hash(&mut hasher);
            node.meta(meta::MODIFIERS).hash(&mut hasher);
        }
        NodeKind::Type => {
            node.source.hash(&mut hasher);
            node.meta(meta::MODIFIERS).hash(&mut hasher);
        }
        NodeKind::File => {
            node.meta(meta::PACKAGE).hash(&mut hasher);
            node.meta(meta::IMPORTS).hash(&mut hasher);
        }
        NodeKind::Project | NodeKind::Package => {
            node.qualified_name.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Forward-slash form of a relative path, used for file identity and location matching.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// What kind of relationship this edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    // ── Structural (from the parser) ────────────────────────
    Contains,
    HasPackage,
    InPackage,
    DeclaresType,
    Declares,
    Extends,
    Implements,
    Overrides,
    Calls,
    Reads,
    Writes,
    HasParam,
    ReturnType,
    Throws,
    Tests,

    // ── Evolution (synthesized by the merger) ───────────────
    Renamed,
    Moved,
    Extracted,
    Inlined,
    ChangedSignature,
    Refactored,
    RefactoredTo,
    EvolvesFrom,
}

impl EdgeKind {
    pub fn is_evolution(&self) -> bool {
        match self {
            EdgeKind::Contains
            | EdgeKind::HasPackage
            | EdgeKind::InPackage
            | EdgeKind::DeclaresType
            | EdgeKind::Declares
            | EdgeKind::Extends
            | EdgeKind::Implements
            | EdgeKind::Overrides
            | EdgeKind::Calls
            | EdgeKind::Reads
            | EdgeKind::Writes
            | EdgeKind::HasParam
            | EdgeKind::ReturnType
            | EdgeKind::Throws
            | EdgeKind::Tests => false,
            EdgeKind::Renamed
            | EdgeKind::Moved
            | EdgeKind::Extracted
            | EdgeKind::Inlined
            | EdgeKind::ChangedSignature
            | EdgeKind::Refactored
            | EdgeKind::RefactoredTo
            | EdgeKind::EvolvesFrom => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::HasPackage => "HAS_PACKAGE",
            EdgeKind::InPackage => "IN_PACKAGE",
            EdgeKind::DeclaresType => "DECLARES_TYPE",
            EdgeKind::Declares => "DECLARES",
            EdgeKind::Extends => "EXTENDS",
            EdgeKind::Implements => "IMPLEMENTS",
            EdgeKind::Overrides => "OVERRIDES",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Reads => "READS",
            EdgeKind::Writes => "WRITES",
            EdgeKind::HasParam => "HAS_PARAM",
            EdgeKind::ReturnType => "RETURN_TYPE",
            EdgeKind::Throws => "THROWS",
            EdgeKind::Tests => "TESTS",
            EdgeKind::Renamed => "RENAMED",
            EdgeKind::Moved => "MOVED",
            EdgeKind::Extracted => "EXTRACTED",
            EdgeKind::Inlined => "INLINED",
            EdgeKind::ChangedSignature => "CHANGED_SIGNATURE",
            EdgeKind::Refactored => "REFACTORED",
            EdgeKind::RefactoredTo => "REFACTORED_TO",
            EdgeKind::EvolvesFrom => "EVOLVES_FROM",
        }
    }
}

/// Dedup key for edges: (source, kind, target).
pub type EdgeTriple = (NodeId, EdgeKind, NodeId);

/// A directed edge in a structural or merged graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    /// 1.0 for structural edges, the detector's confidence for evolution edges.
    pub confidence: f32,
    pub label: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl GraphEdge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        GraphEdge {
            id: EdgeId::default(),
            source,
            target,
            kind,
            confidence: 1.0,
            label: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Copy of this edge attached to other endpoints. Kind and attributes carry over.
    pub fn with_endpoints(&self, source: NodeId, target: NodeId) -> GraphEdge {
        GraphEdge {
            id: EdgeId::default(),
            source,
            target,
            ..self.clone()
        }
    }

    pub fn triple(&self) -> EdgeTriple {
        (self.source, self.kind, self.target)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Metadata about one commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub id: CommitId,
    pub short_id: String,
    pub message: String,
    pub author: String,
    /// Commit time in seconds since the Unix epoch.
    pub timestamp: i64,
}

impl CommitInfo {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Self {
        let id = id.into();
        CommitInfo {
            short_id: short_id(&id),
            id,
            message: String::new(),
            author: String::new(),
            timestamp,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

/// First seven characters of a commit id.
pub fn short_id(id: &str) -> String {
    id.chars().take(7).collect()
}
