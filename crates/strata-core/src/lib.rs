//! Strata Core — versioned graph model, entity matching, merging and aggregation

pub mod model;
pub mod graph;
pub mod diagnostics;
pub mod refactoring;
pub mod locate;
pub mod matcher;
pub mod evolution;
pub mod merger;
pub mod aggregator;
pub mod config;
pub mod export;


#[cfg(test)]
pub mod test_utils;

pub use model::{
    fingerprint, identity_key, meta, CommitId, CommitInfo, EdgeId, EdgeKind, EdgeTriple, GraphEdge,
    GraphNode, NodeId, NodeKind, VersionStatus,
};
pub use graph::{Graph, SnapshotParser, StructuralGraph};
pub use diagnostics::{Diagnostics, Side, Warning, WarningKind};
pub use refactoring::{CodeLocation, RefactoringFamily, RefactoringKind, RefactoringOperation};
pub use locate::{resolve, Resolution};
pub use matcher::{EntityMatcher, MatchResult, NodeMapping, StatusCounts};
pub use merger::{GraphMerger, MergedGraph, VersionPair};
pub use aggregator::TimelineAggregator;
pub use config::{AnalysisMode, AppConfig, ConfigError, DetectorKind, TimelineStrategy};
pub use export::{ExportError, ExportReport, GraphExporter, GraphStatistics, VersionEntry};
