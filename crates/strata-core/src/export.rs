//! JSON export of merged and aggregated graphs

use crate::diagnostics::Diagnostics;
use crate::graph::Graph;
use crate::model::{identity_key, CommitInfo, GraphEdge, GraphNode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const NODES_FILE: &str = "nodes.json";
pub const EDGES_FILE: &str = "edges.json";
pub const VERSIONS_FILE: &str = "versions.json";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Counts describing one graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub evolution_edge_count: usize,
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub nodes_by_status: BTreeMap<String, usize>,
}

impl GraphStatistics {
    pub fn of(graph: &Graph) -> Self {
        let mut stats = GraphStatistics {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            ..Default::default()
        };
        for node in graph.all_nodes() {
            *stats.nodes_by_kind.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
            if let Some(status) = node.version_status {
                *stats.nodes_by_status.entry(status.as_str().to_string()).or_insert(0) += 1;
            }
        }
        for edge in graph.all_edges() {
            *stats.edges_by_kind.entry(edge.kind.as_str().to_string()).or_insert(0) += 1;
            if edge.kind.is_evolution() {
                stats.evolution_edge_count += 1;
            }
        }
        stats
    }

    /// Summary block at the end of a run.
    pub fn log(&self) {
        tracing::info!(
            "Graph: {} nodes, {} edges ({} evolution)",
            self.node_count,
            self.edge_count,
            self.evolution_edge_count
        );
        for (kind, count) in &self.nodes_by_kind {
            tracing::info!("  {:<10} {}", kind, count);
        }
        for (status, count) in &self.nodes_by_status {
            tracing::info!("  {:<10} {}", status, count);
        }
        for (kind, count) in &self.edges_by_kind {
            tracing::debug!("  {:<18} {}", kind, count);
        }
    }
}

/// A commit with its timeline label (`V0` newest).
#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    pub label: String,
    #[serde(flatten)]
    pub commit: CommitInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportNode<'a> {
    #[serde(flatten)]
    node: &'a GraphNode,
    identity_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportEdge<'a> {
    #[serde(flatten)]
    edge: &'a GraphEdge,
    #[serde(rename = "type")]
    type_name: &'static str,
    evolution: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    project: &'a str,
    exported_at: String,
    tool_version: &'static str,
    statistics: &'a GraphStatistics,
    version_count: usize,
    warning_count: usize,
    warnings_by_kind: BTreeMap<&'static str, usize>,
}

/// Files written by one export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
    pub statistics: GraphStatistics,
}

/// Writes graphs under `<base_dir>/<project>/`.
#[derive(Debug, Clone)]
pub struct GraphExporter {
    base_dir: PathBuf,
    pretty: bool,
}

impl GraphExporter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        GraphExporter {
            base_dir: base_dir.into(),
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        let name: String = project
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.base_dir.join(name)
    }

    pub fn export(
        &self,
        project: &str,
        graph: &Graph,
        versions: &[VersionEntry],
        diagnostics: &Diagnostics,
    ) -> Result<ExportReport, ExportError> {
        let dir = self.project_dir(project);
        std::fs::create_dir_all(&dir).map_err(|source| ExportError::Io {
            path: dir.clone(),
            source,
        })?;

        let statistics = GraphStatistics::of(graph);
        let nodes: Vec<ExportNode> = graph
            .all_nodes()
            .map(|node| ExportNode {
                node,
                identity_key: identity_key(node),
            })
            .collect();
        let edges: Vec<ExportEdge> = graph
            .all_edges()
            .map(|edge| ExportEdge {
                edge,
                type_name: edge.kind.as_str(),
                evolution: edge.kind.is_evolution(),
            })
            .collect();
        let summary = Summary {
            project,
            exported_at: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION"),
            statistics: &statistics,
            version_count: versions.len(),
            warning_count: diagnostics.warning_count(),
            warnings_by_kind: diagnostics.by_kind(),
        };

        let files = vec![
            self.write_json(&dir.join(NODES_FILE), &nodes)?,
            self.write_json(&dir.join(EDGES_FILE), &edges)?,
            self.write_json(&dir.join(VERSIONS_FILE), &versions)?,
            self.write_json(&dir.join(SUMMARY_FILE), &summary)?,
        ];
        tracing::info!(
            "Exported {} nodes and {} edges to {}",
            statistics.node_count,
            statistics.edge_count,
            dir.display()
        );

        Ok(ExportReport {
            directory: dir,
            files,
            statistics,
        })
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<PathBuf, ExportError> {
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        let result = if self.pretty {
            serde_json::to_writer_pretty(&mut writer, value)
        } else {
            serde_json::to_writer(&mut writer, value)
        };
        result.map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use tempfile::TempDir;

    #[test]
    fn test_statistics_snapshot() {
        let graph = type_with_method("{}");
        let (merged, _) = merge_pair(&graph, &graph, &[], &commit("c0", 1), &commit("c1", 2));
        insta::assert_json_snapshot!(GraphStatistics::of(&merged.graph), @r###"
        {
          "nodeCount": 2,
          "edgeCount": 1,
          "evolutionEdgeCount": 0,
          "nodesByKind": {
            "Method": 1,
            "Type": 1
          },
          "edgesByKind": {
            "DECLARES": 1
          },
          "nodesByStatus": {
            "UNCHANGED": 2
          }
        }
        "###);
    }

    #[test]
    fn test_export_writes_all_files() {
        let tmp = TempDir::new().unwrap();
        let c0 = commit("c0", 1);
        let c1 = commit("c1", 2);
        let (merged, diagnostics) =
            merge_pair(&type_with_method("{}"), &type_with_method("{ x(); }"), &[], &c0, &c1);
        let versions = vec![
            VersionEntry { label: "V-1".into(), commit: c0 },
            VersionEntry { label: "V0".into(), commit: c1 },
        ];

        let report = GraphExporter::new(tmp.path())
            .export("demo/app", &merged.graph, &versions, &diagnostics)
            .unwrap();

        assert_eq!(report.directory, tmp.path().join("demo_app"));
        assert_eq!(report.files.len(), 4);

        let nodes: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.directory.join(NODES_FILE)).unwrap()).unwrap();
        let method = nodes
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["identityKey"] == "pkg.A#m()")
            .unwrap();
        assert_eq!(method["versionStatus"], "MODIFIED");
        assert_eq!(method["versions"], serde_json::json!(["c0", "c1"]));
        assert_eq!(method["firstVersion"], "c0");
        assert_eq!(method["lastVersion"], "c1");

        let edges: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.directory.join(EDGES_FILE)).unwrap()).unwrap();
        assert_eq!(edges[0]["type"], "DECLARES");
        assert_eq!(edges[0]["evolution"], false);

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.directory.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["project"], "demo/app");
        assert_eq!(summary["versionCount"], 2);
        assert_eq!(summary["statistics"]["nodesByStatus"]["UNCHANGED"], 1);

        let versions: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.directory.join(VERSIONS_FILE)).unwrap()).unwrap();
        assert_eq!(versions[1]["label"], "V0");
        assert_eq!(versions[1]["shortId"], "c1");
    }
}
