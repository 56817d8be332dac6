//! Integration tests for Strata
//!
//! Real git history and real Java sources through the whole pipeline.

use git2::{Repository, Signature, Time};
use std::path::Path;
use strata_core::export::{EDGES_FILE, NODES_FILE, VERSIONS_FILE};
use strata_core::{AnalysisMode, AppConfig, VersionStatus};
use strata_history::{EvolutionPipeline, GitRepository, NoDetector, ReportDetector, VersionControl};
use strata_indexer::JavaParser;
use tempfile::TempDir;

const FILE: &str = "src/main/java/pkg/A.java";

fn source(method: &str, increment: &str) -> String {
    format!(
        r#"package pkg;

public class A {{
    private int total;

    public void {method}(int a) {{
        total += {increment};
    }}

    public int sum() {{
        {method}(1);
        return total;
    }}
}}
"#
    )
}

fn commit(repo: &Repository, root: &Path, contents: &str, message: &str, day: i64) -> String {
    let path = root.join(FILE);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(FILE)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::new("dev", "dev@example.com", &Time::new(day * 86_400, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
        .to_string()
}

/// foo → bar rename in the second commit, a body change to bar in the third.
fn renaming_repository() -> (TempDir, Vec<String>) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let commits = vec![
        commit(&repo, dir.path(), &source("foo", "a"), "add A", 1),
        commit(&repo, dir.path(), &source("bar", "a"), "rename foo", 2),
        commit(&repo, dir.path(), &source("bar", "a * 2"), "double", 3),
    ];
    (dir, commits)
}

fn rename_report(before: &str, after: &str) -> String {
    let location = |name: &str| {
        serde_json::json!({
            "filePath": FILE,
            "startLine": 6,
            "endLine": 8,
            "codeElementType": "METHOD_DECLARATION",
            "codeElement": format!("public {name}(a int) : void"),
        })
    };
    serde_json::json!({
        "commits": [{
            "sha1": "ignored",
            "refactorings": [{
                "type": "Rename Method",
                "description": format!("Rename Method {before} to {after}"),
                "leftSideLocations": [location(before)],
                "rightSideLocations": [location(after)],
            }]
        }]
    })
    .to_string()
}

fn config(mode: AnalysisMode, project: &Path, out: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.mode = mode;
    config.project.path = project.to_path_buf();
    config.project.name = Some("demo".to_string());
    config.export.base_dir = out.to_path_buf();
    config.timeline.history_window = 3;
    config
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_multi_evolution_follows_rename_through_history() {
    let (project, commits) = renaming_repository();
    let out = TempDir::new().unwrap();
    let reports = TempDir::new().unwrap();
    std::fs::write(reports.path().join(format!("{}.json", commits[1])), rename_report("foo", "bar")).unwrap();

    let config = config(AnalysisMode::MultiEvolution, project.path(), out.path());
    let repository = GitRepository::open(project.path()).unwrap();
    let parser = JavaParser::new().with_project_name("demo");
    let detector = ReportDetector::new(reports.path());

    let report = EvolutionPipeline::new(&config, &parser, &detector)
        .with_vcs(&repository)
        .run()
        .unwrap();

    assert_eq!(report.pairs_processed, 2);
    assert!(report.statistics.evolution_edge_count >= 1);

    let export = report.export.unwrap();
    let nodes = read_json(&export.directory.join(NODES_FILE));
    let nodes = nodes.as_array().unwrap();
    assert!(!nodes.iter().any(|n| n["identityKey"] == "pkg.A#foo(int)"));
    let bar = nodes.iter().find(|n| n["identityKey"] == "pkg.A#bar(int)").unwrap();
    assert_eq!(bar["versionStatus"], VersionStatus::Modified.as_str());
    assert_eq!(bar["versions"].as_array().unwrap().len(), 3);
    assert_eq!(bar["firstVersion"], commits[0].as_str());
    assert_eq!(bar["lastVersion"], commits[2].as_str());

    let edges = read_json(&export.directory.join(EDGES_FILE));
    assert!(edges.as_array().unwrap().iter().any(|e| e["type"] == "RENAMED"));
    assert!(edges.as_array().unwrap().iter().any(|e| e["type"] == "CALLS"));

    let versions = read_json(&export.directory.join(VERSIONS_FILE));
    assert_eq!(versions.as_array().unwrap().len(), 3);
    assert_eq!(versions[2]["label"], "V0");

    // back on the branch, with the newest contents
    let repo = Repository::open(project.path()).unwrap();
    assert!(!repo.head_detached().unwrap());
    assert_eq!(std::fs::read_to_string(project.path().join(FILE)).unwrap(), source("bar", "a * 2"));
}

#[test]
fn test_evolution_without_detector_sees_delete_and_add() {
    let (project, commits) = renaming_repository();
    let out = TempDir::new().unwrap();
    let mut config = config(AnalysisMode::Evolution, project.path(), out.path());
    config.evolution.commit = commits[1].clone();

    let repository = GitRepository::open(project.path()).unwrap();
    let parser = JavaParser::new();
    let report = EvolutionPipeline::new(&config, &parser, &NoDetector)
        .with_vcs(&repository)
        .run()
        .unwrap();

    assert_eq!(report.pairs_processed, 1);
    assert_eq!(report.status_counts.deleted, 1, "foo");
    assert_eq!(report.status_counts.added, 1, "bar");
    assert_eq!(report.statistics.evolution_edge_count, 0);
    assert_eq!(repository.info("HEAD").unwrap().id, commits[2]);
}

#[test]
fn test_single_snapshot_of_plain_directory() {
    let project = TempDir::new().unwrap();
    std::fs::create_dir_all(project.path().join("src/main/java/pkg")).unwrap();
    std::fs::write(project.path().join(FILE), source("foo", "a")).unwrap();
    let out = TempDir::new().unwrap();

    let config = config(AnalysisMode::Single, project.path(), out.path());
    let parser = JavaParser::new().with_project_name("demo");
    let report = EvolutionPipeline::new(&config, &parser, &NoDetector).run().unwrap();

    // project, package, file, type, field and two methods
    assert_eq!(report.statistics.node_count, 7);
    let export = report.export.unwrap();
    assert_eq!(export.directory, out.path().join("demo"));
    let nodes = read_json(&export.directory.join(NODES_FILE));
    assert!(nodes.as_array().unwrap().iter().all(|n| n["versions"].as_array().unwrap().len() == 1));
}

#[test]
fn test_dirty_tree_aborts_and_restores() {
    let (project, _) = renaming_repository();
    let out = TempDir::new().unwrap();
    std::fs::write(project.path().join(FILE), "uncommitted").unwrap();

    let config = config(AnalysisMode::MultiEvolution, project.path(), out.path());
    let repository = GitRepository::open(project.path()).unwrap();
    let parser = JavaParser::new();
    let err = EvolutionPipeline::new(&config, &parser, &NoDetector)
        .with_vcs(&repository)
        .run()
        .unwrap_err();

    assert!(format!("{err:#}").contains("A.java"));
    assert_eq!(std::fs::read_to_string(project.path().join(FILE)).unwrap(), "uncommitted");
}
