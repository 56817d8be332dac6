//! Test fixtures: scratch git repositories and scripted collaborators

use crate::detector::{DetectorError, RefactoringDetector};
use crate::git::{GitRepository, RepositoryError, VersionControl};
use git2::{Repository, Signature, Time};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strata_core::{
    CodeLocation, CommitInfo, Diagnostics, EdgeKind, Graph, GraphEdge, GraphNode, NodeKind, RefactoringKind,
    RefactoringOperation, SnapshotParser, StructuralGraph,
};
use tempfile::TempDir;

/// A throwaway repository with one branch of commits.
pub struct GitFixture {
    dir: TempDir,
    repo: Repository,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        GitFixture { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn open(&self) -> GitRepository {
        GitRepository::open(self.path()).unwrap()
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path().join(relative)).unwrap()
    }

    pub fn branch(&self) -> String {
        self.repo.head().unwrap().name().unwrap().to_string()
    }

    /// Write (`Some`) or delete (`None`) files and commit them at `day` days after the epoch.
    pub fn commit(&self, files: &[(&str, Option<&str>)], message: &str, day: i64) -> String {
        let mut index = self.repo.index().unwrap();
        for (relative, contents) in files {
            match contents {
                Some(text) => {
                    self.write(relative, text);
                    index.add_path(Path::new(relative)).unwrap();
                }
                None => {
                    std::fs::remove_file(self.path().join(relative)).unwrap();
                    index.remove_path(Path::new(relative)).unwrap();
                }
            }
        }
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let signature = Signature::new("dev", "dev@example.com", &Time::new(day * 86_400, 0)).unwrap();

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .unwrap();
        oid.to_string()
    }
}

pub fn commit(id: &str, day: i64) -> CommitInfo {
    CommitInfo::new(id, day * 86_400).with_message(format!("commit {id}")).with_author("dev")
}

/// In-memory history: commits listed oldest first, each the parent of the next.
#[derive(Default)]
pub struct FakeHistory {
    pub commits: Vec<CommitInfo>,
    pub changed: HashMap<String, Vec<String>>,
    /// Commits whose parent lookup fails, as in a shallow clone.
    pub broken_parents: Vec<String>,
    pub checkouts: RefCell<Vec<String>>,
    pub restored: RefCell<usize>,
    pub workdir: PathBuf,
}

impl FakeHistory {
    pub fn linear(commits: Vec<CommitInfo>) -> Self {
        FakeHistory {
            commits,
            workdir: PathBuf::from("."),
            ..Default::default()
        }
    }

    pub fn with_changed(mut self, commit: &str, files: &[&str]) -> Self {
        self.changed
            .insert(commit.to_string(), files.iter().map(|f| f.to_string()).collect());
        self
    }

    fn position(&self, reference: &str) -> Result<usize, RepositoryError> {
        if reference == "HEAD" && !self.commits.is_empty() {
            return Ok(self.commits.len() - 1);
        }
        self.commits
            .iter()
            .position(|c| c.id == reference)
            .ok_or_else(|| RepositoryError::UnresolvedReference {
                reference: reference.to_string(),
            })
    }
}

impl VersionControl for FakeHistory {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn info(&self, reference: &str) -> Result<CommitInfo, RepositoryError> {
        Ok(self.commits[self.position(reference)?].clone())
    }

    fn parent(&self, commit: &str) -> Result<Option<CommitInfo>, RepositoryError> {
        let position = self.position(commit)?;
        if self.broken_parents.iter().any(|c| c == &self.commits[position].id) {
            return Err(RepositoryError::MissingParent {
                commit: commit.to_string(),
            });
        }
        Ok(position.checked_sub(1).map(|p| self.commits[p].clone()))
    }

    fn linear_history(&self, head: &str, depth: usize) -> Result<Vec<CommitInfo>, RepositoryError> {
        let end = self.position(head)? + 1;
        let start = end.saturating_sub(depth.max(1));
        Ok(self.commits[start..end].to_vec())
    }

    fn changed_files(&self, commit: &str) -> Result<Vec<String>, RepositoryError> {
        let id = &self.commits[self.position(commit)?].id;
        Ok(self.changed.get(id).cloned().unwrap_or_default())
    }

    fn checkout(&self, reference: &str) -> Result<(), RepositoryError> {
        self.position(reference)?;
        self.checkouts.borrow_mut().push(reference.to_string());
        Ok(())
    }

    fn restore(&self) -> Result<(), RepositoryError> {
        *self.restored.borrow_mut() += 1;
        Ok(())
    }
}

/// Detector answering from a table keyed by the newer commit id.
#[derive(Default)]
pub struct ScriptedDetector {
    pub answers: HashMap<String, Vec<RefactoringOperation>>,
    pub failing: Vec<String>,
    pub calls: RefCell<Vec<(String, String)>>,
}

impl ScriptedDetector {
    pub fn with(mut self, to: &str, operations: Vec<RefactoringOperation>) -> Self {
        self.answers.insert(to.to_string(), operations);
        self
    }

    pub fn failing_at(mut self, to: &str) -> Self {
        self.failing.push(to.to_string());
        self
    }
}

impl RefactoringDetector for ScriptedDetector {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn detect(
        &self,
        from: &CommitInfo,
        to: &CommitInfo,
        _diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RefactoringOperation>, DetectorError> {
        self.calls.borrow_mut().push((from.id.clone(), to.id.clone()));
        if self.failing.contains(&to.id) {
            return Err(DetectorError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(self.answers.get(&to.id).cloned().unwrap_or_default())
    }
}

pub const FILE_A: &str = "src/main/java/pkg/A.java";

pub fn method_location(file: &str, element: &str, lines: (u32, u32)) -> CodeLocation {
    CodeLocation::new(file, lines.0, lines.1)
        .with_element(element)
        .with_kind(NodeKind::Method)
}

/// `Rename Method` from `before` to `after`, both in [`FILE_A`].
pub fn rename(before: &str, after: &str) -> RefactoringOperation {
    RefactoringOperation::new(RefactoringKind::RenameMethod)
        .with_before(method_location(FILE_A, before, (5, 8)))
        .with_after(method_location(FILE_A, after, (5, 8)))
}

/// `pkg.A` in [`FILE_A`] declaring one `(name, body)` method per entry, four lines apart from line 5.
pub fn snapshot(methods: &[(&str, &str)]) -> Graph {
    let mut graph = Graph::new();
    let ty = graph.add_node(
        GraphNode::new(NodeKind::Type, "A", "pkg.A")
            .with_file(FILE_A)
            .with_lines(3, 40)
            .with_source("public class A"),
    );
    for (i, (name, body)) in methods.iter().enumerate() {
        let start = 5 + 4 * i as u32;
        let method = graph.add_node(
            GraphNode::new(NodeKind::Method, *name, format!("pkg.A#{name}(int)"))
                .with_file(FILE_A)
                .with_lines(start, start + 3)
                .with_source(*body),
        );
        graph.add_edge(GraphEdge::new(ty, method, EdgeKind::Declares));
    }
    graph
}

/// Parser returning a prepared snapshot per commit id.
#[derive(Default)]
pub struct ScriptedParser {
    pub snapshots: HashMap<String, Graph>,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedParser {
    pub fn with(mut self, commit: &str, graph: Graph) -> Self {
        self.snapshots.insert(commit.to_string(), graph);
        self
    }
}

impl SnapshotParser for ScriptedParser {
    fn parse(&self, _root: &Path, commit: &CommitInfo) -> anyhow::Result<StructuralGraph> {
        self.calls.borrow_mut().push(commit.id.clone());
        self.snapshots
            .get(&commit.id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no snapshot for {}", commit.id))
    }
}
