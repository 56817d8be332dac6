//! Refactoring detection between two commits

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use strata_core::{CodeLocation, CommitInfo, Diagnostics, NodeKind, RefactoringKind, RefactoringOperation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Detector exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed report {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Produces the refactorings that turn `from` into `to`.
pub trait RefactoringDetector {
    /// Recorded as `detectedBy` on evolution edges.
    fn name(&self) -> &str;

    fn detect(
        &self,
        from: &CommitInfo,
        to: &CommitInfo,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RefactoringOperation>, DetectorError>;
}

// ── RefactoringMiner JSON report ────────────────────────────

#[derive(Debug, Deserialize)]
struct MinerReport {
    #[serde(default)]
    commits: Vec<MinerCommit>,
}

#[derive(Debug, Deserialize)]
struct MinerCommit {
    #[serde(default)]
    sha1: String,
    #[serde(default)]
    refactorings: Vec<MinerRefactoring>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinerRefactoring {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    left_side_locations: Vec<MinerLocation>,
    #[serde(default)]
    right_side_locations: Vec<MinerLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinerLocation {
    file_path: String,
    start_line: u32,
    end_line: u32,
    #[serde(default)]
    code_element_type: Option<String>,
    #[serde(default)]
    code_element: Option<String>,
}

impl MinerLocation {
    fn element_kind(&self) -> Option<NodeKind> {
        match self.code_element_type.as_deref()? {
            "METHOD_DECLARATION" => Some(NodeKind::Method),
            "FIELD_DECLARATION" => Some(NodeKind::Field),
            "TYPE_DECLARATION" => Some(NodeKind::Type),
            _ => None,
        }
    }

    fn into_location(self) -> CodeLocation {
        let kind = self.element_kind();
        let mut location = CodeLocation::new(self.file_path.replace('\\', "/"), self.start_line, self.end_line);
        if let Some(element) = self.code_element.filter(|e| !e.trim().is_empty()) {
            location = location.with_element(element);
        }
        if let Some(kind) = kind {
            location = location.with_kind(kind);
        }
        location
    }
}

/// Declaration locations when a side has any, otherwise every location of that side.
fn select_side(locations: Vec<MinerLocation>) -> Vec<CodeLocation> {
    let has_declaration = locations.iter().any(|l| l.element_kind().is_some());
    locations
        .into_iter()
        .filter(|l| !has_declaration || l.element_kind().is_some())
        .map(MinerLocation::into_location)
        .collect()
}

/// Parse a RefactoringMiner `-json` report. Operations of all listed commits are returned in order.
pub fn parse_report(json: &str, diagnostics: &mut Diagnostics) -> Result<Vec<RefactoringOperation>, serde_json::Error> {
    let report: MinerReport = serde_json::from_str(json)?;
    let mut operations = Vec::new();
    for commit in report.commits {
        tracing::debug!("Report for {}: {} refactorings", commit.sha1, commit.refactorings.len());
        for refactoring in commit.refactorings {
            let mut operation = RefactoringOperation::new(RefactoringKind::parse(&refactoring.kind, diagnostics))
                .with_description(refactoring.description);
            operation.before = select_side(refactoring.left_side_locations);
            operation.after = select_side(refactoring.right_side_locations);
            operations.push(operation);
        }
    }
    Ok(operations)
}

fn read_report(path: &Path, diagnostics: &mut Diagnostics) -> Result<Vec<RefactoringOperation>, DetectorError> {
    let json = std::fs::read_to_string(path).map_err(|source| DetectorError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_report(&json, diagnostics).map_err(|source| DetectorError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs the RefactoringMiner command line in `-bc` mode.
pub struct RefactoringMinerCli {
    program: String,
    repository: PathBuf,
}

impl RefactoringMinerCli {
    pub fn new(program: impl Into<String>, repository: impl Into<PathBuf>) -> Self {
        RefactoringMinerCli {
            program: program.into(),
            repository: repository.into(),
        }
    }
}

impl RefactoringDetector for RefactoringMinerCli {
    fn name(&self) -> &str {
        "RefactoringMiner"
    }

    fn detect(
        &self,
        from: &CommitInfo,
        to: &CommitInfo,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RefactoringOperation>, DetectorError> {
        let report = tempfile::Builder::new()
            .prefix("strata-refactorings-")
            .suffix(".json")
            .tempfile()
            .map_err(|source| DetectorError::Read {
                path: std::env::temp_dir(),
                source,
            })?;

        tracing::debug!("Running {} for {}..{}", self.program, from.short_id, to.short_id);
        let output = Command::new(&self.program)
            .arg("-bc")
            .arg(&self.repository)
            .arg(&from.id)
            .arg(&to.id)
            .arg("-json")
            .arg(report.path())
            .output()
            .map_err(|source| DetectorError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DetectorError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let operations = read_report(report.path(), diagnostics)?;
        tracing::info!(
            "{} refactorings between {} and {}",
            operations.len(),
            from.short_id,
            to.short_id
        );
        Ok(operations)
    }
}

/// Reads pre-computed reports from a directory.
///
/// For a pair `from..to` the first existing file among `<to>.json`,
/// `<to-short>.json` and `<from>..<to>.json` is used. A missing report means
/// no refactorings.
pub struct ReportDetector {
    dir: PathBuf,
}

impl ReportDetector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ReportDetector { dir: dir.into() }
    }

    fn candidates(&self, from: &CommitInfo, to: &CommitInfo) -> [PathBuf; 3] {
        [
            self.dir.join(format!("{}.json", to.id)),
            self.dir.join(format!("{}.json", to.short_id)),
            self.dir.join(format!("{}..{}.json", from.id, to.id)),
        ]
    }
}

impl RefactoringDetector for ReportDetector {
    fn name(&self) -> &str {
        "RefactoringMiner"
    }

    fn detect(
        &self,
        from: &CommitInfo,
        to: &CommitInfo,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RefactoringOperation>, DetectorError> {
        match self.candidates(from, to).into_iter().find(|p| p.is_file()) {
            Some(path) => read_report(&path, diagnostics),
            None => {
                tracing::warn!(
                    "No refactoring report for {}..{} in {}",
                    from.short_id,
                    to.short_id,
                    self.dir.display()
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Structural diff only, no refactorings.
pub struct NoDetector;

impl RefactoringDetector for NoDetector {
    fn name(&self) -> &str {
        "none"
    }

    fn detect(
        &self,
        _from: &CommitInfo,
        _to: &CommitInfo,
        _diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RefactoringOperation>, DetectorError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::commit;
    use strata_core::WarningKind;
    use tempfile::TempDir;

    const REPORT: &str = r#"{
      "commits": [{
        "repository": "https://example.com/demo.git",
        "sha1": "c1",
        "refactorings": [
          {
            "type": "Rename Method",
            "description": "Rename Method public foo(a int) : void renamed to public bar(a int) : void in class pkg.A",
            "leftSideLocations": [{
              "filePath": "src/main/java/pkg/A.java",
              "startLine": 5, "endLine": 8, "startColumn": 5, "endColumn": 6,
              "codeElementType": "METHOD_DECLARATION",
              "description": "original method declaration",
              "codeElement": "public foo(a int) : void"
            }],
            "rightSideLocations": [{
              "filePath": "src/main/java/pkg/A.java",
              "startLine": 5, "endLine": 8, "startColumn": 5, "endColumn": 6,
              "codeElementType": "METHOD_DECLARATION",
              "description": "method declaration with renamed method",
              "codeElement": "public bar(a int) : void"
            }]
          },
          {
            "type": "Extract Method",
            "description": "Extract Method private h() : void extracted from public g() : void",
            "leftSideLocations": [
              { "filePath": "src/main/java/pkg/A.java", "startLine": 10, "endLine": 20,
                "codeElementType": "METHOD_DECLARATION", "codeElement": "public g() : void" },
              { "filePath": "src/main/java/pkg/A.java", "startLine": 12, "endLine": 14,
                "codeElementType": "BLOCK", "codeElement": null }
            ],
            "rightSideLocations": [
              { "filePath": "src/main/java/pkg/A.java", "startLine": 22, "endLine": 26,
                "codeElementType": "METHOD_DECLARATION", "codeElement": "private h() : void" }
            ]
          },
          { "type": "???", "leftSideLocations": [], "rightSideLocations": [] }
        ]
      }]
    }"#;

    #[test]
    fn test_parse_report() {
        let mut diagnostics = Diagnostics::new();
        let operations = parse_report(REPORT, &mut diagnostics).unwrap();

        assert_eq!(operations.len(), 3);
        let rename = &operations[0];
        assert_eq!(rename.kind, RefactoringKind::RenameMethod);
        assert_eq!(rename.confidence, 1.0);
        assert_eq!(rename.before[0].element_kind, Some(NodeKind::Method));
        assert_eq!(
            rename.after[0].method_key().as_deref(),
            Some("src/main/java/pkg/A.java::public bar(a int) : void")
        );

        let extract = &operations[1];
        assert_eq!(extract.kind, RefactoringKind::ExtractMethod);
        assert_eq!(extract.before.len(), 1, "fragment locations dropped when a declaration exists");
        assert_eq!(extract.before[0].element_name(), Some("g"));

        assert!(matches!(operations[2].kind, RefactoringKind::Other(_)));
        assert_eq!(diagnostics.count_of(WarningKind::MalformedOperationDescriptor), 1);
    }

    #[test]
    fn test_parse_report_rejects_invalid_json() {
        let mut diagnostics = Diagnostics::new();
        assert!(parse_report("{ not json", &mut diagnostics).is_err());
        assert!(parse_report("{}", &mut diagnostics).unwrap().is_empty());
    }

    #[test]
    fn test_report_detector_lookup_order() {
        let tmp = TempDir::new().unwrap();
        let from = commit("aaaaaaaaaa", 1);
        let to = commit("bbbbbbbbbb", 2);
        std::fs::write(tmp.path().join("bbbbbbb.json"), REPORT).unwrap();

        let detector = ReportDetector::new(tmp.path());
        let mut diagnostics = Diagnostics::new();
        assert_eq!(detector.detect(&from, &to, &mut diagnostics).unwrap().len(), 3);

        let other = commit("cccccccccc", 3);
        assert!(detector.detect(&to, &other, &mut diagnostics).unwrap().is_empty());

        std::fs::write(tmp.path().join("bbbbbbbbbb..cccccccccc.json"), "{ broken").unwrap();
        assert!(matches!(
            detector.detect(&to, &other, &mut diagnostics),
            Err(DetectorError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_program_is_a_launch_error() {
        let detector = RefactoringMinerCli::new("strata-no-such-program", ".");
        let mut diagnostics = Diagnostics::new();
        let result = detector.detect(&commit("a", 1), &commit("b", 2), &mut diagnostics);
        assert!(matches!(result, Err(DetectorError::Launch { .. })));
    }
}
