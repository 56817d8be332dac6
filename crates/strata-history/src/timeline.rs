//! Refactoring-driven timeline construction
//!
//! Starting from a target commit, walk first parents backward and keep only
//! the commits whose refactorings (or file edits) touch the methods the target
//! changed. Tracking follows renames, moves and signature changes back to the
//! older names, and widens when a method was extracted from or inlined into a
//! tracked one.

use crate::detector::RefactoringDetector;
use crate::git::{RepositoryError, VersionControl};
use std::collections::{BTreeSet, HashMap};
use strata_core::{CommitInfo, Diagnostics, RefactoringFamily, RefactoringOperation};

pub const DEFAULT_MAX_DEPTH: usize = 50;
pub const DEFAULT_MAX_DAYS: i64 = 180;

const SECONDS_PER_DAY: i64 = 86_400;

/// One relevant commit.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub commit: CommitInfo,
    /// Method keys (`path::element`) tracked when the walk reached this commit,
    /// named as they are in this commit.
    pub tracked: BTreeSet<String>,
    /// Operations of this commit that touched a tracked method.
    pub operations: Vec<RefactoringOperation>,
    /// First parent the detector compared against; `None` for a root commit.
    pub parent: Option<String>,
    /// Everything the detector reported for `parent..commit`, tracked or not.
    pub detected: Vec<RefactoringOperation>,
}

#[derive(Debug, Clone)]
pub struct TimelineResult {
    /// Oldest first; the target is always last.
    pub entries: Vec<TimelineEntry>,
    pub commits_analyzed: usize,
    /// Relevant ancestors among the analyzed ones; the target is not counted.
    pub commits_relevant: usize,
}

impl TimelineResult {
    pub fn commits(&self) -> Vec<CommitInfo> {
        self.entries.iter().map(|e| e.commit.clone()).collect()
    }

    pub fn target(&self) -> Option<&CommitInfo> {
        self.entries.last().map(|e| &e.commit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detector output already gathered for `(parent, commit)` id pairs.
    pub fn detections(&self) -> HashMap<(String, String), Vec<RefactoringOperation>> {
        self.entries
            .iter()
            .filter_map(|e| {
                let parent = e.parent.clone()?;
                Some(((parent, e.commit.id.clone()), e.detected.clone()))
            })
            .collect()
    }
}

pub struct RefactoringTimelineBuilder<'a> {
    vcs: &'a dyn VersionControl,
    detector: &'a dyn RefactoringDetector,
    max_depth: usize,
    max_days: i64,
}

impl<'a> RefactoringTimelineBuilder<'a> {
    pub fn new(vcs: &'a dyn VersionControl, detector: &'a dyn RefactoringDetector) -> Self {
        RefactoringTimelineBuilder {
            vcs,
            detector,
            max_depth: DEFAULT_MAX_DEPTH,
            max_days: DEFAULT_MAX_DAYS,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// `0` disables the time window.
    pub fn with_max_days(mut self, max_days: i64) -> Self {
        self.max_days = max_days;
        self
    }

    /// Only an unresolvable target is an error; history problems end the walk early.
    pub fn build(&self, target: &str, diagnostics: &mut Diagnostics) -> Result<TimelineResult, RepositoryError> {
        let target = self.vcs.info(target)?;
        tracing::info!(
            "Building refactoring timeline for {} (max depth {}, max days {})",
            target.short_id,
            self.max_depth,
            self.max_days
        );

        let parent = match self.vcs.parent(&target.id) {
            Ok(parent) => parent,
            Err(e) => {
                tracing::warn!("Cannot read parent of target {}: {}", target.short_id, e);
                None
            }
        };
        let Some(mut current) = parent else {
            return Ok(single_entry(TimelineEntry {
                commit: target,
                tracked: BTreeSet::new(),
                operations: Vec::new(),
                parent: None,
                detected: Vec::new(),
            }));
        };

        let target_operations = self.detect(&current, &target, diagnostics);
        let mut tracked: BTreeSet<String> = target_operations
            .iter()
            .flat_map(|op| op.after.iter().filter_map(|l| l.method_key()))
            .collect();
        if tracked.is_empty() {
            tracing::info!("Target {} touches no tracked methods, timeline is the target alone", target.short_id);
            return Ok(single_entry(TimelineEntry {
                commit: target,
                tracked,
                operations: target_operations.clone(),
                parent: Some(current.id),
                detected: target_operations,
            }));
        }
        tracing::debug!("Tracking {} methods from {}", tracked.len(), target.short_id);

        let reached = tracked.clone();
        for op in &target_operations {
            update_tracking(op, &mut tracked);
        }
        let mut entries = vec![TimelineEntry {
            commit: target.clone(),
            tracked: reached,
            operations: target_operations.clone(),
            parent: Some(current.id.clone()),
            detected: target_operations,
        }];
        let mut analyzed = 0;

        while analyzed < self.max_depth {
            let age_days = (target.timestamp - current.timestamp) / SECONDS_PER_DAY;
            if self.max_days > 0 && age_days > self.max_days {
                tracing::debug!("{} is {} days older than the target, stopping", current.short_id, age_days);
                break;
            }

            let parent = match self.vcs.parent(&current.id) {
                Ok(Some(parent)) => parent,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Stopping timeline walk at {}: {}", current.short_id, e);
                    break;
                }
            };
            analyzed += 1;

            let detected = self.detect(&parent, &current, diagnostics);
            let matched: Vec<RefactoringOperation> =
                detected.iter().filter(|op| touches(op, &tracked)).cloned().collect();
            let is_relevant = !matched.is_empty() || self.touches_tracked_file(&current, &tracked);

            if is_relevant {
                tracing::debug!(
                    "{} is relevant ({} tracked refactorings)",
                    current.short_id,
                    matched.len()
                );
                let reached = tracked.clone();
                for op in &matched {
                    update_tracking(op, &mut tracked);
                }
                entries.push(TimelineEntry {
                    commit: current.clone(),
                    tracked: reached,
                    operations: matched,
                    parent: Some(parent.id.clone()),
                    detected,
                });
            }
            current = parent;
        }

        // the target leads `entries` and is never an analyzed ancestor
        let relevant = entries.len() - 1;
        entries.reverse();
        tracing::info!(
            "Timeline for {}: {} relevant of {} analyzed commits",
            target.short_id,
            relevant,
            analyzed
        );
        Ok(TimelineResult {
            entries,
            commits_analyzed: analyzed,
            commits_relevant: relevant,
        })
    }

    fn detect(&self, from: &CommitInfo, to: &CommitInfo, diagnostics: &mut Diagnostics) -> Vec<RefactoringOperation> {
        self.detector.detect(from, to, diagnostics).unwrap_or_else(|e| {
            tracing::warn!(
                "{} failed for {}..{}: {}",
                self.detector.name(),
                from.short_id,
                to.short_id,
                e
            );
            Vec::new()
        })
    }

    fn touches_tracked_file(&self, commit: &CommitInfo, tracked: &BTreeSet<String>) -> bool {
        let changed = match self.vcs.changed_files(&commit.id) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!("Cannot list changes of {}: {}", commit.short_id, e);
                return false;
            }
        };
        tracked
            .iter()
            .filter_map(|key| key.split_once("::").map(|(path, _)| path))
            .any(|path| changed.iter().any(|c| c == path))
    }
}

fn single_entry(entry: TimelineEntry) -> TimelineResult {
    TimelineResult {
        entries: vec![entry],
        commits_analyzed: 0,
        commits_relevant: 0,
    }
}

fn touches(op: &RefactoringOperation, tracked: &BTreeSet<String>) -> bool {
    op.before
        .iter()
        .chain(op.after.iter())
        .filter_map(|l| l.method_key())
        .any(|key| tracked.contains(&key))
}

fn update_tracking(op: &RefactoringOperation, tracked: &mut BTreeSet<String>) {
    let before: Vec<String> = op.before.iter().filter_map(|l| l.method_key()).collect();
    let after: Vec<String> = op.after.iter().filter_map(|l| l.method_key()).collect();

    match op.kind.family() {
        RefactoringFamily::Rename | RefactoringFamily::Move | RefactoringFamily::ChangeSignature => {
            let renamed = after.iter().filter(|key| tracked.remove(*key)).count();
            if renamed > 0 {
                tracked.extend(before);
            }
        }
        RefactoringFamily::Extract | RefactoringFamily::Inline => {
            if after.iter().any(|key| tracked.contains(key)) {
                tracked.extend(before);
            }
        }
        RefactoringFamily::Other => {}
    }
}
