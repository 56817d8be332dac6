//! End-to-end runs: snapshot, single pair, or a whole timeline

use crate::detector::RefactoringDetector;
use crate::git::VersionControl;
use crate::timeline::RefactoringTimelineBuilder;
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{Duration, Instant};
use strata_core::{
    AnalysisMode, AppConfig, CommitInfo, Diagnostics, EntityMatcher, ExportReport, Graph, GraphExporter,
    GraphMerger, GraphStatistics, RefactoringOperation, SnapshotParser, StatusCounts, TimelineAggregator,
    TimelineStrategy, VersionEntry, VersionPair,
};

/// Detector output keyed by `(from, to)` commit ids.
type Detections = HashMap<(String, String), Vec<RefactoringOperation>>;

/// Version id used when a snapshot is not tied to a commit.
pub const WORKING_TREE: &str = "working-tree";

/// Wall-clock time spent per phase, accumulated over a run.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    phases: Vec<(&'static str, Duration)>,
}

impl PhaseTimings {
    pub fn time<T>(&mut self, phase: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = f();
        self.add(phase, start.elapsed());
        value
    }

    pub fn add(&mut self, phase: &'static str, elapsed: Duration) {
        match self.phases.iter_mut().find(|(name, _)| *name == phase) {
            Some((_, total)) => *total += elapsed,
            None => self.phases.push((phase, elapsed)),
        }
    }

    pub fn get(&self, phase: &str) -> Option<Duration> {
        self.phases.iter().find(|(name, _)| *name == phase).map(|(_, d)| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.phases.iter().copied()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: AnalysisMode,
    pub project: String,
    /// Commits covered, oldest first.
    pub commits: Vec<CommitInfo>,
    pub pairs_processed: usize,
    pub statistics: GraphStatistics,
    pub status_counts: StatusCounts,
    pub warning_count: usize,
    pub warnings_by_kind: BTreeMap<&'static str, usize>,
    /// `None` when there was nothing to export.
    pub export: Option<ExportReport>,
    pub timings: PhaseTimings,
}

impl RunReport {
    fn empty(mode: AnalysisMode, project: String) -> Self {
        RunReport {
            mode,
            project,
            commits: Vec::new(),
            pairs_processed: 0,
            statistics: GraphStatistics::default(),
            status_counts: StatusCounts::default(),
            warning_count: 0,
            warnings_by_kind: BTreeMap::new(),
            export: None,
            timings: PhaseTimings::default(),
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "{} run for {}: {} commits, {} pairs",
            self.mode,
            self.project,
            self.commits.len(),
            self.pairs_processed
        );
        self.statistics.log();
        tracing::info!(
            "Status: {} unchanged, {} modified, {} added, {} deleted",
            self.status_counts.unchanged,
            self.status_counts.modified,
            self.status_counts.added,
            self.status_counts.deleted
        );
        if self.warning_count > 0 {
            tracing::warn!("{} warnings", self.warning_count);
            for (kind, count) in &self.warnings_by_kind {
                tracing::warn!("  {:<30} {}", kind, count);
            }
        }
        for (phase, elapsed) in self.timings.iter() {
            tracing::info!("  {:<10} {:.2?}", phase, elapsed);
        }
        if let Some(export) = &self.export {
            tracing::info!("Output: {}", export.directory.display());
        }
    }
}

/// Runs the configured analysis mode against one project.
pub struct EvolutionPipeline<'a> {
    config: &'a AppConfig,
    vcs: Option<&'a dyn VersionControl>,
    parser: &'a dyn SnapshotParser,
    detector: &'a dyn RefactoringDetector,
}

impl<'a> EvolutionPipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        parser: &'a dyn SnapshotParser,
        detector: &'a dyn RefactoringDetector,
    ) -> Self {
        EvolutionPipeline {
            config,
            vcs: None,
            parser,
            detector,
        }
    }

    /// Required by the evolution modes.
    pub fn with_vcs(mut self, vcs: &'a dyn VersionControl) -> Self {
        self.vcs = Some(vcs);
        self
    }

    /// Run, then restore the repository's original HEAD even when a stage failed.
    pub fn run(&self) -> Result<RunReport> {
        let project = self.config.project_name();
        let mut report = RunReport::empty(self.config.mode, project);
        let mut diagnostics = Diagnostics::new();
        tracing::info!("Starting {} analysis of {}", self.config.mode, report.project);

        let outcome = match self.config.mode {
            AnalysisMode::Single => self.run_single(&mut report, &mut diagnostics),
            AnalysisMode::Evolution => self.run_evolution(&mut report, &mut diagnostics),
            AnalysisMode::MultiEvolution => self.run_multi(&mut report, &mut diagnostics),
        };

        let restored = match self.vcs {
            Some(vcs) if self.config.mode != AnalysisMode::Single => vcs.restore(),
            _ => Ok(()),
        };
        match (outcome, restored) {
            (Err(e), Err(restore)) => {
                tracing::error!("Failed to restore original HEAD: {}", restore);
                return Err(e);
            }
            (Err(e), Ok(())) => return Err(e),
            (Ok(()), Err(restore)) => {
                return Err(restore).context("Failed to restore original HEAD");
            }
            (Ok(()), Ok(())) => {}
        }

        report.warning_count = diagnostics.warning_count();
        report.warnings_by_kind = diagnostics.by_kind();
        report.log_summary();
        Ok(report)
    }

    fn require_vcs(&self) -> Result<&'a dyn VersionControl> {
        match self.vcs {
            Some(vcs) => Ok(vcs),
            None => bail!("{} mode requires a git repository", self.config.mode),
        }
    }

    fn project_root(&self) -> &Path {
        &self.config.project.path
    }

    fn run_single(&self, report: &mut RunReport, diagnostics: &mut Diagnostics) -> Result<()> {
        let commit = match self.vcs {
            Some(vcs) => vcs.info("HEAD").context("Failed to read HEAD")?,
            None => CommitInfo::new(WORKING_TREE, chrono::Utc::now().timestamp()).with_message("working tree"),
        };

        let mut graph = report
            .timings
            .time("parse", || self.parser.parse(self.project_root(), &commit))
            .with_context(|| format!("Failed to parse {}", self.project_root().display()))?;
        graph.stamp_version(&commit.id);

        let versions = vec![VersionEntry {
            label: "V0".to_string(),
            commit: commit.clone(),
        }];
        report.commits.push(commit);
        self.finish(report, &graph, &versions, diagnostics)
    }

    fn run_evolution(&self, report: &mut RunReport, diagnostics: &mut Diagnostics) -> Result<()> {
        let vcs = self.require_vcs()?;
        let target = vcs.info(&self.config.evolution.commit)?;
        let Some(parent) = vcs.parent(&target.id)? else {
            bail!("Commit {} has no parent to compare against", target.short_id);
        };
        self.process_commits(vec![parent, target], Detections::new(), report, diagnostics)
    }

    fn run_multi(&self, report: &mut RunReport, diagnostics: &mut Diagnostics) -> Result<()> {
        let vcs = self.require_vcs()?;
        let timeline = &self.config.timeline;
        let target = &self.config.evolution.commit;

        let (commits, known) = report.timings.time("history", || -> Result<(Vec<CommitInfo>, Detections)> {
            match timeline.strategy {
                TimelineStrategy::Linear | TimelineStrategy::FileBased => {
                    if timeline.strategy == TimelineStrategy::FileBased {
                        tracing::info!("File-based timeline uses the linear history window");
                    }
                    Ok((vcs.linear_history(target, timeline.history_window)?, Detections::new()))
                }
                TimelineStrategy::RefactoringDriven => {
                    let result = RefactoringTimelineBuilder::new(vcs, self.detector)
                        .with_max_depth(timeline.max_depth)
                        .with_max_days(i64::from(timeline.max_days))
                        .build(target, diagnostics)?;
                    Ok((result.commits(), result.detections()))
                }
            }
        })?;

        if commits.len() < 2 {
            tracing::warn!(
                "Timeline for {} has {} commit(s), need at least 2 for evolution analysis",
                target,
                commits.len()
            );
            report.commits = commits;
            return Ok(());
        }
        self.process_commits(commits, known, report, diagnostics)
    }

    /// Check out, parse, match, merge and fold consecutive commits oldest first.
    ///
    /// Pairs found in `known` reuse that detector output; the rest, including
    /// timeline pairs that skip commits, are detected over their full range.
    fn process_commits(
        &self,
        commits: Vec<CommitInfo>,
        mut known: Detections,
        report: &mut RunReport,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let vcs = self.require_vcs()?;
        let merger = GraphMerger::new().with_detector(self.detector.name());
        let matcher = EntityMatcher::new();
        let mut aggregator = TimelineAggregator::new();
        let mut previous: Option<(CommitInfo, Graph)> = None;

        tracing::info!("Processing {} commits", commits.len());
        for commit in &commits {
            report.timings.time("checkout", || vcs.checkout(&commit.id))?;
            let graph = report
                .timings
                .time("parse", || self.parser.parse(self.project_root(), commit))
                .with_context(|| format!("Failed to parse snapshot {}", commit.short_id))?;

            if let Some((from, v1)) = previous.take() {
                let operations = match known.remove(&(from.id.clone(), commit.id.clone())) {
                    Some(operations) => {
                        tracing::debug!(
                            "Reusing {} detected operations for {}..{}",
                            operations.len(),
                            from.short_id,
                            commit.short_id
                        );
                        operations
                    }
                    None => report.timings.time("detect", || {
                        self.detector.detect(&from, commit, diagnostics).unwrap_or_else(|e| {
                            tracing::warn!(
                                "Refactoring detection failed for {}..{}: {}",
                                from.short_id,
                                commit.short_id,
                                e
                            );
                            Vec::new()
                        })
                    }),
                };
                let pair = VersionPair::new(from, commit.clone());
                let merged = report.timings.time("merge", || {
                    let matched = matcher.match_graphs(&v1, &graph, &operations, diagnostics);
                    merger.merge(&v1, &graph, &matched, &operations, &pair, diagnostics)
                });
                aggregator.fold(&merged);
                report.pairs_processed += 1;
            }
            previous = Some((commit.clone(), graph));
        }

        let versions: Vec<VersionEntry> = aggregator
            .labels()
            .into_iter()
            .map(|(label, commit)| VersionEntry {
                label,
                commit: commit.clone(),
            })
            .collect();
        report.commits = aggregator.commits().to_vec();
        self.finish(report, aggregator.graph(), &versions, diagnostics)
    }

    fn finish(
        &self,
        report: &mut RunReport,
        graph: &Graph,
        versions: &[VersionEntry],
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        let mut counts = StatusCounts::default();
        for status in graph.all_nodes().filter_map(|n| n.version_status) {
            counts.record(status);
        }
        report.status_counts = counts;
        report.statistics = GraphStatistics::of(graph);

        let exporter = GraphExporter::new(&self.config.export.base_dir).with_pretty(self.config.export.pretty);
        let exported = report
            .timings
            .time("export", || exporter.export(&report.project, graph, versions, diagnostics))?;
        report.export = Some(exported);
        Ok(())
    }
}
