//! CLI command implementations

use anyhow::{bail, Context};
use strata_core::{AnalysisMode, AppConfig, DetectorKind, Diagnostics};
use strata_history::{
    EvolutionPipeline, GitRepository, NoDetector, RefactoringDetector, RefactoringMinerCli, RefactoringTimelineBuilder,
    ReportDetector, VersionControl,
};
use strata_indexer::JavaParser;

fn open_repository(config: &AppConfig) -> anyhow::Result<GitRepository> {
    let repository = GitRepository::open(&config.project.path)
        .with_context(|| format!("No git repository at {}", config.project.path.display()))?;
    Ok(repository.with_stale_artifacts(&config.checkout.stale_artifacts)?)
}

fn detector(config: &AppConfig, vcs: Option<&dyn VersionControl>) -> anyhow::Result<Box<dyn RefactoringDetector>> {
    let evolution = &config.evolution;
    Ok(match evolution.detector {
        DetectorKind::RefactoringMiner => {
            let repository = vcs.map(|v| v.workdir()).unwrap_or(config.project.path.as_path());
            Box::new(RefactoringMinerCli::new(
                evolution.refactoring_miner.to_string_lossy().into_owned(),
                repository,
            ))
        }
        DetectorKind::Report => match &evolution.report_dir {
            Some(dir) => Box::new(ReportDetector::new(dir)),
            None => bail!("evolution.detector = \"report\" needs evolution.report_dir"),
        },
        DetectorKind::None => Box::new(NoDetector),
    })
}

pub fn analyze(config: &AppConfig) -> anyhow::Result<()> {
    // a plain directory is enough for a single snapshot
    let repository = match config.mode {
        AnalysisMode::Single => match open_repository(config) {
            Ok(repository) => Some(repository),
            Err(e) => {
                tracing::debug!("Parsing the working tree as is: {:#}", e);
                None
            }
        },
        AnalysisMode::Evolution | AnalysisMode::MultiEvolution => Some(open_repository(config)?),
    };
    let vcs = repository.as_ref().map(|r| r as &dyn VersionControl);

    let parser = JavaParser::new().with_project_name(config.project_name());
    let detector = detector(config, vcs)?;
    tracing::info!("Refactoring detector: {}", detector.name());

    let mut pipeline = EvolutionPipeline::new(config, &parser, detector.as_ref());
    if let Some(vcs) = vcs {
        pipeline = pipeline.with_vcs(vcs);
    }
    let report = pipeline.run()?;

    match &report.export {
        Some(export) => println!("Exported {} files to {}", export.files.len(), export.directory.display()),
        None => println!("Nothing exported: {} commit(s) in the timeline", report.commits.len()),
    }
    Ok(())
}

pub fn timeline(config: &AppConfig, commit: &str) -> anyhow::Result<()> {
    let repository = open_repository(config)?;
    let detector = detector(config, Some(&repository as &dyn VersionControl))?;
    let mut diagnostics = Diagnostics::new();

    let result = RefactoringTimelineBuilder::new(&repository, detector.as_ref())
        .with_max_depth(config.timeline.max_depth)
        .with_max_days(i64::from(config.timeline.max_days))
        .build(commit, &mut diagnostics)?;

    println!(
        "{} relevant of {} analyzed commits",
        result.commits_relevant, result.commits_analyzed
    );
    for entry in &result.entries {
        let date = entry
            .commit
            .time()
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{}  {}  {:>3} ops  {}",
            entry.commit.short_id,
            date,
            entry.operations.len(),
            entry.commit.message.lines().next().unwrap_or_default()
        );
    }
    if diagnostics.warning_count() > 0 {
        tracing::warn!("{} warnings while building the timeline", diagnostics.warning_count());
    }
    Ok(())
}

pub fn history(config: &AppConfig, commit: &str, depth: usize) -> anyhow::Result<()> {
    let repository = open_repository(config)?;
    for info in repository.linear_history(commit, depth)? {
        let date = info.time().map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default();
        println!(
            "{}  {}  {:<20}  {}",
            info.short_id,
            date,
            info.author,
            info.message.lines().next().unwrap_or_default()
        );
    }
    Ok(())
}
