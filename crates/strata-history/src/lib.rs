//! Repository history, refactoring detection and the evolution pipeline

pub mod git;
pub mod detector;
pub mod timeline;
pub mod pipeline;


#[cfg(test)]
pub mod test_utils;

pub use git::{GitRepository, RepositoryError, VersionControl};
pub use detector::{parse_report, DetectorError, NoDetector, RefactoringDetector, RefactoringMinerCli, ReportDetector};
pub use timeline::{RefactoringTimelineBuilder, TimelineEntry, TimelineResult};
pub use pipeline::{EvolutionPipeline, PhaseTimings, RunReport};
