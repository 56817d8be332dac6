//! Run configuration
//!
//! Sources, lowest priority first: built-in defaults, a TOML file
//! (`--config` or `./strata.toml`), `.env` plus `STRATA_*` environment
//! variables, then command-line flags applied by the binary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {field}")]
    UnknownValue { field: &'static str, value: String },

    #[error("Invalid glob pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    /// One snapshot of the checked-out tree.
    #[default]
    Single,
    /// The target commit against its parent.
    Evolution,
    /// A timeline of commits folded into one graph.
    MultiEvolution,
}

/// Where refactoring operations come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    #[default]
    RefactoringMiner,
    Report,
    None,
}

/// How the multi-version timeline is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineStrategy {
    /// The last `history_window` first-parent commits.
    #[default]
    Linear,
    /// Treated as linear.
    FileBased,
    RefactoringDriven,
}

macro_rules! kebab_enum {
    ($ty:ty, $field:literal, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(ConfigError::UnknownValue { field: $field, value: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $(v if *v == $variant => $name,)+
                    _ => "unknown",
                };
                f.write_str(name)
            }
        }
    };
}

kebab_enum!(AnalysisMode, "mode", {
    "single" => AnalysisMode::Single,
    "evolution" => AnalysisMode::Evolution,
    "multi-evolution" => AnalysisMode::MultiEvolution,
});

kebab_enum!(DetectorKind, "evolution.detector", {
    "refactoring-miner" => DetectorKind::RefactoringMiner,
    "report" => DetectorKind::Report,
    "none" => DetectorKind::None,
});

kebab_enum!(TimelineStrategy, "timeline.strategy", {
    "linear" => TimelineStrategy::Linear,
    "file-based" => TimelineStrategy::FileBased,
    "refactoring-driven" => TimelineStrategy::RefactoringDriven,
});

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub mode: AnalysisMode,
    pub project: ProjectConfig,
    pub evolution: EvolutionConfig,
    pub timeline: TimelineConfig,
    pub checkout: CheckoutConfig,
    pub export: ExportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root of the analyzed repository.
    pub path: PathBuf,
    /// Export directory name; defaults to the last path component.
    pub name: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Target revision.
    pub commit: String,
    pub detector: DetectorKind,
    /// RefactoringMiner launcher (`RefactoringMiner` on `PATH` by default).
    pub refactoring_miner: PathBuf,
    /// Directory of pre-computed reports for the `report` detector.
    pub report_dir: Option<PathBuf>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            commit: "HEAD".to_string(),
            detector: DetectorKind::default(),
            refactoring_miner: PathBuf::from("RefactoringMiner"),
            report_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub strategy: TimelineStrategy,
    /// Number of commits in a linear timeline, target included.
    pub history_window: usize,
    pub max_depth: usize,
    /// Maximum age in days relative to the target; 0 disables the limit.
    pub max_days: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            strategy: TimelineStrategy::default(),
            history_window: 5,
            max_depth: 50,
            max_days: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Untracked build leftovers removed before each checkout.
    pub stale_artifacts: Vec<String>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            stale_artifacts: vec!["**/*.class".to_string(), "target/classes/**".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub base_dir: PathBuf,
    pub pretty: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./graph_export"),
            pretty: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// When set, logs are also written to `<directory>/strata.log`.
    pub directory: Option<PathBuf>,
    pub queue_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            queue_capacity: 1000,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or `./strata.toml` when present, then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Ignoring unreadable .env file: {}", e);
            }
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `STRATA_*` variables; unrelated variables are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                "STRATA_MODE" => self.mode = value.parse()?,
                "STRATA_PROJECT_PATH" => self.project.path = PathBuf::from(value),
                "STRATA_PROJECT_NAME" => self.project.name = Some(value),
                "STRATA_COMMIT" => self.evolution.commit = value,
                "STRATA_DETECTOR" => self.evolution.detector = value.parse()?,
                "STRATA_REFACTORING_MINER" => self.evolution.refactoring_miner = PathBuf::from(value),
                "STRATA_REPORT_DIR" => self.evolution.report_dir = Some(PathBuf::from(value)),
                "STRATA_TIMELINE_STRATEGY" => self.timeline.strategy = value.parse()?,
                "STRATA_HISTORY_WINDOW" => {
                    self.timeline.history_window = parse_number("timeline.history_window", &value)?
                }
                "STRATA_MAX_DEPTH" => {
                    self.timeline.max_depth = parse_number("timeline.max_depth", &value)?
                }
                "STRATA_MAX_DAYS" => self.timeline.max_days = parse_number("timeline.max_days", &value)?,
                "STRATA_EXPORT_DIR" => self.export.base_dir = PathBuf::from(value),
                "STRATA_LOG_LEVEL" => self.log.level = value,
                "STRATA_LOG_DIR" => self.log.directory = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("project.path must not be empty".into()));
        }
        if self.mode == AnalysisMode::MultiEvolution && self.timeline.history_window < 2 {
            return Err(ConfigError::Invalid(format!(
                "timeline.history_window must be at least 2 in multi-evolution mode, got {}",
                self.timeline.history_window
            )));
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::UnknownValue {
                field: "log.level",
                value: self.log.level.clone(),
            });
        }
        if self.log.queue_capacity == 0 {
            return Err(ConfigError::Invalid("log.queue_capacity must be positive".into()));
        }
        for pattern in &self.checkout.stale_artifacts {
            globset::Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Configured project name, or the project directory's name.
    pub fn project_name(&self) -> String {
        if let Some(name) = self.project.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        let absolute = std::fs::canonicalize(&self.project.path).unwrap_or_else(|_| self.project.path.clone());
        absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }

    /// Default config rendered as TOML, for `strata.toml` templates.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).unwrap_or_default()
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::UnknownValue {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.mode, AnalysisMode::Single);
        assert_eq!(config.evolution.commit, "HEAD");
        assert_eq!(config.timeline.history_window, 5);
        assert_eq!(config.timeline.max_depth, 50);
        assert_eq!(config.timeline.max_days, 180);
        assert_eq!(config.export.base_dir, PathBuf::from("./graph_export"));
        assert_eq!(config.log.queue_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
mode = "multi-evolution"

[project]
path = "/repos/demo"

[timeline]
strategy = "refactoring-driven"
max_days = 0
"#,
        )
        .unwrap();

        assert_eq!(config.mode, AnalysisMode::MultiEvolution);
        assert_eq!(config.project.path, PathBuf::from("/repos/demo"));
        assert_eq!(config.timeline.strategy, TimelineStrategy::RefactoringDriven);
        assert_eq!(config.timeline.max_days, 0);
        assert_eq!(config.timeline.max_depth, 50);
        assert_eq!(config.evolution.detector, DetectorKind::RefactoringMiner);
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_toml("mode = \"sideways\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides([
                ("STRATA_MODE", "evolution"),
                ("STRATA_COMMIT", "abc1234"),
                ("STRATA_DETECTOR", "report"),
                ("STRATA_MAX_DEPTH", "7"),
                ("HOME", "/root"),
            ])
            .unwrap();

        assert_eq!(config.mode, AnalysisMode::Evolution);
        assert_eq!(config.evolution.commit, "abc1234");
        assert_eq!(config.evolution.detector, DetectorKind::Report);
        assert_eq!(config.timeline.max_depth, 7);

        let bad = config.apply_overrides([("STRATA_MAX_DAYS", "soon")]);
        assert!(matches!(bad, Err(ConfigError::UnknownValue { field: "timeline.max_days", .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.mode = AnalysisMode::MultiEvolution;
        config.timeline.history_window = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.log.level = "loud".into();
        assert!(matches!(config.validate(), Err(ConfigError::UnknownValue { .. })));

        let mut config = AppConfig::default();
        config.checkout.stale_artifacts = vec!["[".into()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGlob { .. })));

        let mut config = AppConfig::default();
        config.project.path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_names_round_trip_through_display() {
        assert_eq!("multi_evolution".parse::<AnalysisMode>().unwrap(), AnalysisMode::MultiEvolution);
        assert_eq!(TimelineStrategy::FileBased.to_string(), "file-based");
        assert_eq!(DetectorKind::None.to_string(), "none");
    }

    #[test]
    fn test_project_name_prefers_explicit_name() {
        let mut config = AppConfig::default();
        config.project.path = PathBuf::from("/tmp/some-repo");
        config.project.name = Some(" demo ".into());
        assert_eq!(config.project_name(), "demo");
        config.project.name = None;
        assert_eq!(config.project_name(), "some-repo");
    }
}
