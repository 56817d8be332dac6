//! Strata CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata_core::config::LogConfig;
use strata_core::AppConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod log_writer;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Evolution graphs of Java code across git history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (overrides project.path)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Config file (defaults to ./strata.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis selected by the configured mode
    Analyze {
        /// single, evolution or multi-evolution
        #[arg(short, long)]
        mode: Option<String>,

        /// Target commit
        #[arg(long)]
        commit: Option<String>,
    },
    /// Print the refactoring-driven timeline ending at a commit
    Timeline {
        #[arg(default_value = "HEAD")]
        commit: String,
    },
    /// Print the linear first-parent history ending at a commit
    History {
        #[arg(default_value = "HEAD")]
        commit: String,

        /// Number of commits
        #[arg(short = 'n', long, default_value = "10")]
        depth: usize,
    },
    /// Show version
    Version,
}

fn init_logging(level: &str, log: &LogConfig) -> anyhow::Result<Option<log_writer::WriterGuard>> {
    let (file_layer, guard) = match &log.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let (writer, guard) = log_writer::spawn(directory.join(log_writer::LOG_FILE), log.queue_capacity)?;
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(format!("strata={}", level)))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.project.path = root;
    }
    if let Commands::Analyze { mode, commit } = &cli.command {
        if let Some(mode) = mode {
            config.mode = mode.parse()?;
        }
        if let Some(commit) = commit {
            config.evolution.commit = commit.clone();
        }
    }
    config.validate()?;

    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log.level.to_ascii_lowercase()
    };
    let _guard = init_logging(&log_level, &config.log)?;

    tracing::info!("Strata v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Project root: {}", config.project.path.display());

    match cli.command {
        Commands::Analyze { .. } => commands::analyze(&config),
        Commands::Timeline { commit } => commands::timeline(&config, &commit),
        Commands::History { commit, depth } => commands::history(&config, &commit, depth),
        Commands::Version => {
            println!("Strata v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
