//! batchlog CLI
//!
//! Thin wrapper around batchlog-core for scripts and manual inspection of a
//! log directory.
//!
//! ## Usage
//!
//! ```bash
//! # Show where today's messages go
//! batchlog --log-dir /var/log/nightly --base-name Import path
//!
//! # Append one message and flush
//! batchlog --log-dir /var/log/nightly --base-name Import write error "Feed missing"
//!
//! # Move old logs into year directories, zipping old years
//! batchlog --log-dir /var/log/nightly archive --zip
//!
//! # Log every CSV under a tree
//! batchlog --log-dir /var/log/nightly process /data/incoming -p '*.csv' -r
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use batchlog_core::logging::identity::LogFileIdentity;
use batchlog_core::processing::HandlerResult;
use batchlog_core::{
    ArchiveSweep, FileSink, FileSinkConfig, LogLevel, LogSink, LoggingObserver, TreeWalker,
    WalkOptions, WalkTarget,
};

const DEFAULT_BASE_NAME: &str = "batchlog";

/// batchlog - queued file logging for batch jobs
#[derive(Parser)]
#[command(name = "batchlog")]
#[command(version = "0.1.0")]
#[command(about = "batchlog - queued file logging for batch jobs")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log directory (default: ~/.batchlog/logs)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log file base name, without date or extension
    #[arg(long, global = true)]
    base_name: Option<String>,

    /// Roll a single <base>.txt instead of writing one file per day
    #[arg(long, global = true)]
    no_date: bool,

    /// Least severe level written (none, fatal, error, warn, info, debug)
    #[arg(long, global = true)]
    level: Option<String>,

    /// JSON file sink configuration; other flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current log file path
    Path,

    /// Write one message and flush
    Write {
        /// Message level
        #[arg(value_name = "LEVEL")]
        message_level: String,

        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Run the archival sweep on the log directory now
    Archive {
        /// Zip year directories older than the grace window
        #[arg(long)]
        zip: bool,
    },

    /// Walk a directory tree and log every matching entry
    Process {
        /// Root directory
        root: PathBuf,

        /// Wildcard pattern for entry names (repeatable)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Handle directories instead of files
        #[arg(long)]
        dirs: bool,

        /// Deepest level visited when recursive
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default log directory (~/.batchlog/logs)
fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".batchlog")
        .join("logs")
}

fn parse_level(s: &str) -> Result<LogLevel> {
    LogLevel::from_str(s).map_err(|e| anyhow::anyhow!("{}", e))
}

/// Merge the config file (if any) with the command-line overrides.
fn resolve_config(cli: &Cli) -> Result<FileSinkConfig> {
    let mut config = match &cli.config {
        Some(path) => FileSinkConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FileSinkConfig::new(default_log_dir().join(DEFAULT_BASE_NAME)),
    };

    if cli.log_dir.is_some() || cli.base_name.is_some() {
        let current = LogFileIdentity::new(&config.base_path, config.append_date);
        let dir = cli.log_dir.clone().unwrap_or_else(|| current.log_dir());
        let name = cli
            .base_name
            .clone()
            .unwrap_or_else(|| current.base_file_name());
        config.base_path = dir.join(name);
    }
    if cli.no_date {
        config.append_date = false;
    }
    if let Some(level) = &cli.level {
        config.threshold = parse_level(level)?;
    }

    Ok(config.validate()?)
}

fn print_path(config: FileSinkConfig) -> Result<()> {
    let sink = FileSink::manual(config)?;
    println!("{}", sink.current_log_path().display());
    Ok(())
}

fn write_message(config: FileSinkConfig, level: &str, message: &[String]) -> Result<()> {
    let level = parse_level(level)?;
    if !LogLevel::WRITABLE.contains(&level) {
        bail!("Level {} cannot be written", level);
    }

    let sink = FileSink::new(config)?;
    sink.write_log(level, &message.join(" "), None);
    if !sink.shutdown() {
        bail!("Timed out writing to {}", sink.current_log_path().display());
    }
    Ok(())
}

fn archive(config: FileSinkConfig, zip: bool) -> Result<()> {
    let log_dir = LogFileIdentity::new(&config.base_path, config.append_date).log_dir();
    let report = ArchiveSweep::new(&log_dir)
        .zip_old_directories(zip || config.zip_old_directories)
        .run();

    println!("Log directory: {}", log_dir.display());
    println!("  Moved: {}", report.moved.len());
    for path in &report.moved {
        println!("    {}", path.display());
    }
    println!("  Deduplicated: {}", report.deduplicated.len());
    for path in &report.deduplicated {
        println!("    {}", path.display());
    }
    println!("  Zipped: {}", report.zipped.len());
    for path in &report.zipped {
        println!("    {}", path.display());
    }
    for warning in &report.warnings {
        println!("  Warning: {}", warning);
    }
    Ok(())
}

fn process(
    config: FileSinkConfig,
    root: &Path,
    patterns: &[String],
    recursive: bool,
    dirs: bool,
    max_depth: Option<usize>,
) -> Result<()> {
    let mut options = WalkOptions::new(root).recursive(recursive).target(if dirs {
        WalkTarget::Directories
    } else {
        WalkTarget::Files
    });
    for pattern in patterns {
        options = options.with_pattern(pattern)?;
    }
    if let Some(depth) = max_depth {
        options = options.max_depth(depth);
    }

    let sink = FileSink::new(config)?;
    let mut observer = LoggingObserver::new(sink.clone(), "process");
    let mut handler = |path: &Path| -> HandlerResult {
        let metadata = std::fs::metadata(path)?;
        sink.info(&format!("{} ({} bytes)", path.display(), metadata.len()));
        Ok(())
    };

    let result = TreeWalker::new(options).run(&mut handler, &mut observer);
    let flushed = sink.shutdown();
    let summary = result?;

    println!("Processed {}", root.display());
    println!("  Matched: {}", summary.matched);
    println!("  Processed: {}", summary.processed);
    println!("  Failed: {}", summary.failed);
    println!("  Log: {}", sink.current_log_path().display());
    if !flushed {
        bail!("Timed out writing to {}", sink.current_log_path().display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = resolve_config(&cli)?;
    tracing::debug!(base = %config.base_path.display(), "Resolved log configuration");

    match &cli.command {
        Commands::Path => print_path(config),
        Commands::Write {
            message_level,
            message,
        } => write_message(config, message_level, message),
        Commands::Archive { zip } => archive(config, *zip),
        Commands::Process {
            root,
            patterns,
            recursive,
            dirs,
            max_depth,
        } => process(config, root, patterns, *recursive, *dirs, *max_depth),
    }
}
