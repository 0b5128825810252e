//! Index Lifecycle - Main entry point
//!
//! Runs one lifecycle operation against the configured cluster and prints
//! the structured report as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use index_lifecycle::backup::BackupReason;
use index_lifecycle::report::{LifecycleReport, RunStatus};
use index_lifecycle::{utils, Config, LifecycleOrchestrator};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate every index against the schema, creating or rebuilding as needed
    Check {
        /// Delete and recreate every index blank
        #[arg(long)]
        force_restore: bool,
    },
    /// Export every index into a new zip archive
    Backup {
        /// Reason tag recorded in the archive name (auto, update, manual, ...)
        #[arg(long, default_value = "manual")]
        reason: BackupReason,
    },
    /// Wipe every index and replay the given archive
    Restore {
        /// Archive file name inside the backup directory
        filename: String,
    },
    /// List available archives, newest first
    List,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting index-lifecycle v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.engine.url
    );

    let orchestrator = LifecycleOrchestrator::from_config(config)?;

    let report = match args.command {
        Command::Check { force_restore } => orchestrator.index_check(force_restore).await,
        Command::Backup { reason } => orchestrator.backup_all_indexes(&reason).await,
        Command::Restore { filename } => orchestrator.restore_from_backup(&filename).await,
        Command::List => {
            let backups = orchestrator.get_available_backups()?;
            println!("{}", serde_json::to_string_pretty(&backups)?);
            return Ok(ExitCode::SUCCESS);
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(exit_code(&report))
}

fn exit_code(report: &LifecycleReport) -> ExitCode {
    match report.status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::Failure => {
            tracing::error!("{:?} failed: {}", report.operation, report.error.as_deref().unwrap_or("every index failed"));
            ExitCode::from(1)
        }
        RunStatus::Partial => {
            tracing::warn!("{:?} finished with failures for {:?}", report.operation, report.affected());
            ExitCode::from(2)
        }
    }
}
