//! # dfsctl
//!
//! Maintenance tool for decomposed filesystem storage: consistency checks,
//! revision purges and trash cleanup.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dfs_audit::CancelToken;
use dfs_config::logging::{init_logging, LogLevel};
use dfs_config::{log_cli_debug, Config};

mod consistency;
mod metadata;
mod revisions;
mod storage;
mod trash;

/// dfsctl - audit and clean up decomposed filesystem storage
#[derive(Parser)]
#[command(name = "dfsctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Abort the run after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Storage consistency
    Consistency {
        #[command(subcommand)]
        command: ConsistencyCommands,
    },

    /// File revisions
    Revisions {
        #[command(subcommand)]
        command: RevisionsCommands,
    },

    /// Trash
    Trash {
        #[command(subcommand)]
        command: TrashCommands,
    },

    /// Node metadata
    Metadata {
        #[command(subcommand)]
        command: MetadataCommands,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConsistencyCommands {
    /// Report orphaned or missing nodes, symlinks, metadata and blobs
    Check(consistency::CheckArgs),
    /// Recompute container tree sizes of a space and report wrong ones
    CheckTreesize(consistency::TreeSizeArgs),
}

#[derive(Subcommand)]
enum RevisionsCommands {
    /// Delete all file revisions and the blobs they own
    Purge(revisions::PurgeArgs),
}

#[derive(Subcommand)]
enum TrashCommands {
    /// Remove trash entries whose trashed node no longer exists
    PurgeOrphanedDirs(trash::PurgeArgs),
}

#[derive(Subcommand)]
enum MetadataCommands {
    /// Print the attributes stored in a node's metadata file
    Dump(metadata::DumpArgs),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print where configuration files are looked up
    Path,
}

/// `--dry-run[=true|false]`, shared by the purge commands
#[derive(Args, Debug, Clone, Copy)]
pub struct DryRunArg {
    /// Only report what would be deleted [default from config: true]
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    dry_run: Option<bool>,
}

impl DryRunArg {
    pub fn resolve(&self, configured: bool) -> bool {
        self.dry_run.unwrap_or(configured)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    let level = config.log.level.parse().unwrap_or(LogLevel::Warn);
    init_logging(level);
    log_cli_debug!("Configuration loaded", level = level.as_filter());

    let cancel = match cli.timeout {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };

    match cli.command {
        Commands::Consistency {
            command: ConsistencyCommands::Check(args),
        } => consistency::run(&config, args, &cancel),
        Commands::Consistency {
            command: ConsistencyCommands::CheckTreesize(args),
        } => consistency::run_treesize(&config, args, &cancel),
        Commands::Revisions {
            command: RevisionsCommands::Purge(args),
        } => revisions::run(&config, args, &cancel),
        Commands::Trash {
            command: TrashCommands::PurgeOrphanedDirs(args),
        } => trash::run(&config, args, &cancel),
        Commands::Metadata {
            command: MetadataCommands::Dump(args),
        } => metadata::run(&config, args),
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigCommands::Path => {
                let global = Config::global_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(no home directory)".to_string());
                println!("Global:  {}", global);
                println!("Project: {}", Config::project_config_path().display());
                Ok(())
            }
        },
    }
}
