use anyhow::{Context, Result};
use clap::Args;
use console::style;
use dfs_audit::revisions::{purge_revisions, PurgeOptions, RevisionEntry, Strategy};
use dfs_audit::CancelToken;
use dfs_config::Config;

use crate::storage::StorageArgs;
use crate::DryRunArg;

#[derive(Args, Debug)]
pub struct PurgeArgs {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(flatten)]
    dry_run: DryRunArg,

    /// Print every deleted file
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Traversal used to find revisions: glob, walk or list
    #[arg(long)]
    strategy: Option<String>,
}

pub fn run(config: &Config, args: PurgeArgs, cancel: &CancelToken) -> Result<()> {
    let storage = args.storage.open(config)?;
    let strategy: Strategy = args
        .strategy
        .as_deref()
        .unwrap_or(&config.revisions.strategy)
        .parse()
        .map_err(anyhow::Error::msg)?;
    let options = PurgeOptions {
        strategy,
        dry_run: args.dry_run.resolve(config.revisions.dry_run),
    };
    let verbose = args.verbose || config.revisions.verbose;

    if options.dry_run {
        println!("{}", style("Dry run: nothing will be deleted").yellow());
    }

    let stats = purge_revisions(
        &storage.base_path,
        storage.blobstore.as_deref(),
        options,
        cancel,
        |entry| {
            if verbose {
                println!("{}", describe(entry));
            }
        },
    )
    .context("Revision purge failed")?;

    println!("{}", stats.summary());
    Ok(())
}

fn describe(entry: &RevisionEntry) -> String {
    let mut line = format!(
        "space {} node {} {}",
        entry.space_id,
        entry.node_id,
        entry.path.display()
    );
    if let Some(blob_id) = &entry.blob_id {
        line.push_str(&format!(" blob {}", blob_id));
    }
    line
}
