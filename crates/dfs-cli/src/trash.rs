use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use dfs_audit::{purge_orphaned_trash, CancelToken};
use dfs_config::Config;

use crate::DryRunArg;

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Storage base path (the directory holding `spaces/`)
    #[arg(long = "basepath", short = 'p', visible_alias = "storage-path")]
    base_path: Option<PathBuf>,

    #[command(flatten)]
    dry_run: DryRunArg,
}

pub fn run(config: &Config, args: PurgeArgs, cancel: &CancelToken) -> Result<()> {
    let base_path = config
        .base_path(args.base_path.as_deref())
        .context("Invalid storage base path")?;
    let dry_run = args.dry_run.resolve(config.trash.dry_run);

    if dry_run {
        println!("{}", style("Dry run: nothing will be removed").yellow());
    }

    let stats = purge_orphaned_trash(&base_path, dry_run, cancel, |entry, removed| {
        let verb = if removed { "removed" } else { "abandoned" };
        println!(
            "{} {} -> {}",
            style(verb).dim(),
            entry.link.display(),
            entry.target.display()
        );
    })
    .context("Trash purge failed")?;

    println!("{}", stats.summary());
    Ok(())
}
