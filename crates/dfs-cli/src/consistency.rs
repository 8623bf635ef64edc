//! # dfsctl consistency check / check-treesize
//!
//! Read-only: both print their report and exit 0 whatever they find.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use console::{style, Emoji};
use dfs_audit::consistency::InconsistencyMap;
use dfs_audit::{check, check_treesize, CancelToken, Report, TreeSizeReport};
use dfs_config::Config;

use crate::storage::StorageArgs;

static CHECK: Emoji<'_, '_> = Emoji("✔ ", "[ok] ");
static CROSS: Emoji<'_, '_> = Emoji("✘ ", "[!!] ");

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args, Debug)]
pub struct TreeSizeArgs {
    /// Storage base path (the directory holding `spaces/`)
    #[arg(long = "basepath", short = 'p', visible_alias = "storage-path")]
    base_path: Option<PathBuf>,

    /// ID of the space to check
    #[arg(long = "node", short = 'n', value_name = "SPACE_ID")]
    space_id: String,
}

pub fn run(config: &Config, args: CheckArgs, cancel: &CancelToken) -> Result<()> {
    let storage = args.storage.open(config)?;
    let Some(blobstore) = storage.blobstore else {
        bail!(
            "consistency check needs a blobstore (ocis or s3ng), got {}",
            storage.kind
        );
    };

    let report = check(&storage.base_path, blobstore, cancel).context("Consistency check failed")?;
    print!("{}", render(&report));
    Ok(())
}

/// Plain-text report, one section per non-empty map
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "{}\n",
        style("Consistency check").bold().cyan()
    ));
    out.push_str(&format!("{}\n", style("─".repeat(40)).dim()));

    if report.is_consistent() {
        out.push_str(&format!(
            "  {} {}\n\n",
            CHECK,
            style("no inconsistency found").green()
        ));
        return out;
    }

    let none = BTreeMap::new();
    section(&mut out, "Nodes", &report.nodes, &none, "");
    section(
        &mut out,
        "Linked nodes",
        &report.linked_nodes,
        &report.owning_links,
        "linked from",
    );
    section(&mut out, "Blobs", &report.blobs, &none, "");
    section(
        &mut out,
        "Blob references",
        &report.blob_references,
        &report.referencing_nodes,
        "referenced by",
    );

    out.push_str(&format!("{}\n", style("─".repeat(40)).dim()));
    out.push_str(&format!(
        "  {} inconsistencies found\n\n",
        style(report.len()).red().bold()
    ));
    out
}

pub fn run_treesize(config: &Config, args: TreeSizeArgs, cancel: &CancelToken) -> Result<()> {
    let base_path = config
        .base_path(args.base_path.as_deref())
        .context("Invalid storage base path")?;
    let report = check_treesize(&base_path, &args.space_id, cancel)
        .context("Tree size check failed")?;
    print!("{}", render_treesize(&report));
    Ok(())
}

/// One block per mismatch, the space root last
pub fn render_treesize(report: &TreeSizeReport) -> String {
    let mut out = format!(
        "Checking treesizes in space: {} (id: {})\n",
        style(&report.space_name).bold(),
        report.space_id
    );
    if report.is_consistent() {
        out.push_str(&format!(
            "  {} {}\n",
            CHECK,
            style(format!(
                "no tree size mismatch found in {} containers",
                report.containers
            ))
            .green()
        ));
        return out;
    }

    for mismatch in &report.mismatches {
        let heading = if mismatch.node_id == report.space_id {
            format!("Tree sizes mismatch for space: {}", report.space_name)
        } else {
            format!("Tree sizes mismatch for node: {}", mismatch.origin)
        };
        out.push_str(&format!("{} {}\n", CROSS, style(heading).red()));
        out.push_str(&format!("\tNodeId: {}\n", mismatch.node_id));
        out.push_str(&format!(
            "\tInternalPath: {}\n",
            mismatch.internal_path.display()
        ));
        out.push_str(&format!("\tcalculated treesize: {}\n", mismatch.calculated));
        out.push_str(&format!("\ttreesize in metadata: {}\n", mismatch.recorded));
    }
    out
}

fn section(
    out: &mut String,
    title: &str,
    entries: &InconsistencyMap,
    owners: &BTreeMap<PathBuf, PathBuf>,
    owner_label: &str,
) {
    if entries.is_empty() {
        return;
    }
    out.push_str(&format!(
        "\n{} ({})\n",
        style(title).bold(),
        entries.len()
    ));
    for (path, inconsistencies) in entries {
        let labels: Vec<&str> = inconsistencies.iter().map(|i| i.as_str()).collect();
        out.push_str(&format!(
            "  {} {}: {}\n",
            CROSS,
            path.display(),
            style(labels.join(", ")).red()
        ));
        if let Some(owner) = owners.get(path) {
            out.push_str(&format!(
                "      {} {}\n",
                style(owner_label).dim(),
                owner.display()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_audit::Inconsistency;

    #[test]
    fn test_render_treesize() {
        let mut report = TreeSizeReport {
            space_id: "s1".into(),
            space_name: "Project".into(),
            containers: 3,
            mismatches: Vec::new(),
        };
        let text = render_treesize(&report);
        assert!(text.contains("s1"));
        assert!(text.contains("no tree size mismatch found in 3 containers"));

        report.mismatches = vec![
            dfs_audit::TreeSizeMismatch {
                origin: "/docs".into(),
                node_id: "n1".into(),
                internal_path: PathBuf::from("/s/nodes/n1"),
                calculated: 8,
                recorded: 7,
            },
            dfs_audit::TreeSizeMismatch {
                origin: "/".into(),
                node_id: "s1".into(),
                internal_path: PathBuf::from("/s/nodes/s1"),
                calculated: 10,
                recorded: 9,
            },
        ];
        let text = render_treesize(&report);
        assert!(text.contains("Tree sizes mismatch for node: /docs"));
        assert!(text.contains("\tNodeId: n1\n\tInternalPath: /s/nodes/n1\n"));
        assert!(text.contains("\tcalculated treesize: 8\n\ttreesize in metadata: 7\n"));
        assert!(text.contains("Tree sizes mismatch for space: Project"));
        assert!(!text.contains("no tree size mismatch"));
    }

    #[test]
    fn test_render_clean_report() {
        let text = render(&Report::default());
        assert!(text.contains("no inconsistency found"));
    }

    #[test]
    fn test_render_groups_by_map() {
        let mut report = Report::default();
        report.linked_nodes.insert(
            PathBuf::from("/s/nodes/aa/bb/cc/dd/-gone"),
            vec![Inconsistency::NodeMissing],
        );
        report.owning_links.insert(
            PathBuf::from("/s/nodes/aa/bb/cc/dd/-gone"),
            PathBuf::from("/s/nodes/11/22/33/44/-root/child"),
        );
        report
            .blobs
            .insert(PathBuf::from("/s/blobs/x"), vec![Inconsistency::BlobOrphaned]);

        let text = render(&report);
        assert!(text.contains("Linked nodes (1)"));
        assert!(text.contains("node missing"));
        assert!(text.contains("linked from"));
        assert!(text.contains("/s/nodes/11/22/33/44/-root/child"));
        assert!(text.contains("Blobs (1)"));
        assert!(text.contains("blob orphaned"));
        assert!(!text.contains("Blob references"));
        assert!(text.contains("2 inconsistencies found"));
    }
}
