//! `dfsctl metadata dump`: print a node's msgpack attributes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use dfs_audit::grammar::{self, NodeIds, METADATA_EXT};
use dfs_audit::metadata::{self, Attributes};
use dfs_config::Config;

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Storage base path, needed when the node is given by ID
    #[arg(long = "basepath", short = 'p', visible_alias = "storage-path")]
    base_path: Option<PathBuf>,

    /// Path to the node (or its `.mpk` file), or its ID as
    /// `[<storage>$]<space>[!<node>]`
    #[arg(long, short = 'n')]
    node: String,

    /// Only print this attribute
    #[arg(long, short = 'a')]
    attribute: Option<String>,
}

pub fn run(config: &Config, args: DumpArgs) -> Result<()> {
    let node = resolve_node(config, &args)?;
    let path = metadata_file(&node);
    let attributes = metadata::read(&path)
        .with_context(|| format!("Failed to read metadata {}", path.display()))?;
    print!("{}", render(&attributes, args.attribute.as_deref()));
    Ok(())
}

/// A value with a path separator is a path, anything else a node reference.
fn resolve_node(config: &Config, args: &DumpArgs) -> Result<PathBuf> {
    if args.node.contains(std::path::MAIN_SEPARATOR) || args.node.contains('/') {
        return Ok(PathBuf::from(&args.node));
    }

    let ids = NodeIds::parse_reference(&args.node)
        .ok_or_else(|| anyhow!("invalid node id '{}'", args.node))?;
    let root = config
        .base_path(args.base_path.as_deref())
        .context("Invalid storage base path")?;
    let path = grammar::node_path(&root, &ids.space_id, &ids.node_id);
    if fs::symlink_metadata(&path).is_err() {
        bail!("can not find node '{}'", args.node);
    }
    Ok(path)
}

fn metadata_file(node: &Path) -> PathBuf {
    if node.to_string_lossy().ends_with(METADATA_EXT) {
        node.to_path_buf()
    } else {
        grammar::metadata_path(node)
    }
}

/// `name=value` lines sorted by name. An unset attribute asked for by name
/// prints as an empty string.
fn render(attributes: &Attributes, only: Option<&str>) -> String {
    if let Some(name) = only {
        let value = attributes.get(name).map(|v| v.as_slice()).unwrap_or_default();
        return format!("{}={}\n", name, metadata::render_value(value));
    }

    let mut out = String::new();
    for (name, value) in attributes {
        out.push_str(&format!("{}={}\n", name, metadata::render_value(value)));
    }
    out
}
