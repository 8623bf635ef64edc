//! Storage location flags shared by the commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use dfs_blobstore::{Blobstore, BlobstoreKind};
use dfs_config::{log_cli_info, Config};

#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Storage base path (the directory holding `spaces/`)
    #[arg(long = "basepath", short = 'p', visible_alias = "storage-path")]
    pub base_path: Option<PathBuf>,

    /// Blobstore type: ocis, s3ng or none
    #[arg(long, short = 'b')]
    pub blobstore: Option<String>,

    /// Local mount of the s3ng bucket
    #[arg(long)]
    pub s3ng_bucket_path: Option<PathBuf>,
}

/// Validated storage location plus the blobstore to use (none for `none`)
pub struct Storage {
    pub base_path: PathBuf,
    pub kind: BlobstoreKind,
    pub blobstore: Option<Arc<dyn Blobstore>>,
}

impl StorageArgs {
    /// Resolve flags over config, validate, and open the blobstore.
    pub fn open(&self, config: &Config) -> Result<Storage> {
        let base_path = config
            .base_path(self.base_path.as_deref())
            .context("Invalid storage base path")?;

        let kind: BlobstoreKind = self
            .blobstore
            .as_deref()
            .unwrap_or(&config.storage.blobstore)
            .parse()?;

        let bucket = self
            .s3ng_bucket_path
            .clone()
            .or_else(|| config.storage.s3ng_bucket_path.clone());

        let blobstore = dfs_blobstore::open(kind, &base_path, bucket.as_deref())
            .with_context(|| format!("Failed to open {} blobstore", kind))?;

        log_cli_info!(
            "Storage resolved",
            base_path = tracing::field::display(base_path.display()),
            blobstore = tracing::field::display(kind)
        );

        Ok(Storage {
            base_path,
            kind,
            blobstore,
        })
    }
}
