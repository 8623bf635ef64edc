//! Integration tests for dfs-config
//!
//! These tests exercise config files and base path resolution against a real
//! file system.

use std::fs;
use std::path::PathBuf;

use dfs_config::{Config, ConfigError};
use tempfile::tempdir;

#[test]
fn test_load_config_from_file() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join(".dfsctl");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        r#"
[storage]
base_path = "/srv/storage/users"
blobstore = "s3ng"
s3ng_bucket_path = "/mnt/bucket"

[revisions]
dry_run = false
strategy = "list"

[log]
level = "debug"
"#,
    )
    .unwrap();

    let config = Config::from_file(&dir.join("config.toml")).unwrap();
    assert_eq!(
        config.storage.base_path,
        Some(PathBuf::from("/srv/storage/users"))
    );
    assert_eq!(config.storage.blobstore, "s3ng");
    assert_eq!(
        config.storage.s3ng_bucket_path,
        Some(PathBuf::from("/mnt/bucket"))
    );
    assert!(!config.revisions.dry_run);
    assert_eq!(config.revisions.strategy, "list");
    // Untouched sections keep their defaults
    assert!(config.trash.dry_run);
    assert_eq!(config.log.level, "debug");
}

#[test]
fn test_project_config_overrides_global() {
    let temp = tempdir().unwrap();
    let global_path = temp.path().join("global.toml");
    let project_path = temp.path().join("project.toml");
    fs::write(
        &global_path,
        "[storage]\nbase_path = \"/global\"\n\n[trash]\ndry_run = false\n",
    )
    .unwrap();
    fs::write(&project_path, "[storage]\nbase_path = \"/project\"\n").unwrap();

    let mut config = Config::from_file(&global_path).unwrap();
    config.merge(Config::from_file(&project_path).unwrap());

    assert_eq!(config.storage.base_path, Some(PathBuf::from("/project")));
    assert!(!config.trash.dry_run);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[storage\nbase_path = ").unwrap();

    assert!(matches!(
        Config::from_file(&path),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn test_base_path_explicit_wins_over_config() {
    let configured = tempdir().unwrap();
    let explicit = tempdir().unwrap();

    let mut config = Config::default();
    config.storage.base_path = Some(configured.path().to_path_buf());

    assert_eq!(config.base_path(None).unwrap(), configured.path());
    assert_eq!(
        config.base_path(Some(explicit.path())).unwrap(),
        explicit.path()
    );
}

#[test]
fn test_base_path_must_exist() {
    let mut config = Config::default();
    config.storage.base_path = Some(PathBuf::from("/nonexistent/dfsctl/base"));
    assert!(matches!(
        config.base_path(None),
        Err(ConfigError::InvalidBasePath { .. })
    ));
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let mut config = Config::default();
    config.storage.blobstore = "none".to_string();
    config.revisions.verbose = true;

    let parsed: Config = toml::from_str(&config.to_toml().unwrap()).unwrap();
    assert_eq!(parsed.storage.blobstore, "none");
    assert!(parsed.revisions.verbose);
}
