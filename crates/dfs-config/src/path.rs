//! Base path helpers.
//!
//! Every command starts from a storage base path handed in by the operator.
//! These helpers turn it into something the crawlers can rely on.

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Validate a storage base path.
///
/// The path must exist and be a directory. The returned path is the input
/// unchanged (not canonicalized) so that paths reported by the crawlers stay
/// under the prefix the operator typed.
pub fn validate_base_path(path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(ConfigError::MissingBasePath);
    }

    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(path.to_path_buf()),
        Ok(_) => Err(ConfigError::InvalidBasePath {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidBasePath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
