//! Structured logging utilities for dfsctl components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use dfs_config::{log_check_warn, log_revisions_info};
//!
//! log_check_warn!(
//!     "Failed to read directory",
//!     path = tracing::field::display(dir.display())
//! );
//! log_revisions_info!("Scan finished", found = 12);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const CHECK: &'static str = "CHECK";
    pub const REVISIONS: &'static str = "REVISIONS";
    pub const TRASH: &'static str = "TRASH";
    pub const BLOBSTORE: &'static str = "BLOBSTORE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// === CHECK logging macros ===

#[macro_export]
macro_rules! log_check_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::CHECK, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_check_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CHECK, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_check_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CHECK, $($key = $value,)* $msg)
    };
}

// === REVISIONS logging macros ===

#[macro_export]
macro_rules! log_revisions_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::REVISIONS, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_revisions_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::REVISIONS, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_revisions_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::REVISIONS, $($key = $value,)* $msg)
    };
}

// === TRASH logging macros ===

#[macro_export]
macro_rules! log_trash_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::TRASH, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_trash_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::TRASH, $($key = $value,)* $msg)
    };
}

// === BLOBSTORE logging macros ===

#[macro_export]
macro_rules! log_blobstore_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::BLOBSTORE, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_blobstore_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::BLOBSTORE, $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `DFSCTL_LOG` wins over `RUST_LOG`, which wins over `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env(crate::ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::CHECK, "CHECK");
        assert_eq!(Component::REVISIONS, "REVISIONS");
        assert_eq!(Component::TRASH, "TRASH");
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
    }
}
