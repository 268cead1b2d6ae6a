//! File-backed defaults for the access layers.
//!
//! A config file is optional TOML:
//!
//! ```toml
//! [database]
//! path = "users.db"
//! busy_timeout_ms = 5000
//! read_only = false
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 2000
//! jitter_ms = 0
//!
//! [stream]
//! page_size = 100
//! batch_size = 50
//!
//! [cache]
//! capacity = 1024
//! ```
//!
//! Missing sections and keys keep their defaults.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::access::RetryPolicy;
use crate::source::SqliteOptions;

/// Settings shared by the CLI and embedding applications.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessOptions {
    /// Database file, if one was configured.
    pub database: Option<PathBuf>,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
    /// Open the database read-only.
    pub read_only: bool,
    /// Retry settings for transient failures.
    pub retry: RetryPolicy,
    /// Rows per window for lazy pagination.
    pub page_size: usize,
    /// Rows per batch for batch streaming.
    pub batch_size: usize,
    /// Upper bound on cached results; `None` keeps every result.
    pub cache_capacity: Option<NonZeroUsize>,
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout: SqliteOptions::default().busy_timeout,
            read_only: false,
            retry: RetryPolicy::default(),
            page_size: 100,
            batch_size: 50,
            cache_capacity: None,
        }
    }
}

impl AccessOptions {
    /// Loads options from `explicit`, or from [`default_config_path`] when no
    /// path is given. A default path that does not exist yields the defaults;
    /// an explicit path that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&contents).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse { path, source },
            ParseFailure::Invalid(err) => err,
        })
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            },
            ParseFailure::Invalid(err) => err,
        })
    }

    /// SQLite driver options derived from these settings.
    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            busy_timeout: self.busy_timeout,
            read_only: self.read_only,
            ..SqliteOptions::default()
        }
    }

    fn parse(contents: &str) -> Result<Self, ParseFailure> {
        let raw: RawConfig = toml::from_str(contents).map_err(ParseFailure::Toml)?;
        let mut options = Self::default();

        options.database = raw.database.path;
        if let Some(ms) = raw.database.busy_timeout_ms {
            options.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(read_only) = raw.database.read_only {
            options.read_only = read_only;
        }

        if let Some(max_attempts) = raw.retry.max_attempts {
            if max_attempts == 0 {
                return Err(ParseFailure::Invalid(ConfigError::Invalid {
                    key: "retry.max_attempts",
                    reason: "must be at least 1",
                }));
            }
            options.retry.max_attempts = max_attempts;
        }
        if let Some(ms) = raw.retry.delay_ms {
            options.retry.delay = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.retry.jitter_ms {
            options.retry.jitter = Duration::from_millis(ms);
        }

        if let Some(page_size) = raw.stream.page_size {
            options.page_size = positive("stream.page_size", page_size)?;
        }
        if let Some(batch_size) = raw.stream.batch_size {
            options.batch_size = positive("stream.batch_size", batch_size)?;
        }

        if let Some(capacity) = raw.cache.capacity {
            options.cache_capacity = Some(
                NonZeroUsize::new(capacity).ok_or(ParseFailure::Invalid(ConfigError::Invalid {
                    key: "cache.capacity",
                    reason: "must be at least 1",
                }))?,
            );
        }
        Ok(options)
    }
}

fn positive(key: &'static str, value: usize) -> Result<usize, ParseFailure> {
    if value == 0 {
        return Err(ParseFailure::Invalid(ConfigError::Invalid {
            key,
            reason: "must be at least 1",
        }));
    }
    Ok(value)
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default)]
    stream: RawStream,
    #[serde(default)]
    cache: RawCache,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDatabase {
    path: Option<PathBuf>,
    busy_timeout_ms: Option<u64>,
    read_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetry {
    max_attempts: Option<u32>,
    delay_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStream {
    page_size: Option<usize>,
    batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCache {
    capacity: Option<usize>,
}

/// Errors raised while loading [`AccessOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("config value {key} {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// `<config dir>/rowguard/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("rowguard").join("config.toml"))
}
