//! Engine configuration
//!
//! Every field has a default, so a TOML file only needs the values it
//! changes:
//!
//! ```toml
//! retention_days = 14
//! case_insensitive_keys = true
//! ```

use flex_model::KeyPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest accepted retention window, in days
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Largest accepted `max_page_size`
pub const MAX_PAGE_SIZE_LIMIT: usize = 10_000;

/// Configuration of a [`crate::FlexTables`] instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexConfig {
    /// Days a soft-deleted record stays restorable
    pub retention_days: u32,

    /// Records removed per purge batch
    pub purge_batch_size: usize,

    /// Seconds between purge runs of the background worker
    pub purge_interval_secs: u64,

    /// Page size when a query names no limit
    pub default_page_size: usize,

    /// Upper bound for a query limit
    pub max_page_size: usize,

    /// Lowercase property keys before validating and matching them
    pub case_insensitive_keys: bool,
}

impl FlexConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_purge_batch_size(mut self, size: usize) -> Self {
        self.purge_batch_size = size;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_purge_interval_secs(mut self, secs: u64) -> Self {
        self.purge_interval_secs = secs;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_page_sizes(mut self, default: usize, max: usize) -> Self {
        self.default_page_size = default;
        self.max_page_size = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_case_insensitive_keys(mut self, enabled: bool) -> Self {
        self.case_insensitive_keys = enabled;
        self
    }

    /// Retention window as a duration
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    #[must_use]
    pub fn purge_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.purge_interval_secs)
    }

    #[must_use]
    pub fn key_policy(&self) -> KeyPolicy {
        if self.case_insensitive_keys {
            KeyPolicy::case_insensitive()
        } else {
            KeyPolicy::strict()
        }
    }

    /// Reject values the engine cannot run with
    ///
    /// A zero retention window is allowed: deleted records expire at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::invalid(
                "retention_days",
                format!("must be at most {MAX_RETENTION_DAYS}"),
            ));
        }
        if self.purge_batch_size == 0 {
            return Err(ConfigError::invalid("purge_batch_size", "must be at least 1"));
        }
        if self.purge_interval_secs == 0 {
            return Err(ConfigError::invalid("purge_interval_secs", "must be at least 1"));
        }
        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE_LIMIT {
            return Err(ConfigError::invalid(
                "max_page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE_LIMIT}"),
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::invalid(
                "default_page_size",
                format!("must be between 1 and max_page_size ({})", self.max_page_size),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            purge_batch_size: 500,
            purge_interval_secs: 3600,
            default_page_size: 50,
            max_page_size: 500,
            case_insensitive_keys: false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
