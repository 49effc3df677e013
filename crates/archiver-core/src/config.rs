//! Archiver configuration
//!
//! Loaded from TOML; every key is optional and falls back to the defaults
//! below.
//!
//! ```toml
//! alias_prefix = "hca_"
//! max_concurrent_manifests = 4
//!
//! [polling]
//! step_ms = 10000
//! timeout_secs = 3600
//! poll_forever = false
//!
//! [cache]
//! enabled = true
//! max_capacity = 10000
//! ttl_secs = 3600
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// Prefix of every generated alias
    pub alias_prefix: String,
    /// Polling behavior of submission lifecycles
    pub polling: PollingOptions,
    /// Entity lookup cache
    pub cache: CacheConfig,
    /// Manifests archived at the same time
    pub max_concurrent_manifests: usize,
    /// Delete a remote submission whose population failed
    pub delete_failed_submissions: bool,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            alias_prefix: String::new(),
            polling: PollingOptions::default(),
            cache: CacheConfig::default(),
            max_concurrent_manifests: 4,
            delete_failed_submissions: true,
        }
    }
}

impl ArchiverConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// out-of-range values
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`ArchiverConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the offending key
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.step_ms == 0 {
            return Err(ConfigError::Invalid("polling.step_ms must be positive".into()));
        }
        if self.max_concurrent_manifests == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_manifests must be positive".into(),
            ));
        }
        if self.cache.enabled && self.cache.max_capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_capacity must be positive when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Set alias prefix
    #[must_use]
    pub fn with_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    /// Set polling options
    #[must_use]
    pub fn with_polling(mut self, polling: PollingOptions) -> Self {
        self.polling = polling;
        self
    }

    /// Set cache config
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set manifest fan-out
    #[must_use]
    pub fn with_max_concurrent_manifests(mut self, max: usize) -> Self {
        self.max_concurrent_manifests = max;
        self
    }

    /// Set whether failed submissions are deleted remotely
    #[must_use]
    pub fn with_delete_failed_submissions(mut self, delete: bool) -> Self {
        self.delete_failed_submissions = delete;
        self
    }
}

/// Polling options for one lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingOptions {
    /// Interval between re-checks in milliseconds
    pub step_ms: u64,
    /// Maximum wait per polled state in seconds, ignored when `poll_forever`
    pub timeout_secs: u64,
    /// Disable the timeout
    pub poll_forever: bool,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            step_ms: 10_000,
            timeout_secs: 3_600,
            poll_forever: false,
        }
    }
}

impl PollingOptions {
    /// Options with the given step and timeout
    #[must_use]
    pub fn new(step: Duration, timeout: Duration) -> Self {
        Self {
            step_ms: u64::try_from(step.as_millis()).unwrap_or(u64::MAX),
            timeout_secs: timeout.as_secs(),
            poll_forever: false,
        }
    }

    /// Options that never time out
    #[must_use]
    pub fn forever(step: Duration) -> Self {
        Self {
            poll_forever: true,
            ..Self::new(step, Duration::ZERO)
        }
    }

    /// Interval between re-checks
    #[inline]
    #[must_use]
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    /// Maximum wait, `None` when polling forever
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (!self.poll_forever).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Entity lookup cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache lookups at all
    pub enabled: bool,
    /// Maximum number of cached records
    pub max_capacity: u64,
    /// Entry time-to-live in seconds, no expiry when absent
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            ttl_secs: Some(3_600),
        }
    }
}

impl CacheConfig {
    /// Disabled cache
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
