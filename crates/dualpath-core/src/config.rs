//! Experiment configuration
//!
//! The run-time knobs of an experiment: execution mode, timeout and whether a
//! mismatch surfaces to the caller. Loadable from TOML:
//!
//! ```toml
//! concurrency = "concurrent"
//! timeout_ms = 500
//! error_on_mismatch = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How behaviors are scheduled within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// Control first, then each candidate in registration order
    #[default]
    Sequential,
    /// Every behavior launched in parallel
    Concurrent,
}

/// Experiment configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Execution mode
    pub concurrency: Concurrency,
    /// Shared per-run deadline in milliseconds (concurrent mode only)
    pub timeout_ms: Option<u64>,
    /// Return a mismatch error instead of the control's value
    pub error_on_mismatch: bool,
}

impl ExperimentConfig {
    /// Create default (sequential) configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Concurrent configuration with an optional timeout
    ///
    /// The timeout has millisecond granularity.
    #[must_use]
    pub fn concurrent(timeout: Option<Duration>) -> Self {
        Self::new().with_concurrency(Concurrency::Concurrent).with_timeout(timeout)
    }

    /// With execution mode
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// With timeout
    ///
    /// Rounded up to whole milliseconds, so any nonzero duration stays nonzero.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(|t| {
            let ms = t.as_nanos().div_ceil(1_000_000);
            u64::try_from(ms).unwrap_or(u64::MAX)
        });
        self
    }

    /// With error-on-mismatch flag
    #[inline]
    #[must_use]
    pub fn with_error_on_mismatch(mut self, enabled: bool) -> Self {
        self.error_on_mismatch = enabled;
        self
    }

    /// Configured timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check if behaviors run concurrently
    #[inline]
    #[must_use]
    pub fn is_concurrent(&self) -> bool {
        self.concurrency == Concurrency::Concurrent
    }

    /// Validate field combinations
    ///
    /// # Errors
    /// - `ConfigError::InvalidTimeout` for a zero timeout
    /// - `ConfigError::TimeoutRequiresConcurrency` for a timeout in sequential mode
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.timeout_ms {
            Some(0) => Err(ConfigError::InvalidTimeout),
            Some(_) if !self.is_concurrent() => Err(ConfigError::TimeoutRequiresConcurrency),
            _ => Ok(()),
        }
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed input, or any validation error.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`ExperimentConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::from_toml_str(&source)
    }
}
