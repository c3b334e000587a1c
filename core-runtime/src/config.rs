//! # Coordinator Configuration
//!
//! Timing and capacity settings for the sync and export coordinators.
//!
//! ## Overview
//!
//! Both coordinators share one configuration shape. Durations are stored as
//! milliseconds so the struct serializes cleanly into host settings files;
//! `Duration` accessors are provided for the runtime.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoordinatorConfig;
//!
//! let config = CoordinatorConfig::builder()
//!     .throttle_delay_ms(1500)
//!     .retry_delay_ms(5000)
//!     .max_retries(3)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.throttle_delay().as_millis(), 1500);
//! ```
//!
//! ## Error Handling
//!
//! The builder validates ranges and returns actionable messages:
//!
//! ```should_panic
//! use core_runtime::config::CoordinatorConfig;
//!
//! let config = CoordinatorConfig::builder()
//!     .retry_delay_ms(0)
//!     .build()
//!     .expect("Should fail - zero retry delay");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for throttle and retry delays (10 minutes).
const MAX_DELAY_MS: u64 = 10 * 60 * 1000;

/// Upper bound for a single provider call (1 hour).
const MAX_ACTION_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Upper bound for retry attempts.
const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound for the in-memory result log.
const MAX_RESULT_LOG_CAPACITY: usize = 10_000;

/// Default number of results kept per coordinator.
pub const DEFAULT_RESULT_LOG_CAPACITY: usize = 100;

/// Configuration for one coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Quiet period after the last event for a key before its action runs
    pub throttle_delay_ms: u64,

    /// Base retry delay; the Nth retry waits `retry_delay_ms * N`
    pub retry_delay_ms: u64,

    /// Retries allowed after the first failed attempt
    pub max_retries: u32,

    /// Deadline for a single provider or generator call
    pub action_timeout_ms: u64,

    /// Number of results retained, newest first
    pub result_log_capacity: usize,

    /// Whether the coordinator starts enabled
    pub enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::sync_defaults()
    }
}

impl CoordinatorConfig {
    /// Defaults for the entity sync coordinator.
    pub fn sync_defaults() -> Self {
        Self {
            throttle_delay_ms: 2000,
            retry_delay_ms: 5000,
            max_retries: 3,
            action_timeout_ms: 30_000,
            result_log_capacity: DEFAULT_RESULT_LOG_CAPACITY,
            enabled: true,
        }
    }

    /// Defaults for the project export coordinator.
    ///
    /// Status changes are rare compared to keystroke-driven saves, so the
    /// throttle window is shorter while generation gets a longer deadline.
    pub fn export_defaults() -> Self {
        Self {
            throttle_delay_ms: 1000,
            retry_delay_ms: 5000,
            max_retries: 3,
            action_timeout_ms: 60_000,
            result_log_capacity: DEFAULT_RESULT_LOG_CAPACITY,
            enabled: true,
        }
    }

    /// Creates a builder seeded with [`CoordinatorConfig::sync_defaults`].
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::new(Self::sync_defaults())
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Throttle delay does not exceed 10 minutes
    /// - Retry delay is positive and does not exceed 10 minutes
    /// - Retry count is at most 10
    /// - Action timeout is positive and at most 1 hour
    /// - Result log capacity is between 1 and 10,000
    pub fn validate(&self) -> Result<()> {
        if self.throttle_delay_ms > MAX_DELAY_MS {
            return Err(Error::Config(format!(
                "Throttle delay exceeds maximum of {}ms",
                MAX_DELAY_MS
            )));
        }

        if self.retry_delay_ms == 0 {
            return Err(Error::Config(
                "Retry delay must be greater than 0ms".to_string(),
            ));
        }

        if self.retry_delay_ms > MAX_DELAY_MS {
            return Err(Error::Config(format!(
                "Retry delay exceeds maximum of {}ms",
                MAX_DELAY_MS
            )));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::Config(format!(
                "Max retries cannot exceed {}",
                MAX_RETRIES_LIMIT
            )));
        }

        if self.action_timeout_ms == 0 {
            return Err(Error::Config(
                "Action timeout must be greater than 0ms".to_string(),
            ));
        }

        if self.action_timeout_ms > MAX_ACTION_TIMEOUT_MS {
            return Err(Error::Config(format!(
                "Action timeout exceeds maximum of {}ms",
                MAX_ACTION_TIMEOUT_MS
            )));
        }

        if self.result_log_capacity == 0 || self.result_log_capacity > MAX_RESULT_LOG_CAPACITY {
            return Err(Error::Config(format!(
                "Result log capacity must be between 1 and {}",
                MAX_RESULT_LOG_CAPACITY
            )));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoordinatorConfig`] instances.
///
/// Unset fields keep the value of the base configuration the builder was
/// created from. [`build()`](CoordinatorConfigBuilder::build) validates the
/// result.
#[derive(Debug, Clone)]
pub struct CoordinatorConfigBuilder {
    base: CoordinatorConfig,
    throttle_delay_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    max_retries: Option<u32>,
    action_timeout_ms: Option<u64>,
    result_log_capacity: Option<usize>,
    enabled: Option<bool>,
}

impl CoordinatorConfigBuilder {
    /// Start from an explicit base configuration.
    ///
    /// ```
    /// use core_runtime::config::{CoordinatorConfig, CoordinatorConfigBuilder};
    ///
    /// let config = CoordinatorConfigBuilder::new(CoordinatorConfig::export_defaults())
    ///     .enabled(false)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.throttle_delay_ms, 1000);
    /// assert!(!config.enabled);
    /// ```
    pub fn new(base: CoordinatorConfig) -> Self {
        Self {
            base,
            throttle_delay_ms: None,
            retry_delay_ms: None,
            max_retries: None,
            action_timeout_ms: None,
            result_log_capacity: None,
            enabled: None,
        }
    }

    pub fn throttle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.throttle_delay_ms = Some(delay_ms);
        self
    }

    pub fn retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = Some(delay_ms);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn action_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.action_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn result_log_capacity(mut self, capacity: usize) -> Self {
        self.result_log_capacity = Some(capacity);
        self
    }

    /// Sets whether the coordinator starts enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any value is out of range.
    pub fn build(self) -> Result<CoordinatorConfig> {
        let base = self.base;
        let config = CoordinatorConfig {
            throttle_delay_ms: self.throttle_delay_ms.unwrap_or(base.throttle_delay_ms),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            action_timeout_ms: self.action_timeout_ms.unwrap_or(base.action_timeout_ms),
            result_log_capacity: self
                .result_log_capacity
                .unwrap_or(base.result_log_capacity),
            enabled: self.enabled.unwrap_or(base.enabled),
        };

        config.validate()?;

        Ok(config)
    }
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        CoordinatorConfig::builder()
    }
}
