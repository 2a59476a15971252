//! Coder configuration
//!
//! Loaded from TOML; every field has a default so partial files work.
//!
//! ```toml
//! max_retries = 5
//! policy_path = "policy/coder.mg"
//! kernel_dispatch = true
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Edit pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoderConfig {
    /// Enables safety gating
    pub safety_mode: bool,
    /// Enables the per-file block lookup
    pub impact_check: bool,
    /// LLM attempts per task
    pub max_retries: u32,
    /// Backoff base in milliseconds
    pub retry_base_ms: u64,
    /// Interval between `routing_result` queries
    pub poll_interval_ms: u64,
    /// Upper bound on a routing wait; `None` waits until cancellation
    pub routing_timeout_ms: Option<u64>,
    /// Policy file loaded into the kernel once
    pub policy_path: Option<PathBuf>,
    /// Dispatch edits as `next_action` facts and wait for `routing_result`
    pub kernel_dispatch: bool,
    /// Line-change guard applies above this many lines
    pub large_rewrite_min_lines: usize,
    /// Line-change guard applies above this ratio
    pub large_rewrite_max_ratio: f64,
    /// Rejection count at which a pattern is persisted
    pub rejection_threshold: u32,
    /// Acceptance count at which a pattern is persisted
    pub acceptance_threshold: u32,
    /// Learning store shard id
    pub learning_shard: String,
    /// Confidence passed to the tool generator
    pub tool_confidence: f64,
    /// Priority passed to the tool generator
    pub tool_priority: f64,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            safety_mode: true,
            impact_check: true,
            max_retries: 3,
            retry_base_ms: 500,
            poll_interval_ms: 50,
            routing_timeout_ms: None,
            policy_path: None,
            kernel_dispatch: false,
            large_rewrite_min_lines: 30,
            large_rewrite_max_ratio: 0.60,
            rejection_threshold: 2,
            acceptance_threshold: 3,
            learning_shard: "coder".to_string(),
            tool_confidence: 0.8,
            tool_priority: 0.5,
        }
    }
}

impl CoderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` or `ConfigError::Invalid`.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
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
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if !(self.large_rewrite_max_ratio > 0.0 && self.large_rewrite_max_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "large_rewrite_max_ratio must be in (0, 1], got {}",
                self.large_rewrite_max_ratio
            )));
        }
        if self.rejection_threshold == 0 || self.acceptance_threshold == 0 {
            return Err(ConfigError::Invalid("learning thresholds must be at least 1".into()));
        }
        if self.learning_shard.trim().is_empty() {
            return Err(ConfigError::Invalid("learning_shard must not be empty".into()));
        }
        Ok(())
    }

    /// Backoff base as a duration
    #[inline]
    #[must_use]
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    /// Routing poll interval as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Routing timeout; `None` waits until cancelled
    #[inline]
    #[must_use]
    pub fn routing_timeout(&self) -> Option<Duration> {
        self.routing_timeout_ms.map(Duration::from_millis)
    }

    /// Toggle the safety gate and warnings
    #[must_use]
    pub fn with_safety_mode(mut self, enabled: bool) -> Self {
        self.safety_mode = enabled;
        self
    }

    /// Toggle the pre-LLM policy check
    #[must_use]
    pub fn with_impact_check(mut self, enabled: bool) -> Self {
        self.impact_check = enabled;
        self
    }

    /// Set LLM attempts
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set backoff base in milliseconds
    #[must_use]
    pub fn with_retry_base_ms(mut self, ms: u64) -> Self {
        self.retry_base_ms = ms;
        self
    }

    /// Set routing poll interval in milliseconds
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Bound the routing wait
    #[must_use]
    pub fn with_routing_timeout_ms(mut self, ms: u64) -> Self {
        self.routing_timeout_ms = Some(ms);
        self
    }

    /// Policy file loaded once into the kernel
    #[must_use]
    pub fn with_policy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_path = Some(path.into());
        self
    }

    /// Route edits through `next_action` facts
    #[must_use]
    pub fn with_kernel_dispatch(mut self, enabled: bool) -> Self {
        self.kernel_dispatch = enabled;
        self
    }

    /// Set the large-rewrite guard bounds
    #[must_use]
    pub fn with_large_rewrite_guard(mut self, min_lines: usize, max_ratio: f64) -> Self {
        self.large_rewrite_min_lines = min_lines;
        self.large_rewrite_max_ratio = max_ratio;
        self
    }

    /// Set rejection and acceptance thresholds
    #[must_use]
    pub fn with_thresholds(mut self, rejection: u32, acceptance: u32) -> Self {
        self.rejection_threshold = rejection;
        self.acceptance_threshold = acceptance;
        self
    }

    /// Set the learning store shard
    #[must_use]
    pub fn with_learning_shard(mut self, shard: impl Into<String>) -> Self {
        self.learning_shard = shard.into();
        self
    }

    /// Set tool request confidence and priority
    #[must_use]
    pub fn with_tool_scores(mut self, confidence: f64, priority: f64) -> Self {
        self.tool_confidence = confidence;
        self.tool_priority = priority;
        self
    }
}
