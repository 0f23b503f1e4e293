//! Provider configuration
//!
//! Timing knobs for the approval queue, network gate and spam filter. All
//! durations are stored in milliseconds so the config round-trips cleanly
//! through JSON.

use crate::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spam filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    /// Whether the spam filter is active
    pub enabled: bool,
    /// Popup-worthy requests within the window that trigger a warning
    pub threshold: usize,
    /// Tracking window
    pub window_ms: u64,
    /// Suppress repeat warnings for this long after one is shown
    pub warning_grace_ms: u64,
    /// How long an origin stays blocked once the user blocks it
    pub block_duration_ms: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 3,
            window_ms: 10_000,
            warning_grace_ms: 30_000,
            block_duration_ms: 300_000,
        }
    }
}

impl SpamConfig {
    /// Disable spam filtering
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Tracking window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Warning grace period as a duration
    pub fn warning_grace(&self) -> Duration {
        Duration::from_millis(self.warning_grace_ms)
    }

    /// Block duration as a duration
    pub fn block_duration(&self) -> Duration {
        Duration::from_millis(self.block_duration_ms)
    }
}

/// Complete provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// How long a request may wait in the approval queue
    pub queue_timeout_ms: u64,
    /// Poll interval while waiting for a network switch to finish
    pub network_poll_interval_ms: u64,
    /// Upper bound on the network-idle wait (`None` waits indefinitely)
    pub network_idle_timeout_ms: Option<u64>,
    /// Spam filter settings
    pub spam: SpamConfig,
    /// Whether cacheable reads are served from the response cache
    pub cache_enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            queue_timeout_ms: 30_000,
            network_poll_interval_ms: 100,
            network_idle_timeout_ms: None,
            spam: SpamConfig::default(),
            cache_enabled: true,
        }
    }
}

impl ProviderConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ProviderConfig = serde_json::from_str(json)
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the approval queue timeout
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the network poll interval
    pub fn with_network_poll_interval(mut self, interval: Duration) -> Self {
        self.network_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Bound the network-idle wait
    pub fn with_network_idle_timeout(mut self, timeout: Duration) -> Self {
        self.network_idle_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set spam filter settings
    pub fn with_spam(mut self, spam: SpamConfig) -> Self {
        self.spam = spam;
        self
    }

    /// Disable the response cache
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Queue timeout as a duration
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Network poll interval as a duration
    pub fn network_poll_interval(&self) -> Duration {
        Duration::from_millis(self.network_poll_interval_ms)
    }

    /// Network idle bound as a duration
    pub fn network_idle_timeout(&self) -> Option<Duration> {
        self.network_idle_timeout_ms.map(Duration::from_millis)
    }

    /// Check the config for values that would stall or disable safeguards
    pub fn validate(&self) -> Result<()> {
        if self.queue_timeout_ms == 0 {
            return Err(ProviderError::InvalidConfig(
                "queue_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.network_poll_interval_ms == 0 {
            return Err(ProviderError::InvalidConfig(
                "network_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.spam.enabled {
            if self.spam.threshold == 0 {
                return Err(ProviderError::InvalidConfig(
                    "spam.threshold must be at least 1".into(),
                ));
            }
            if self.spam.window_ms == 0 {
                return Err(ProviderError::InvalidConfig(
                    "spam.window_ms must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}
