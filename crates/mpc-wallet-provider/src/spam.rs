//! Per-origin spam tracking
//!
//! Counts popup-worthy calls per origin in a sliding window. Crossing the
//! threshold asks the user whether to block the origin; a blocked origin is
//! refused without any popup until the block expires.

use crate::SpamConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What the spam filter decided for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    /// Continue normally
    Allow,
    /// Threshold crossed: show the spam warning
    Warn,
    /// Origin is blocked
    Blocked,
}

/// Spam state for one origin
#[derive(Debug, Clone, Default)]
pub struct SpamRecord {
    /// Recent popup-worthy call times, oldest first
    pub recent: VecDeque<Instant>,
    /// Block expiry
    pub blocked_until: Option<Instant>,
    /// Last time a warning was shown
    pub warned_at: Option<Instant>,
}

impl SpamRecord {
    fn prune(&mut self, now: Instant, window: std::time::Duration) {
        while self
            .recent
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            self.recent.pop_front();
        }
    }

    fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}

/// Tracks popup-worthy calls per origin
pub struct SpamTracker {
    config: SpamConfig,
    records: DashMap<String, SpamRecord>,
}

impl SpamTracker {
    /// Create a tracker
    pub fn new(config: SpamConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    /// Check if filtering is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Record a popup-worthy call and decide what to do with it
    pub fn record(&self, origin: &str) -> SpamVerdict {
        self.judge(origin, true)
    }

    /// Decide for a call that was already recorded (a replay)
    pub fn evaluate(&self, origin: &str) -> SpamVerdict {
        self.judge(origin, false)
    }

    fn judge(&self, origin: &str, count: bool) -> SpamVerdict {
        if !self.config.enabled {
            return SpamVerdict::Allow;
        }

        let now = Instant::now();
        let mut record = self.records.entry(origin.to_string()).or_default();

        if record.is_blocked(now) {
            return SpamVerdict::Blocked;
        }
        record.blocked_until = None;

        record.prune(now, self.config.window());
        if count {
            record.recent.push_back(now);
        }

        if record.recent.len() < self.config.threshold {
            return SpamVerdict::Allow;
        }

        let in_grace = record
            .warned_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.warning_grace());
        if in_grace {
            debug!(origin = %origin, "Spam warning suppressed during grace period");
            return SpamVerdict::Allow;
        }

        record.warned_at = Some(now);
        warn!(
            origin = %origin,
            recent = record.recent.len(),
            window_ms = self.config.window_ms,
            "Origin crossed the spam threshold"
        );
        SpamVerdict::Warn
    }

    /// Forget that a warning was shown, so the next check warns again
    pub fn clear_warning(&self, origin: &str) {
        if let Some(mut record) = self.records.get_mut(origin) {
            record.warned_at = None;
        }
    }

    /// Block an origin for the configured duration
    pub fn block(&self, origin: &str) {
        let now = Instant::now();
        let mut record = self.records.entry(origin.to_string()).or_default();
        record.blocked_until = Some(now + self.config.block_duration());
        record.recent.clear();
        warn!(
            origin = %origin,
            block_ms = self.config.block_duration_ms,
            "Origin blocked"
        );
    }

    /// Lift a block early
    pub fn unblock(&self, origin: &str) {
        if let Some(mut record) = self.records.get_mut(origin) {
            record.blocked_until = None;
        }
    }

    /// Check if an origin is blocked right now
    pub fn is_blocked(&self, origin: &str) -> bool {
        self.records
            .get(origin)
            .is_some_and(|r| r.is_blocked(Instant::now()))
    }

    /// Number of popup-worthy calls inside the current window
    pub fn recent_count(&self, origin: &str) -> usize {
        let now = Instant::now();
        let window = self.config.window();
        self.records.get(origin).map_or(0, |r| {
            r.recent
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < window)
                .count()
        })
    }

    /// Forget everything about an origin
    pub fn reset(&self, origin: &str) {
        self.records.remove(origin);
    }

    /// Snapshot of an origin's record
    pub fn record_for(&self, origin: &str) -> Option<SpamRecord> {
        self.records.get(origin).map(|r| r.clone())
    }
}
