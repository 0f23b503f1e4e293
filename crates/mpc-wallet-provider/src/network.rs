//! Network readiness gate
//!
//! Calls and queue drains wait here while the wallet is switching networks.

use crate::session::WalletSession;
use crate::{ProviderConfig, ProviderError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Waits until no network switch is in progress
pub struct NetworkGate {
    session: Arc<dyn WalletSession>,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
}

impl NetworkGate {
    /// Create a gate polling at the configured interval
    pub fn new(session: Arc<dyn WalletSession>, config: &ProviderConfig) -> Self {
        Self {
            session,
            poll_interval: config.network_poll_interval(),
            idle_timeout: config.network_idle_timeout(),
        }
    }

    /// Check if the network is idle right now
    pub fn is_idle(&self) -> bool {
        !self.session.is_switching_network()
    }

    /// Wait for the network to become idle.
    ///
    /// Unbounded unless `network_idle_timeout_ms` is configured.
    pub async fn wait_until_idle(&self) -> Result<()> {
        if self.is_idle() {
            return Ok(());
        }
        debug!(poll_ms = self.poll_interval.as_millis() as u64, "Waiting for network switch to finish");

        let wait = async {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.is_idle() {
                    break;
                }
            }
        };

        match self.idle_timeout {
            None => {
                wait.await;
                Ok(())
            }
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                ProviderError::RequestTimeout("network switch did not finish".into())
            }),
        }
    }
}
