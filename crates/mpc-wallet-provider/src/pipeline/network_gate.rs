//! Stage 1: wait out an in-progress network switch

use super::{Middleware, Next};
use crate::network::NetworkGate;
use crate::{RequestContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Holds calls until the wallet is not switching networks
pub struct NetworkGateStage {
    gate: Arc<NetworkGate>,
}

impl NetworkGateStage {
    /// Create the stage
    pub fn new(gate: Arc<NetworkGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Middleware for NetworkGateStage {
    fn name(&self) -> &'static str {
        "network_gate"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        self.gate.wait_until_idle().await?;
        next.run(ctx).await
    }
}
