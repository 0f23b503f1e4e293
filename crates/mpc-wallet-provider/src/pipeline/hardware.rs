//! Stage 2: refuse methods the active hardware signer cannot perform

use super::{Middleware, Next};
use crate::session::WalletSession;
use crate::{ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Fails hardware-restricted methods without showing any popup
pub struct HardwareStage {
    session: Arc<dyn WalletSession>,
}

impl HardwareStage {
    /// Create the stage
    pub fn new(session: Arc<dyn WalletSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Middleware for HardwareStage {
    fn name(&self) -> &'static str {
        "hardware"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        if !ctx.config().allowed_for_hardware_wallet && self.session.is_hardware_signer() {
            warn!(
                origin = %ctx.origin(),
                method = %ctx.method(),
                "Method not supported by hardware signer"
            );
            return Err(ProviderError::HardwareRestricted(ctx.method().to_string()));
        }
        next.run(ctx).await
    }
}
