//! Stage 3: make sure the method's chain family is active

use super::{Middleware, Next, prompt};
use crate::coordinator::ApprovalService;
use crate::dispatch::ResponseCache;
use crate::popup::{PopupRoute, events};
use crate::session::WalletSession;
use crate::{ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Prompts for a network switch when the wrong chain family is active
pub struct NetworkTypeStage {
    session: Arc<dyn WalletSession>,
    approvals: ApprovalService,
    cache: Arc<ResponseCache>,
}

impl NetworkTypeStage {
    /// Create the stage
    pub fn new(
        session: Arc<dyn WalletSession>,
        approvals: ApprovalService,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            session,
            approvals,
            cache,
        }
    }
}

#[async_trait]
impl Middleware for NetworkTypeStage {
    fn name(&self) -> &'static str {
        "network_type"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        let Some(required) = ctx.config().network.required_chain() else {
            return next.run(ctx).await;
        };
        let active = self.session.active_chain();
        if active == required {
            return next.run(ctx).await;
        }

        info!(
            origin = %ctx.origin(),
            method = %ctx.method(),
            from = %active,
            to = %required,
            "Method needs a different network type"
        );
        let data = json!({
            "method": ctx.method(),
            "from": active.as_str(),
            "to": required.as_str(),
        });
        let approval = prompt(
            &self.approvals,
            ctx,
            PopupRoute::SwitchNetwork,
            events::SWITCH_NETWORK,
            data,
            || ProviderError::WrongNetwork,
        )
        .await?;

        let chain_id = approval
            .get("chainId")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.session.apply_chain(required, chain_id)?;
        let dropped = self.cache.invalidate_network_reads();
        debug!(dropped, chain = %required, "Network switched; cached reads dropped");
        next.run(ctx).await
    }
}
