//! Stage 5: blocking operations run on the account the origin connected

use super::{Middleware, Next, prompt};
use crate::coordinator::ApprovalService;
use crate::dispatch::ResponseCache;
use crate::popup::{PopupRoute, events};
use crate::session::{ConnectionStore, WalletSession};
use crate::{ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Prompts for an account switch when the active account is not the
/// origin's connected account
pub struct AccountStage {
    session: Arc<dyn WalletSession>,
    connections: Arc<dyn ConnectionStore>,
    approvals: ApprovalService,
    cache: Arc<ResponseCache>,
}

impl AccountStage {
    /// Create the stage
    pub fn new(
        session: Arc<dyn WalletSession>,
        connections: Arc<dyn ConnectionStore>,
        approvals: ApprovalService,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            session,
            connections,
            approvals,
            cache,
        }
    }
}

#[async_trait]
impl Middleware for AccountStage {
    fn name(&self) -> &'static str {
        "account"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        let config = ctx.config();
        if !(config.is_blocking_operation && config.requires_connection) {
            return next.run(ctx).await;
        }

        let record = self
            .connections
            .get(ctx.origin())
            .ok_or(ProviderError::NotConnected)?;
        let active = self.session.active_account();
        if active.as_ref().map(|a| a.id.as_str()) == Some(record.connected_account_id.as_str()) {
            return next.run(ctx).await;
        }

        info!(
            origin = %ctx.origin(),
            method = %ctx.method(),
            connected = %record.connected_account_id,
            "Active account differs from connected account"
        );
        let target = record.account();
        let data = json!({
            "method": ctx.method(),
            "from": active.map(|a| a.id),
            "to": target.id,
        });
        prompt(
            &self.approvals,
            ctx,
            PopupRoute::SwitchAccount,
            events::SWITCH_ACCOUNT,
            data,
            || ProviderError::Unauthorized("account switch declined".into()),
        )
        .await?;

        // The switched-to signer may not support this method
        if target.is_hardware() && !config.allowed_for_hardware_wallet {
            return Err(ProviderError::HardwareRestricted(ctx.method().to_string()));
        }
        self.session.apply_account(target)?;
        let dropped = self.cache.invalidate_network_reads();
        debug!(dropped, "Account switched; cached reads dropped");
        next.run(ctx).await
    }
}
