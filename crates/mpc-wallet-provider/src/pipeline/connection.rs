//! Stage 4: connect the origin when the method needs it

use super::{Middleware, Next, prompt};
use crate::coordinator::ApprovalService;
use crate::popup::{PopupRoute, events};
use crate::session::{ConnectionStore, WalletSession};
use crate::{Account, ConnectionRecord, ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

/// Prompts for a connection when an unconnected origin calls a
/// connection-gated method
pub struct ConnectionStage {
    session: Arc<dyn WalletSession>,
    connections: Arc<dyn ConnectionStore>,
    approvals: ApprovalService,
}

impl ConnectionStage {
    /// Create the stage
    pub fn new(
        session: Arc<dyn WalletSession>,
        connections: Arc<dyn ConnectionStore>,
        approvals: ApprovalService,
    ) -> Self {
        Self {
            session,
            connections,
            approvals,
        }
    }
}

/// Account chosen in a connect popup, falling back to the active account
pub(crate) fn approved_account(
    approval: &Value,
    session: &dyn WalletSession,
) -> Option<Account> {
    approval
        .get("account")
        .and_then(|a| serde_json::from_value::<Account>(a.clone()).ok())
        .or_else(|| session.active_account())
}

/// Record a user-approved connection. The connect popup includes login.
pub(crate) fn apply_connection(
    approval: &Value,
    origin: &str,
    session: &dyn WalletSession,
    connections: &dyn ConnectionStore,
) -> Result<ConnectionRecord> {
    let account = approved_account(approval, session).ok_or(ProviderError::NotConnected)?;
    if session.is_locked() {
        session.apply_unlock()?;
    }
    let record = ConnectionRecord::new(origin, &account);
    connections.connect(record.clone())?;
    info!(origin = %origin, account = %account.id, "Origin connected");
    Ok(record)
}

#[async_trait]
impl Middleware for ConnectionStage {
    fn name(&self) -> &'static str {
        "connection"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        if !ctx.config().requires_connection || self.connections.is_connected(ctx.origin()) {
            return next.run(ctx).await;
        }

        let data = json!({
            "method": ctx.method(),
            "origin": ctx.origin(),
        });
        let approval = prompt(
            &self.approvals,
            ctx,
            PopupRoute::Connect,
            events::CONNECT,
            data,
            || ProviderError::NotConnected,
        )
        .await?;

        apply_connection(
            &approval,
            ctx.origin(),
            self.session.as_ref(),
            self.connections.as_ref(),
        )?;
        next.run(ctx).await
    }
}
