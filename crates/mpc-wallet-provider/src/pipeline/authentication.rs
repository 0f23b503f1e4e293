//! Stage 8: unlock the wallet for methods without their own popup

use super::{Middleware, Next, prompt};
use crate::coordinator::ApprovalService;
use crate::popup::{PopupRoute, events};
use crate::session::WalletSession;
use crate::{ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Shows the login popup when a locked wallet receives an authenticated
/// call. Methods with their own popup log in there instead.
pub struct AuthenticationStage {
    session: Arc<dyn WalletSession>,
    approvals: ApprovalService,
}

impl AuthenticationStage {
    /// Create the stage
    pub fn new(session: Arc<dyn WalletSession>, approvals: ApprovalService) -> Self {
        Self { session, approvals }
    }
}

#[async_trait]
impl Middleware for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        let config = ctx.config();
        if !config.requires_authentication
            || config.has_approval_popup()
            || !self.session.is_locked()
        {
            return next.run(ctx).await;
        }

        prompt(
            &self.approvals,
            ctx,
            PopupRoute::Login,
            events::LOGIN,
            json!({ "method": ctx.method() }),
            || ProviderError::AuthenticationCancelled,
        )
        .await?;
        self.session.apply_unlock()?;
        next.run(ctx).await
    }
}
