//! Stage 6: spam protection for popup-worthy methods

use super::{Middleware, Next};
use crate::coordinator::ApprovalService;
use crate::popup::{PopupOutcome, PopupRoute, events};
use crate::spam::{SpamTracker, SpamVerdict};
use crate::{ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Counts popup-worthy calls per origin and offers to block spammers
pub struct SpamFilterStage {
    spam: Arc<SpamTracker>,
    approvals: ApprovalService,
}

impl SpamFilterStage {
    /// Create the stage
    pub fn new(spam: Arc<SpamTracker>, approvals: ApprovalService) -> Self {
        Self { spam, approvals }
    }

    /// Show the warning; `true` if the user chose to block the origin
    async fn warn_user(&self, ctx: &RequestContext) -> Result<bool> {
        let data = json!({
            "origin": ctx.origin(),
            "method": ctx.method(),
            "recentRequests": self.spam.recent_count(ctx.origin()),
        });
        let outcome = self
            .approvals
            .request(ctx, PopupRoute::SpamWarning, events::SPAM_WARNING, data)
            .await;

        match outcome {
            Ok(PopupOutcome::Approved(choice)) => {
                Ok(choice.get("block").and_then(Value::as_bool).unwrap_or(true))
            }
            Ok(PopupOutcome::Rejected { .. } | PopupOutcome::Dismissed) => Ok(false),
            Err(e) if e.is_coordination() => Err(e),
            Err(e) => {
                warn!(origin = %ctx.origin(), error = %e, "Spam warning could not be shown");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Middleware for SpamFilterStage {
    fn name(&self) -> &'static str {
        "spam_filter"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        if !ctx.config().has_approval_popup() {
            return next.run(ctx).await;
        }

        // Replays were already counted on their first attempt
        let verdict = if ctx.is_replay() {
            self.spam.evaluate(ctx.origin())
        } else {
            self.spam.record(ctx.origin())
        };

        match verdict {
            SpamVerdict::Allow => next.run(ctx).await,
            SpamVerdict::Blocked => {
                warn!(origin = %ctx.origin(), method = %ctx.method(), "Blocked origin refused");
                Err(ProviderError::OriginBlocked)
            }
            SpamVerdict::Warn => {
                let block = match self.warn_user(ctx).await {
                    Ok(block) => block,
                    Err(e) => {
                        // Not shown yet; warn again when this call is replayed
                        self.spam.clear_warning(ctx.origin());
                        return Err(e);
                    }
                };
                if block {
                    self.spam.block(ctx.origin());
                    return Err(ProviderError::OriginBlocked);
                }
                info!(origin = %ctx.origin(), "User allowed origin after spam warning");
                next.run(ctx).await
            }
        }
    }
}
