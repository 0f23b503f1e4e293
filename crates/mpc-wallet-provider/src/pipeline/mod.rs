//! Middleware pipeline
//!
//! An ordered chain of policy checks. Each stage receives the context and a
//! [`Next`] continuation; it can pass the call on, prompt the user first, or
//! fail the call.
//!
//! ## Standard order
//!
//! 1. Network readiness gate
//! 2. Hardware-wallet restriction
//! 3. Network-type compatibility
//! 4. Connection requirement
//! 5. Account switching
//! 6. Spam filter
//! 7. Payload validation
//! 8. Authentication
//!
//! Coordination outcomes (duplicate, queue timeout, replay) always pass
//! through a stage unchanged.

mod account;
mod authentication;
mod connection;
mod hardware;
mod network_gate;
mod network_type;
mod spam_filter;
mod validation;

pub use account::AccountStage;
pub use authentication::AuthenticationStage;
pub use connection::ConnectionStage;
pub use hardware::HardwareStage;
pub use network_gate::NetworkGateStage;
pub use network_type::NetworkTypeStage;
pub use spam_filter::SpamFilterStage;
pub use validation::{ValidationStage, validate_message};

pub(crate) use connection::apply_connection;

use crate::coordinator::ApprovalService;
use crate::dispatch::ResponseCache;
use crate::network::NetworkGate;
use crate::popup::{PopupOutcome, PopupRoute};
use crate::session::{ConnectionStore, WalletSession};
use crate::spam::SpamTracker;
use crate::{ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// One policy check
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stage name, for logs
    fn name(&self) -> &'static str;

    /// Check the call and usually forward it with `next.run(ctx)`
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value>;
}

/// What runs after the last stage
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Execute the call
    async fn call(&self, ctx: &RequestContext) -> Result<Value>;
}

/// Continuation over the remaining stages
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Run the remaining stages, then the endpoint
    pub async fn run(self, ctx: &RequestContext) -> Result<Value> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    endpoint: self.endpoint,
                };
                stage.handle(ctx, next).await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}

/// Collaborators the standard stages need
#[derive(Clone)]
pub struct StageServices {
    /// Wallet session
    pub session: Arc<dyn WalletSession>,
    /// Origin connections
    pub connections: Arc<dyn ConnectionStore>,
    /// Popup coordination
    pub approvals: ApprovalService,
    /// Network readiness
    pub gate: Arc<NetworkGate>,
    /// Spam tracking
    pub spam: Arc<SpamTracker>,
    /// Response cache, cleared of network reads on approved switches
    pub cache: Arc<ResponseCache>,
}

/// Ordered list of stages
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// The eight standard stages in their fixed order
    pub fn standard(services: &StageServices) -> Self {
        Self::new()
            .with_stage(NetworkGateStage::new(services.gate.clone()))
            .with_stage(HardwareStage::new(services.session.clone()))
            .with_stage(NetworkTypeStage::new(
                services.session.clone(),
                services.approvals.clone(),
                services.cache.clone(),
            ))
            .with_stage(ConnectionStage::new(
                services.session.clone(),
                services.connections.clone(),
                services.approvals.clone(),
            ))
            .with_stage(AccountStage::new(
                services.session.clone(),
                services.connections.clone(),
                services.approvals.clone(),
                services.cache.clone(),
            ))
            .with_stage(SpamFilterStage::new(
                services.spam.clone(),
                services.approvals.clone(),
            ))
            .with_stage(ValidationStage)
            .with_stage(AuthenticationStage::new(
                services.session.clone(),
                services.approvals.clone(),
            ))
    }

    /// Append a stage
    pub fn with_stage(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Stage names in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if there are no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run a call through every stage and then the endpoint
    pub async fn run(&self, ctx: &RequestContext, endpoint: &dyn Endpoint) -> Result<Value> {
        Next {
            stages: &self.stages,
            endpoint,
        }
        .run(ctx)
        .await
    }
}

/// Show a stage popup and map its outcome.
///
/// Approval yields the popup's result data. Rejection or a broken popup
/// fails with `denied`; dismissal does too, unless the method needs an
/// explicit accept, in which case it is a user rejection.
pub(crate) async fn prompt(
    approvals: &ApprovalService,
    ctx: &RequestContext,
    route: PopupRoute,
    event_name: &str,
    data: Value,
    denied: fn() -> ProviderError,
) -> Result<Value> {
    match approvals.request(ctx, route, event_name, data).await {
        Ok(PopupOutcome::Approved(value)) => Ok(value),
        Ok(PopupOutcome::Rejected { .. }) => Err(denied()),
        Ok(PopupOutcome::Dismissed) => Err(dismissed(ctx, denied)),
        Err(e) if e.is_coordination() => Err(e),
        Err(e) => {
            warn!(
                route = %route,
                origin = %ctx.origin(),
                method = %ctx.method(),
                error = %e,
                "Approval popup failed"
            );
            Err(denied())
        }
    }
}

/// Error for a popup the user closed without deciding
pub(crate) fn dismissed(ctx: &RequestContext, otherwise: fn() -> ProviderError) -> ProviderError {
    if ctx.config().requires_explicit_accept {
        ProviderError::UserRejected("the approval window was closed".into())
    } else {
        otherwise()
    }
}
