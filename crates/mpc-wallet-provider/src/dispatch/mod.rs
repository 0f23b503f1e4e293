//! Method dispatch
//!
//! Runs a call once every policy stage has passed. The dispatcher asks each
//! namespace handler in turn whether it can take the call; the first taker
//! runs it. Cacheable reads are answered from the response cache while
//! fresh.
//!
//! Handlers never open popups directly: method popups go through
//! [`ApprovalService`] like every other prompt.

pub mod cache;
mod evm;
mod internal;
mod solana;
mod wallet;

pub use cache::{CacheEntry, CacheStats, ResponseCache};
pub use evm::EvmHandler;
pub use internal::InternalHandler;
pub use solana::SolanaHandler;
pub use wallet::WalletHandler;

use crate::backend::{BackendCall, ChainBackend};
use crate::coordinator::ApprovalService;
use crate::pipeline::{Endpoint, dismissed};
use crate::popup::PopupOutcome;
use crate::registry::Namespace;
use crate::session::{ConnectionStore, WalletSession};
use crate::{Account, ChainType, ConnectionRecord, ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Executes calls for one namespace
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handler name, for logs
    fn name(&self) -> &'static str;

    /// Check if this handler takes the call
    fn can_handle(&self, ctx: &RequestContext) -> bool;

    /// Execute the call
    async fn handle(&self, ctx: &RequestContext) -> Result<Value>;
}

/// Collaborators shared by the handlers
#[derive(Clone)]
pub struct HandlerServices {
    /// Wallet session
    pub session: Arc<dyn WalletSession>,
    /// Origin connections
    pub connections: Arc<dyn ConnectionStore>,
    /// Popup coordination
    pub approvals: ApprovalService,
    /// Response cache
    pub cache: Arc<ResponseCache>,
    /// Backends by chain family
    pub backends: HashMap<ChainType, Arc<dyn ChainBackend>>,
}

impl HandlerServices {
    /// Backend for a chain family
    pub fn backend(&self, chain: ChainType) -> Result<&Arc<dyn ChainBackend>> {
        self.backends
            .get(&chain)
            .ok_or_else(|| ProviderError::Internal(format!("no {} backend configured", chain)))
    }

    /// The origin's connected account
    pub fn connected_account(&self, ctx: &RequestContext) -> Result<Account> {
        self.connections
            .get(ctx.origin())
            .map(|r| r.account())
            .ok_or(ProviderError::NotConnected)
    }

    /// Show the method's own approval popup and return its result data.
    ///
    /// The popup includes login, so an approved call unlocks the wallet.
    pub async fn approve(&self, ctx: &RequestContext) -> Result<Value> {
        let config = ctx.config();
        let popup = config.popup.ok_or_else(|| {
            ProviderError::Internal(format!("{} has no approval popup", config.name))
        })?;

        let data = json!({
            "method": ctx.method(),
            "params": ctx.params(),
            "origin": ctx.origin(),
            "account": self.connections.get(ctx.origin()).map(|r| r.connected_account_id),
        });
        let outcome = self
            .approvals
            .request(ctx, popup.route, popup.event_name, data)
            .await?;

        match outcome {
            PopupOutcome::Approved(value) => {
                if self.session.is_locked() {
                    self.session.apply_unlock()?;
                }
                info!(origin = %ctx.origin(), method = %ctx.method(), "User approved request");
                Ok(value)
            }
            PopupOutcome::Rejected { reason } => {
                info!(origin = %ctx.origin(), method = %ctx.method(), "User rejected request");
                Err(ProviderError::UserRejected(
                    reason.unwrap_or_else(|| "the user declined".into()),
                ))
            }
            PopupOutcome::Dismissed => Err(dismissed(ctx, || {
                ProviderError::UserRejected("the approval window was closed".into())
            })),
        }
    }

    /// Connect the origin through the method's popup, unless it already is
    pub async fn connect_origin(&self, ctx: &RequestContext) -> Result<ConnectionRecord> {
        if let Some(record) = self.connections.get(ctx.origin()) {
            debug!(origin = %ctx.origin(), "Origin already connected");
            return Ok(record);
        }
        let approval = self.approve(ctx).await?;
        crate::pipeline::apply_connection(
            &approval,
            ctx.origin(),
            self.session.as_ref(),
            self.connections.as_ref(),
        )
    }

    /// Forward the call to a chain backend
    pub async fn forward(
        &self,
        chain: ChainType,
        ctx: &RequestContext,
        account: Option<Account>,
        approval: Option<Value>,
    ) -> Result<Value> {
        let mut call = BackendCall::new(chain, ctx.method(), ctx.params().to_vec(), ctx.origin())
            .with_account(account);
        if let Some(approval) = approval {
            call = call.with_approval(approval);
        }
        self.backend(chain)?.call(call).await
    }

    /// Approve, then forward on behalf of the connected account
    pub async fn approve_and_forward(&self, chain: ChainType, ctx: &RequestContext) -> Result<Value> {
        let approval = self.approve(ctx).await?;
        let account = self.connected_account(ctx)?;
        self.forward(chain, ctx, Some(account), Some(approval)).await
    }

    /// Drop cached reads that depend on the active network
    pub fn invalidate_network_reads(&self) {
        let dropped = self.cache.invalidate_network_reads();
        debug!(dropped, "Network-dependent cache entries dropped");
    }
}

/// Check if a call belongs to a namespace
pub(crate) fn in_namespace(ctx: &RequestContext, namespace: Namespace) -> bool {
    ctx.config().namespace == namespace
}

/// Picks a handler and applies read caching
pub struct MethodDispatcher {
    handlers: Vec<Arc<dyn MethodHandler>>,
    cache: Arc<ResponseCache>,
    cache_enabled: bool,
}

impl MethodDispatcher {
    /// Create a dispatcher with no handlers
    pub fn new(cache: Arc<ResponseCache>, cache_enabled: bool) -> Self {
        Self {
            handlers: Vec::new(),
            cache,
            cache_enabled,
        }
    }

    /// The four standard handlers: internal, wallet, EVM, Solana
    pub fn standard(services: HandlerServices, cache_enabled: bool) -> Self {
        let cache = services.cache.clone();
        Self::new(cache, cache_enabled)
            .with_handler(InternalHandler::new(services.clone()))
            .with_handler(WalletHandler::new(services.clone()))
            .with_handler(EvmHandler::new(services.clone()))
            .with_handler(SolanaHandler::new(services))
    }

    /// Append a handler
    pub fn with_handler(mut self, handler: impl MethodHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Handler names in order
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// The response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Run a call on the first handler that takes it
    pub async fn dispatch(&self, ctx: &RequestContext) -> Result<Value> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.can_handle(ctx))
            .ok_or_else(|| ProviderError::MethodNotFound(ctx.method().to_string()))?;

        let policy = match ctx.config().cache {
            Some(policy) if self.cache_enabled => policy,
            _ => return handler.handle(ctx).await,
        };

        let key = ResponseCache::key_for(policy.key, ctx.origin(), ctx.params());
        if let Some(value) = self.cache.get(&key) {
            debug!(method = %ctx.method(), handler = handler.name(), "Cache hit");
            return Ok(value);
        }

        let value = handler.handle(ctx).await?;
        self.cache
            .put(key, value.clone(), Duration::from_millis(policy.ttl_ms));
        Ok(value)
    }
}

#[async_trait]
impl Endpoint for MethodDispatcher {
    async fn call(&self, ctx: &RequestContext) -> Result<Value> {
        self.dispatch(ctx).await
    }
}
