//! The dApp provider
//!
//! Entry point for the caller's transport channel. Every call goes through
//! context building, the policy pipeline and the dispatcher, and always
//! comes back as a response envelope: errors and panics included.

use crate::backend::ChainBackend;
use crate::coordinator::{ApprovalCoordinator, ApprovalService};
use crate::dispatch::{HandlerServices, MethodDispatcher, ResponseCache};
use crate::network::NetworkGate;
use crate::pipeline::{Pipeline, StageServices};
use crate::popup::{PopupBroker, PopupHost, PopupOutcome};
use crate::session::{ConnectionStore, MemoryConnectionStore, WalletSession};
use crate::spam::SpamTracker;
use crate::{
    ChainType, ErrorCategory, ProviderConfig, ProviderError, RequestContext, Result, RpcRequest,
    RpcResponse, registry,
};
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Authorizes, coordinates and dispatches dApp calls
pub struct WalletProvider {
    config: ProviderConfig,
    session: Arc<dyn WalletSession>,
    connections: Arc<dyn ConnectionStore>,
    broker: Arc<PopupBroker>,
    coordinator: Arc<ApprovalCoordinator>,
    spam: Arc<SpamTracker>,
    cache: Arc<ResponseCache>,
    pipeline: Pipeline,
    dispatcher: MethodDispatcher,
}

/// Builder for [`WalletProvider`]
#[derive(Default)]
pub struct WalletProviderBuilder {
    config: ProviderConfig,
    session: Option<Arc<dyn WalletSession>>,
    connections: Option<Arc<dyn ConnectionStore>>,
    popup_host: Option<Arc<dyn PopupHost>>,
    backends: HashMap<ChainType, Arc<dyn ChainBackend>>,
}

impl WalletProviderBuilder {
    /// Set the configuration
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the wallet session
    pub fn session(mut self, session: Arc<dyn WalletSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the connection store (defaults to an in-memory store)
    pub fn connections(mut self, connections: Arc<dyn ConnectionStore>) -> Self {
        self.connections = Some(connections);
        self
    }

    /// Set the popup UI collaborator
    pub fn popup_host(mut self, host: Arc<dyn PopupHost>) -> Self {
        self.popup_host = Some(host);
        self
    }

    /// Add a chain backend, replacing any for the same chain family
    pub fn backend(mut self, backend: Arc<dyn ChainBackend>) -> Self {
        self.backends.insert(backend.chain(), backend);
        self
    }

    /// Wire everything together
    pub fn build(self) -> Result<WalletProvider> {
        self.config.validate()?;
        registry::validate()?;

        let session = self
            .session
            .ok_or_else(|| ProviderError::InvalidConfig("a wallet session is required".into()))?;
        let popup_host = self
            .popup_host
            .ok_or_else(|| ProviderError::InvalidConfig("a popup host is required".into()))?;
        let connections = self
            .connections
            .unwrap_or_else(|| Arc::new(MemoryConnectionStore::new()));

        let gate = Arc::new(NetworkGate::new(session.clone(), &self.config));
        let coordinator = ApprovalCoordinator::new(gate.clone(), self.config.queue_timeout());
        let broker = Arc::new(PopupBroker::new(popup_host));
        let approvals = ApprovalService::new(coordinator.clone(), broker.clone());
        let spam = Arc::new(SpamTracker::new(self.config.spam.clone()));
        let cache = Arc::new(ResponseCache::new());

        let pipeline = Pipeline::standard(&StageServices {
            session: session.clone(),
            connections: connections.clone(),
            approvals: approvals.clone(),
            gate,
            spam: spam.clone(),
            cache: cache.clone(),
        });
        let dispatcher = MethodDispatcher::standard(
            HandlerServices {
                session: session.clone(),
                connections: connections.clone(),
                approvals,
                cache: cache.clone(),
                backends: self.backends,
            },
            self.config.cache_enabled,
        );

        info!(
            stages = pipeline.len(),
            methods = registry::all().len(),
            queue_timeout_ms = self.config.queue_timeout_ms,
            "Wallet provider ready"
        );

        Ok(WalletProvider {
            config: self.config,
            session,
            connections,
            broker,
            coordinator,
            spam,
            cache,
            pipeline,
            dispatcher,
        })
    }
}

impl WalletProvider {
    /// Start building a provider
    pub fn builder() -> WalletProviderBuilder {
        WalletProviderBuilder::default()
    }

    /// Handle one call. Always resolves with an envelope.
    pub async fn request(&self, request: RpcRequest) -> RpcResponse {
        let span = info_span!(
            "rpc",
            id = %request.id,
            origin = %request.origin,
            method = %request.method
        );
        let id = request.id.clone();

        let outcome = AssertUnwindSafe(self.execute(request))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match outcome {
            Ok(Ok(value)) => {
                debug!("Request completed");
                RpcResponse::success(id, value)
            }
            Ok(Err(err)) => {
                log_failure(&err);
                RpcResponse::failure(id, &err)
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "Request handler panicked");
                RpcResponse::failure(
                    id,
                    &ProviderError::Internal("request handler panicked".into()),
                )
            }
        }
    }

    /// Handle a raw JSON envelope. Malformed envelopes get an error response.
    pub async fn request_value(&self, raw: Value) -> RpcResponse {
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<RpcRequest>(raw) {
            Ok(request) => self.request(request).await,
            Err(e) => {
                let err = ProviderError::from(e);
                warn!(error = %err, "Malformed request envelope");
                RpcResponse::failure(id, &err)
            }
        }
    }

    /// Run a call to completion, re-running it from scratch whenever the
    /// approval queue hands it a turn
    pub async fn execute(&self, request: RpcRequest) -> Result<Value> {
        let mut ctx = RequestContext::build(request)?;
        loop {
            match self.pipeline.run(&ctx, &self.dispatcher).await {
                Err(ProviderError::Replay { queued_at }) => {
                    ctx = ctx.replay_after(queued_at)?;
                    debug!(attempt = ctx.attempt(), "Re-running queued request");
                }
                outcome => {
                    // A replay that needed no popup must still pass the turn on
                    if ctx.is_replay() {
                        self.coordinator.schedule_drain();
                    }
                    return outcome;
                }
            }
        }
    }

    /// Deliver the user's decision for an open popup
    pub fn resolve_popup(&self, event_name: &str, origin: &str, outcome: PopupOutcome) -> Result<()> {
        self.broker.resolve(event_name, origin, outcome)
    }

    /// Report that a popup window was closed
    pub fn popup_closed(&self, event_name: &str, origin: &str) -> Result<()> {
        self.broker.close(event_name, origin)
    }

    /// Configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Wallet session
    pub fn session(&self) -> &Arc<dyn WalletSession> {
        &self.session
    }

    /// Connection store
    pub fn connections(&self) -> &Arc<dyn ConnectionStore> {
        &self.connections
    }

    /// Approval coordinator
    pub fn coordinator(&self) -> &Arc<ApprovalCoordinator> {
        &self.coordinator
    }

    /// Popup broker
    pub fn broker(&self) -> &Arc<PopupBroker> {
        &self.broker
    }

    /// Spam tracker
    pub fn spam(&self) -> &Arc<SpamTracker> {
        &self.spam
    }

    /// Response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Policy pipeline
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Method dispatcher
    pub fn dispatcher(&self) -> &MethodDispatcher {
        &self.dispatcher
    }
}

fn log_failure(err: &ProviderError) {
    match err.category() {
        ErrorCategory::Policy | ErrorCategory::Validation => {
            warn!(code = err.code(), error = %err, "Request denied")
        }
        ErrorCategory::UserRejection | ErrorCategory::Coordination => {
            info!(code = err.code(), error = %err, "Request not completed")
        }
        ErrorCategory::Internal => {
            let report = err.report();
            error!(
                code = err.code(),
                name = %report.name,
                error = %report.message,
                stack = %report.stack,
                "Request failed"
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
