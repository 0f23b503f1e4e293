//! Approval popups
//!
//! The UI collaborator renders approval popups; this module only opens them
//! and waits for the user's decision.
//!
//! ## Lifecycle
//!
//! 1. [`PopupBroker::show`] registers a one-shot channel keyed by
//!    `(event_name, origin)` and asks the [`PopupHost`] to open the popup
//! 2. The UI fires exactly one decision through [`PopupBroker::resolve`]
//!    (or [`PopupBroker::close`] when the window is dismissed)
//! 3. `show` returns the [`PopupOutcome`]; a second resolution for the same
//!    key fails with `PopupNotPending`

use crate::{ProviderError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Event names for popups opened by pipeline stages rather than by a method
pub mod events {
    /// Login prompt
    pub const LOGIN: &str = "provider_login_response";
    /// Connection prompt for a method that needs a connected origin
    pub const CONNECT: &str = "provider_connect_response";
    /// Network family switch prompt
    pub const SWITCH_NETWORK: &str = "provider_switch_network_response";
    /// Account switch prompt
    pub const SWITCH_ACCOUNT: &str = "provider_switch_account_response";
    /// Spam warning prompt
    pub const SPAM_WARNING: &str = "provider_spam_warning_response";
}

/// Approval popup flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopupRoute {
    /// Connect origin to an account
    Connect,
    /// Unlock the wallet
    Login,
    /// Switch active network
    SwitchNetwork,
    /// Switch active account
    SwitchAccount,
    /// Warn about a spamming origin
    SpamWarning,
    /// Approve a transaction for broadcast
    SendTransaction,
    /// Sign a plain message
    SignMessage,
    /// Sign typed data
    SignTypedData,
    /// Sign a transaction without broadcasting
    SignTransaction,
    /// Add a custom chain
    AddChain,
    /// Track a token
    WatchAsset,
    /// Sign-in with wallet
    SignIn,
}

impl PopupRoute {
    /// UI path for this route
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupRoute::Connect => "/connect",
            PopupRoute::Login => "/login",
            PopupRoute::SwitchNetwork => "/switch-network",
            PopupRoute::SwitchAccount => "/switch-account",
            PopupRoute::SpamWarning => "/spam-warning",
            PopupRoute::SendTransaction => "/send-transaction",
            PopupRoute::SignMessage => "/sign-message",
            PopupRoute::SignTypedData => "/sign-typed-data",
            PopupRoute::SignTransaction => "/sign-transaction",
            PopupRoute::AddChain => "/add-chain",
            PopupRoute::WatchAsset => "/watch-asset",
            PopupRoute::SignIn => "/sign-in",
        }
    }
}

impl fmt::Display for PopupRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request handed to the UI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupRequest {
    /// Unique popup ID
    pub id: String,
    /// Origin that triggered the popup
    pub caller_origin: String,
    /// Flow to render
    pub route: PopupRoute,
    /// Event the UI must fire with the decision
    pub event_name: String,
    /// Flow-specific data (method, params, ...)
    pub data: Value,
    /// When the popup was requested
    pub opened_at: DateTime<Utc>,
}

impl PopupRequest {
    /// Create a new popup request
    pub fn new(
        origin: impl Into<String>,
        route: PopupRoute,
        event_name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            caller_origin: origin.into(),
            route,
            event_name: event_name.into(),
            data,
            opened_at: Utc::now(),
        }
    }
}

/// Handle returned by the UI collaborator for an opened popup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupHandle {
    /// Popup request ID
    pub id: String,
    /// Host-specific window identifier
    pub window: Option<String>,
}

/// The user's decision
#[derive(Debug, Clone, PartialEq)]
pub enum PopupOutcome {
    /// Approved, with flow-specific result data
    Approved(Value),
    /// Explicitly declined
    Rejected {
        /// Reason given by the UI, if any
        reason: Option<String>,
    },
    /// Window closed without a decision
    Dismissed,
}

impl PopupOutcome {
    /// Approve without result data
    pub fn approved() -> Self {
        PopupOutcome::Approved(Value::Null)
    }

    /// Decline without a reason
    pub fn rejected() -> Self {
        PopupOutcome::Rejected { reason: None }
    }

    /// Check if the user approved
    pub fn is_approved(&self) -> bool {
        matches!(self, PopupOutcome::Approved(_))
    }
}

/// UI collaborator that renders approval popups
pub trait PopupHost: Send + Sync {
    /// Open a popup. Must not block on the user's decision.
    fn open_approval(&self, request: &PopupRequest) -> Result<PopupHandle>;
}

type PopupKey = (String, String);

/// Removes a pending entry when `show` finishes or is dropped
struct PendingGuard<'a> {
    pending: &'a DashMap<PopupKey, oneshot::Sender<PopupOutcome>>,
    key: PopupKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

/// Opens popups and delivers their one-shot decisions
pub struct PopupBroker {
    /// UI collaborator
    host: Arc<dyn PopupHost>,
    /// Open popups keyed by (event name, origin)
    pending: DashMap<PopupKey, oneshot::Sender<PopupOutcome>>,
}

impl PopupBroker {
    /// Create a broker over a UI collaborator
    pub fn new(host: Arc<dyn PopupHost>) -> Self {
        Self {
            host,
            pending: DashMap::new(),
        }
    }

    /// Open a popup and wait for the user's decision.
    ///
    /// A decision channel dropped without a value counts as dismissal.
    pub async fn show(&self, request: PopupRequest) -> Result<PopupOutcome> {
        let key = (request.event_name.clone(), request.caller_origin.clone());
        let (tx, rx) = oneshot::channel();

        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(ProviderError::PopupUnavailable(format!(
                    "{} is already open for {}",
                    request.event_name, request.caller_origin
                )));
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            key,
        };

        let handle = self.host.open_approval(&request)?;
        info!(
            popup_id = %handle.id,
            origin = %request.caller_origin,
            route = %request.route,
            event = %request.event_name,
            "Approval popup opened"
        );

        let outcome = rx.await.unwrap_or(PopupOutcome::Dismissed);
        debug!(popup_id = %handle.id, approved = outcome.is_approved(), "Approval popup resolved");
        Ok(outcome)
    }

    /// Deliver the user's decision for an open popup. Succeeds once.
    pub fn resolve(&self, event_name: &str, origin: &str, outcome: PopupOutcome) -> Result<()> {
        let key = (event_name.to_string(), origin.to_string());
        let (_, tx) = self.pending.remove(&key).ok_or_else(|| {
            warn!(event = %event_name, origin = %origin, "Resolution for a popup that is not open");
            ProviderError::PopupNotPending(format!("{} for {}", event_name, origin))
        })?;

        tx.send(outcome)
            .map_err(|_| ProviderError::PopupNotPending(format!("{} for {}", event_name, origin)))
    }

    /// Approve an open popup
    pub fn approve(&self, event_name: &str, origin: &str, result: Value) -> Result<()> {
        self.resolve(event_name, origin, PopupOutcome::Approved(result))
    }

    /// Decline an open popup
    pub fn reject(&self, event_name: &str, origin: &str, reason: Option<String>) -> Result<()> {
        self.resolve(event_name, origin, PopupOutcome::Rejected { reason })
    }

    /// Report that the popup window was closed
    pub fn close(&self, event_name: &str, origin: &str) -> Result<()> {
        self.resolve(event_name, origin, PopupOutcome::Dismissed)
    }

    /// Check if a popup is awaiting a decision
    pub fn is_pending(&self, event_name: &str, origin: &str) -> bool {
        self.pending
            .contains_key(&(event_name.to_string(), origin.to_string()))
    }

    /// Number of popups awaiting a decision
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Popup host that forwards each request into a channel.
///
/// Used by tests and the CLI simulator to play the user.
pub struct ChannelPopupHost {
    sender: mpsc::UnboundedSender<PopupRequest>,
    opened: Mutex<Vec<PopupRequest>>,
    unavailable: AtomicBool,
}

impl ChannelPopupHost {
    /// Create a host and the receiving end of its request channel
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PopupRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            sender,
            opened: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        });
        (host, receiver)
    }

    /// Make subsequent opens fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every popup opened so far
    pub fn opened(&self) -> Vec<PopupRequest> {
        self.opened.lock().clone()
    }

    /// Number of popups opened so far
    pub fn opened_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Routes of every popup opened so far, in order
    pub fn opened_routes(&self) -> Vec<PopupRoute> {
        self.opened.lock().iter().map(|r| r.route).collect()
    }
}

impl PopupHost for ChannelPopupHost {
    fn open_approval(&self, request: &PopupRequest) -> Result<PopupHandle> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::PopupUnavailable("popup host unavailable".into()));
        }
        self.opened.lock().push(request.clone());
        self.sender
            .send(request.clone())
            .map_err(|_| ProviderError::PopupUnavailable("popup channel closed".into()))?;

        Ok(PopupHandle {
            id: request.id.clone(),
            window: None,
        })
    }
}
