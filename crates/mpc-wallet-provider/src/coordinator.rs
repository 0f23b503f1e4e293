//! Approval coordination
//!
//! Guarantees that at most one approval popup is visible at a time while
//! any number of calls are in flight.
//!
//! ## Rules
//!
//! - No popup active: the caller takes the slot and shows its popup
//! - Same route active: the caller fails at once with `DuplicateRequest`
//! - Different route active: the caller queues for up to the queue timeout
//!
//! When a popup closes the queue drains: once the network is idle, the
//! oldest waiter is woken and its whole call is re-run from scratch, since
//! connection, network and lock state may have changed while it waited.

use crate::network::NetworkGate;
use crate::popup::{PopupBroker, PopupOutcome, PopupRequest, PopupRoute};
use crate::{ProviderError, RequestContext, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The popup currently holding the slot
#[derive(Debug, Clone)]
pub struct ActivePopup {
    /// Route being shown
    pub route: PopupRoute,
    /// Origin that opened it
    pub origin: String,
    /// When it took the slot
    pub opened_at: Instant,
}

/// A call waiting for the slot
struct PendingApproval {
    id: Uuid,
    context: RequestContext,
    route: PopupRoute,
    enqueued_at: Instant,
    turn: oneshot::Sender<()>,
}

#[derive(Default)]
struct CoordinatorState {
    active: Option<ActivePopup>,
    queue: VecDeque<PendingApproval>,
    draining: bool,
}

enum Admission {
    Granted,
    Queued {
        id: Uuid,
        enqueued_at: Instant,
        turn: oneshot::Receiver<()>,
    },
}

/// Releases the slot when the popup future completes or is dropped
struct ActiveSlot {
    coordinator: Arc<ApprovalCoordinator>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let released = self.coordinator.state.lock().active.take();
        if let Some(active) = released {
            debug!(
                route = %active.route,
                origin = %active.origin,
                held_ms = active.opened_at.elapsed().as_millis() as u64,
                "Approval slot released"
            );
        }
        self.coordinator.schedule_drain();
    }
}

/// Serializes approval popups
pub struct ApprovalCoordinator {
    state: Mutex<CoordinatorState>,
    gate: Arc<NetworkGate>,
    queue_timeout: Duration,
}

impl ApprovalCoordinator {
    /// Create a coordinator
    pub fn new(gate: Arc<NetworkGate>, queue_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CoordinatorState::default()),
            gate,
            queue_timeout,
        })
    }

    /// Run `show` once this call owns the approval slot.
    ///
    /// A queued call that gets its turn returns `ProviderError::Replay`; the
    /// provider then re-runs it through the full pipeline.
    pub async fn coordinate<T, F, Fut>(
        self: &Arc<Self>,
        ctx: &RequestContext,
        route: PopupRoute,
        show: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.admit(ctx, route)? {
            Admission::Granted => {
                let _slot = ActiveSlot {
                    coordinator: self.clone(),
                };
                show().await
            }
            Admission::Queued {
                id,
                enqueued_at,
                turn,
            } => self.wait_for_turn(ctx, route, id, enqueued_at, turn).await,
        }
    }

    fn admit(&self, ctx: &RequestContext, route: PopupRoute) -> Result<Admission> {
        let mut state = self.state.lock();
        match &state.active {
            None => {
                state.active = Some(ActivePopup {
                    route,
                    origin: ctx.origin().to_string(),
                    opened_at: Instant::now(),
                });
                debug!(route = %route, origin = %ctx.origin(), "Approval slot taken");
                Ok(Admission::Granted)
            }
            Some(active) if active.route == route => {
                warn!(
                    route = %route,
                    origin = %ctx.origin(),
                    method = %ctx.method(),
                    "Duplicate approval request rejected"
                );
                Err(ProviderError::DuplicateRequest(route.to_string()))
            }
            Some(_) => {
                let (tx, rx) = oneshot::channel();
                let id = Uuid::new_v4();
                // A replay that lost the free slot to a newcomer keeps its
                // place at the head and its original deadline
                let requeued = ctx.queued_at();
                let enqueued_at = requeued.unwrap_or_else(Instant::now);
                let entry = PendingApproval {
                    id,
                    context: ctx.clone(),
                    route,
                    enqueued_at,
                    turn: tx,
                };
                if requeued.is_some() {
                    state.queue.push_front(entry);
                } else {
                    state.queue.push_back(entry);
                }
                info!(
                    route = %route,
                    origin = %ctx.origin(),
                    method = %ctx.method(),
                    queue_len = state.queue.len(),
                    requeued = requeued.is_some(),
                    "Approval request queued"
                );
                Ok(Admission::Queued {
                    id,
                    enqueued_at,
                    turn: rx,
                })
            }
        }
    }

    async fn wait_for_turn<T>(
        self: &Arc<Self>,
        ctx: &RequestContext,
        route: PopupRoute,
        id: Uuid,
        enqueued_at: Instant,
        turn: oneshot::Receiver<()>,
    ) -> Result<T> {
        let remaining = self.queue_timeout.saturating_sub(enqueued_at.elapsed());
        match tokio::time::timeout(remaining, turn).await {
            Ok(Ok(())) => Err(ProviderError::Replay {
                queued_at: enqueued_at,
            }),
            Ok(Err(_)) => Err(ProviderError::Internal("approval queue dropped".into())),
            Err(_) => {
                let removed = {
                    let mut state = self.state.lock();
                    let before = state.queue.len();
                    state.queue.retain(|p| p.id != id);
                    before != state.queue.len()
                };
                // A drain may have picked this entry just as it expired
                if !removed {
                    self.schedule_drain();
                }
                warn!(
                    route = %route,
                    origin = %ctx.origin(),
                    method = %ctx.method(),
                    timeout_ms = self.queue_timeout.as_millis() as u64,
                    "Queued approval request timed out"
                );
                Err(ProviderError::RequestTimeout(route.to_string()))
            }
        }
    }

    /// Start a drain task if work is queued and none is running
    pub fn schedule_drain(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.draining || state.queue.is_empty() {
                return;
            }
            state.draining = true;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let this = self.clone();
                handle.spawn(async move { this.drain().await });
            }
            Err(_) => {
                self.state.lock().draining = false;
                warn!("No async runtime available; approval queue not drained");
            }
        }
    }

    async fn drain(self: Arc<Self>) {
        if let Err(e) = self.gate.wait_until_idle().await {
            warn!(error = %e, "Draining approval queue without an idle network");
        }

        let mut state = self.state.lock();
        state.draining = false;
        if state.active.is_some() {
            // The open popup drains again when it closes
            return;
        }

        while let Some(next) = state.queue.pop_front() {
            if next.turn.send(()).is_ok() {
                info!(
                    route = %next.route,
                    origin = %next.context.origin(),
                    method = %next.context.method(),
                    waited_ms = next.enqueued_at.elapsed().as_millis() as u64,
                    queue_len = state.queue.len(),
                    "Replaying queued approval request"
                );
                return;
            }
            debug!(origin = %next.context.origin(), "Skipping abandoned queue entry");
        }
    }

    /// Route of the popup holding the slot
    pub fn active_route(&self) -> Option<PopupRoute> {
        self.state.lock().active.as_ref().map(|a| a.route)
    }

    /// The popup holding the slot
    pub fn active(&self) -> Option<ActivePopup> {
        self.state.lock().active.clone()
    }

    /// Number of queued calls
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Routes of the queued calls, head first
    pub fn queued_routes(&self) -> Vec<PopupRoute> {
        self.state.lock().queue.iter().map(|p| p.route).collect()
    }

    /// Check if a popup holds the slot
    pub fn is_busy(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

/// Coordinator and popup broker together: the only way to show a popup
#[derive(Clone)]
pub struct ApprovalService {
    coordinator: Arc<ApprovalCoordinator>,
    broker: Arc<PopupBroker>,
}

impl ApprovalService {
    /// Create a service
    pub fn new(coordinator: Arc<ApprovalCoordinator>, broker: Arc<PopupBroker>) -> Self {
        Self {
            coordinator,
            broker,
        }
    }

    /// Show a popup for this call through the coordinator
    pub async fn request(
        &self,
        ctx: &RequestContext,
        route: PopupRoute,
        event_name: &str,
        data: Value,
    ) -> Result<PopupOutcome> {
        let request = PopupRequest::new(ctx.origin(), route, event_name, data);
        let broker = self.broker.clone();
        self.coordinator
            .coordinate(ctx, route, || async move { broker.show(request).await })
            .await
    }

    /// The coordinator
    pub fn coordinator(&self) -> &Arc<ApprovalCoordinator> {
        &self.coordinator
    }

    /// The popup broker
    pub fn broker(&self) -> &Arc<PopupBroker> {
        &self.broker
    }
}
