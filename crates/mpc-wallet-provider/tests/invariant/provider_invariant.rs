//! Invariant tests for the dApp provider
//!
//! These tests verify guarantees that must hold under concurrent load:
//! - At most one approval popup is open at any time
//! - Every call is answered, with its own ID
//! - A backend executes a signing call only after the user approved it
//! - Nothing stays pending once all calls are answered

use crate::support::*;
use futures_util::future::join_all;
use mpc_wallet_provider::{PopupOutcome, PopupRoute, RpcResponse, codes};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const ORIGINS: [&str; 3] = [APP, OTHER, "https://third.example"];

fn typed_data() -> Value {
    json!({
        "types": {
            "Permit": [
                { "name": "owner", "type": "address" },
                { "name": "value", "type": "uint256" }
            ]
        },
        "domain": {},
        "message": { "owner": MPC_ACCOUNT, "value": "1" }
    })
}

fn workload(i: usize) -> (&'static str, &'static str, Vec<Value>) {
    let origin = ORIGINS[i % ORIGINS.len()];
    match i % 6 {
        0 => (origin, "eth_sendTransaction", vec![transaction()]),
        1 => (origin, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]),
        2 => (origin, "eth_signTypedData_v4", vec![json!(MPC_ACCOUNT), typed_data()]),
        3 => (
            origin,
            "wallet_watchAsset",
            vec![json!({ "type": "ERC20", "options": { "address": SECOND_ACCOUNT } })],
        ),
        4 => (origin, "eth_blockNumber", vec![]),
        _ => (origin, "eth_accounts", vec![]),
    }
}

/// The user: answers popups in turn while recording what was open
fn spawn_user(
    h: &mut Harness,
) -> (tokio::task::JoinHandle<()>, Arc<Mutex<Vec<(usize, Option<PopupRoute>, PopupRoute)>>>) {
    let (_, placeholder) = tokio::sync::mpsc::unbounded_channel();
    let mut popups = std::mem::replace(&mut h.popups, placeholder);
    let provider = h.provider.clone();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let log = observed.clone();

    let user = tokio::spawn(async move {
        let mut answered = 0usize;
        while let Some(popup) = popups.recv().await {
            tokio::task::yield_now().await;
            log.lock().push((
                provider.broker().pending_count(),
                provider.coordinator().active_route(),
                popup.route,
            ));

            let outcome = match (popup.route, answered % 3) {
                (PopupRoute::SpamWarning, _) => PopupOutcome::Approved(json!({ "block": false })),
                (_, 0) => PopupOutcome::Approved(json!({})),
                (_, 1) => PopupOutcome::rejected(),
                _ => PopupOutcome::Dismissed,
            };
            answered += 1;
            let _ = provider.resolve_popup(&popup.event_name, &popup.caller_origin, outcome);
        }
    });
    (user, observed)
}

#[tokio::test]
async fn test_one_popup_at_a_time_under_load() {
    let mut h = Harness::new();
    for origin in ORIGINS {
        h.connect(origin);
    }
    let (user, observed) = spawn_user(&mut h);

    let calls: Vec<_> = (0..36)
        .map(|i| {
            let (origin, method, params) = workload(i);
            (method, h.spawn(origin, method, params))
        })
        .collect();

    let methods: Vec<&str> = calls.iter().map(|(m, _)| *m).collect();
    let responses: Vec<RpcResponse> = tokio::time::timeout(
        Duration::from_secs(30),
        join_all(calls.into_iter().map(|(_, handle)| handle)),
    )
    .await
    .expect("every call should be answered")
    .into_iter()
    .map(|r| r.unwrap())
    .collect();
    user.abort();

    // Exactly one popup open, and it holds the slot, whenever the user looks
    let observed = observed.lock();
    assert!(!observed.is_empty());
    for (pending, active, route) in observed.iter() {
        assert_eq!(*pending, 1);
        assert_eq!(*active, Some(*route));
    }

    // Only policy, user and coordination outcomes; never an internal error
    for response in &responses {
        if let Some(error) = response.error() {
            assert!(
                [
                    codes::USER_REJECTED,
                    codes::UNAUTHORIZED,
                    codes::DUPLICATE_REQUEST
                ]
                .contains(&error.code),
                "unexpected error {:?}",
                error
            );
        }
    }

    // Signing reached the backend once per approved call
    for method in ["eth_sendTransaction", "personal_sign", "eth_signTypedData_v4"] {
        let successes = methods
            .iter()
            .zip(&responses)
            .filter(|(m, r)| **m == method && r.is_success())
            .count();
        assert_eq!(h.evm.call_count(method), successes, "{}", method);
    }

    assert!(!h.provider.coordinator().is_busy());
    assert_eq!(h.provider.coordinator().queue_len(), 0);
    assert_eq!(h.provider.broker().pending_count(), 0);
}

#[tokio::test]
async fn test_every_response_echoes_its_id() {
    let mut h = Harness::new();
    for origin in ORIGINS {
        h.connect(origin);
    }
    let (user, _) = spawn_user(&mut h);

    let calls: Vec<_> = (0..24)
        .map(|i| {
            let (origin, method, params) = workload(i);
            let provider = h.provider.clone();
            let id = json!(format!("req-{}", i));
            let request = mpc_wallet_provider::RpcRequest::new(id.clone(), origin, method, params);
            (id, tokio::spawn(async move { provider.request(request).await }))
        })
        .collect();

    for (id, handle) in calls {
        let response = tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .expect("call answered")
            .unwrap();
        assert_eq!(response.id, id);
        assert!(response.is_success() || response.error().is_some());
    }
    user.abort();
}

#[tokio::test]
async fn test_blocked_origin_never_sees_popups() {
    let mut h = Harness::new();
    h.connect(APP);
    h.provider.spam().block(APP);

    for _ in 0..5 {
        let response = h.call(APP, "eth_sendTransaction", vec![transaction()]).await;
        assert_eq!(code(&response), codes::UNAUTHORIZED);
    }
    assert_eq!(h.host.opened_count(), 0);
    assert!(h.no_popup_waiting());
    assert_eq!(h.evm.total_calls(), 0);
}
