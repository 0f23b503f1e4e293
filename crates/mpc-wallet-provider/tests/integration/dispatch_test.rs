//! Integration tests for method dispatch
//!
//! These tests verify:
//! - Namespace handlers answer through the full provider
//! - Read caching honors TTLs and network switches
//! - Failures and panics always come back as error envelopes

use crate::support::*;
use async_trait::async_trait;
use mpc_wallet_provider::{
    BackendCall, ChainBackend, ChainType, MemorySession, PopupHandle, PopupHost,
    PopupRequest, PopupRoute, ProviderConfig, Result, RpcRequest, VERSION, WalletProvider,
    codes,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Handlers
// ============================================================================

#[tokio::test]
async fn test_internal_methods() {
    let h = Harness::new();

    assert_eq!(h.call(APP, "ping", vec![]).await.result(), Some(&json!("pong")));
    assert_eq!(
        h.call(APP, "getVersion", vec![]).await.result(),
        Some(&json!(VERSION))
    );

    let methods = h.call(APP, "getSupportedMethods", vec![]).await;
    let methods = methods.result().unwrap().as_array().unwrap().clone();
    assert!(methods.contains(&json!("eth_sendTransaction")));
    assert!(methods.contains(&json!("solana_signIn")));

    h.connect(APP);
    let state = h.call(APP, "getProviderState", vec![]).await;
    let state = state.result().unwrap();
    assert_eq!(state["chainType"], json!("evm"));
    assert_eq!(state["isConnected"], json!(true));
    assert_eq!(state["account"], json!(MPC_ACCOUNT));
}

#[tokio::test]
async fn test_unknown_method() {
    let h = Harness::new();
    let response = h.call(APP, "eth_mine", vec![]).await;
    assert_eq!(code(&response), codes::METHOD_NOT_FOUND);
    assert_eq!(h.evm.total_calls(), 0);
}

#[tokio::test]
async fn test_accounts_reflect_connection() {
    let h = Harness::new();
    assert_eq!(h.call(APP, "eth_accounts", vec![]).await.result(), Some(&json!([])));

    h.connect(APP);
    assert_eq!(
        h.call(APP, "eth_accounts", vec![]).await.result(),
        Some(&json!([MPC_ACCOUNT]))
    );

    let removed = h.call(APP, "wallet_disconnect", vec![]).await;
    assert_eq!(removed.result(), Some(&json!(true)));
    assert!(!h.provider.connections().is_connected(APP));
    assert_eq!(h.call(APP, "eth_accounts", vec![]).await.result(), Some(&json!([])));
}

#[tokio::test]
async fn test_connect_returns_existing_connection_without_popup() {
    let mut h = Harness::new();
    h.connect(APP);

    let response = h.call(APP, "wallet_connect", vec![]).await;
    assert_eq!(response.result().unwrap()["account"]["id"], json!(MPC_ACCOUNT));
    assert!(h.no_popup_waiting());
}

#[tokio::test]
async fn test_chain_switch_invalidates_cached_reads() {
    let mut h = Harness::new();
    h.connect(APP);

    assert_eq!(h.call(APP, "eth_chainId", vec![]).await.result(), Some(&json!("0x1")));
    assert_eq!(h.call(APP, "net_version", vec![]).await.result(), Some(&json!("1")));

    let switch = h.spawn(APP, "wallet_switchEthereumChain", vec![json!({ "chainId": "0x89" })]);
    let popup = h.next_popup().await;
    h.approve(&popup, json!({}));
    assert_eq!(switch.await.unwrap().result(), Some(&Value::Null));

    assert_eq!(h.call(APP, "eth_chainId", vec![]).await.result(), Some(&json!("0x89")));
    assert_eq!(h.call(APP, "net_version", vec![]).await.result(), Some(&json!("137")));
}

#[tokio::test]
async fn test_switch_to_active_chain_needs_no_popup() {
    let mut h = Harness::new();
    let response = h
        .call(APP, "wallet_switchEthereumChain", vec![json!({ "chainId": "0x1" })])
        .await;
    assert!(response.is_success());
    assert!(h.no_popup_waiting());
}

#[tokio::test]
async fn test_wallet_balance_uses_active_chain_backend() {
    let h = Harness::with_session(MemorySession::new(ChainType::Solana, Some(mpc_account())));
    h.connect(APP);

    let response = h.call(APP, "wallet_getBalance", vec![]).await;
    assert_eq!(response.result(), Some(&json!(1_000_000_000u64)));
    assert_eq!(h.solana.call_count("getBalance"), 1);
    assert_eq!(h.evm.total_calls(), 0);
}

#[tokio::test]
async fn test_solana_sign_in_connects_origin() {
    let mut h = Harness::with_session(MemorySession::new(ChainType::Solana, Some(mpc_account())));

    let sign_in = h.spawn(APP, "solana_signIn", vec![json!({ "domain": "app.example" })]);
    let popup = h.next_popup().await;
    h.approve(&popup, json!({}));

    assert!(sign_in.await.unwrap().is_success());
    assert!(h.provider.connections().is_connected(APP));
    assert_eq!(h.solana.call_count("solana_signIn"), 1);
}

#[tokio::test]
async fn test_backend_failure_is_internal_error() {
    let h = Harness::new();
    h.evm.fail_with("eth_call", "execution reverted");

    let response = h.call(APP, "eth_call", vec![json!({ "to": SECOND_ACCOUNT })]).await;
    assert_eq!(code(&response), codes::INTERNAL);
}

#[tokio::test]
async fn test_signing_forwards_approval_and_account() {
    let mut h = Harness::new();
    h.connect(APP);

    let send = h.spawn(APP, "eth_sendTransaction", vec![transaction()]);
    let popup = h.next_popup().await;
    h.approve(&popup, json!({ "gasLimit": "0x5208" }));
    assert!(send.await.unwrap().is_success());

    let call = h.evm.calls().pop().unwrap();
    assert_eq!(call.method, "eth_sendTransaction");
    assert_eq!(call.account.unwrap().id, MPC_ACCOUNT);
    assert_eq!(call.approval, Some(json!({ "gasLimit": "0x5208" })));
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cached_read_expires_after_ttl() {
    let h = Harness::new();

    assert!(h.call(APP, "eth_blockNumber", vec![]).await.is_success());
    assert!(h.call(APP, "eth_blockNumber", vec![]).await.is_success());
    assert_eq!(h.evm.call_count("eth_blockNumber"), 1);

    tokio::time::advance(Duration::from_millis(1_999)).await;
    h.call(APP, "eth_blockNumber", vec![]).await;
    assert_eq!(h.evm.call_count("eth_blockNumber"), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    h.call(APP, "eth_blockNumber", vec![]).await;
    assert_eq!(h.evm.call_count("eth_blockNumber"), 2);

    let stats = h.provider.cache().stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.expired, 1);
}

#[tokio::test]
async fn test_cache_is_per_origin_and_params() {
    let h = Harness::new();

    h.call(APP, "eth_getBalance", vec![json!(MPC_ACCOUNT), json!("latest")]).await;
    h.call(OTHER, "eth_getBalance", vec![json!(MPC_ACCOUNT), json!("latest")]).await;
    h.call(APP, "eth_getBalance", vec![json!(SECOND_ACCOUNT), json!("latest")]).await;
    h.call(APP, "eth_getBalance", vec![json!(MPC_ACCOUNT), json!("latest")]).await;

    assert_eq!(h.evm.call_count("eth_getBalance"), 3);
}

#[tokio::test]
async fn test_uncached_methods_always_execute() {
    let h = Harness::new();
    for _ in 0..3 {
        h.call(APP, "eth_getTransactionCount", vec![json!(MPC_ACCOUNT)]).await;
    }
    assert_eq!(h.evm.call_count("eth_getTransactionCount"), 3);
}

#[tokio::test]
async fn test_cache_can_be_disabled() {
    let h = Harness::with_config(ProviderConfig::default().without_cache());
    h.call(APP, "eth_blockNumber", vec![]).await;
    h.call(APP, "eth_blockNumber", vec![]).await;
    assert_eq!(h.evm.call_count("eth_blockNumber"), 2);
    assert!(h.provider.cache().is_empty());
}

#[tokio::test]
async fn test_failed_reads_are_not_cached() {
    let h = Harness::new();
    h.evm.fail_with("eth_gasPrice", "rpc down");
    assert_eq!(code(&h.call(APP, "eth_gasPrice", vec![]).await), codes::INTERNAL);
    assert!(h.provider.cache().is_empty());
}

#[tokio::test]
async fn test_network_prompt_drops_cached_balance() {
    let mut h = Harness::new();
    h.connect(APP);

    let before = h.call(APP, "wallet_getBalance", vec![]).await;
    assert_eq!(before.result(), Some(&json!("0xde0b6b3a7640000")));

    // A Solana call on EVM switches networks through its own prompt
    let sign = h.spawn(APP, "solana_signMessage", vec![json!("aGVsbG8=")]);
    let switch = h.next_popup().await;
    assert_eq!(switch.route, PopupRoute::SwitchNetwork);
    h.approve(&switch, json!({}));
    let popup = h.next_popup().await;
    h.approve(&popup, json!({}));
    assert!(sign.await.unwrap().is_success());

    let after = h.call(APP, "wallet_getBalance", vec![]).await;
    assert_eq!(after.result(), Some(&json!(1_000_000_000u64)));
    assert_eq!(h.solana.call_count("getBalance"), 1);
}

#[tokio::test]
async fn test_account_prompt_drops_cached_reads() {
    let mut h = Harness::new();
    h.connect_as(APP, &second_account());

    h.call(APP, "wallet_getBalance", vec![]).await;
    h.call(APP, "wallet_getBalance", vec![]).await;
    assert_eq!(h.evm.call_count("getBalance"), 1);

    let sign = h.spawn(APP, "personal_sign", vec![message(), json!(SECOND_ACCOUNT)]);
    let switch = h.next_popup().await;
    assert_eq!(switch.route, PopupRoute::SwitchAccount);
    h.approve(&switch, json!({}));
    let popup = h.next_popup().await;
    h.approve(&popup, json!({}));
    assert!(sign.await.unwrap().is_success());

    h.call(APP, "wallet_getBalance", vec![]).await;
    assert_eq!(h.evm.call_count("getBalance"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_reads_do_not_accumulate() {
    let h = Harness::new();
    for i in 0..1_000u64 {
        let address = format!("0x{:040x}", i);
        h.call(APP, "eth_getBalance", vec![json!(address), json!("latest")]).await;
    }
    assert_eq!(h.provider.cache().len(), 1_000);

    tokio::time::advance(Duration::from_secs(3_600)).await;
    h.call(APP, "eth_getBalance", vec![json!(MPC_ACCOUNT), json!("latest")]).await;

    assert_eq!(h.provider.cache().len(), 1);
    assert_eq!(h.provider.cache().stats().expired, 1_000);
}

// ============================================================================
// Failure Containment
// ============================================================================

struct ExplodingBackend;

#[async_trait]
impl ChainBackend for ExplodingBackend {
    fn chain(&self) -> ChainType {
        ChainType::Evm
    }

    async fn call(&self, call: BackendCall) -> Result<Value> {
        panic!("backend exploded on {}", call.method);
    }
}

struct ExplodingHost;

impl PopupHost for ExplodingHost {
    fn open_approval(&self, _request: &PopupRequest) -> Result<PopupHandle> {
        panic!("popup window crashed");
    }
}

fn provider_with(backend: Arc<dyn ChainBackend>, host: Arc<dyn PopupHost>) -> WalletProvider {
    WalletProvider::builder()
        .session(Arc::new(MemorySession::new(ChainType::Evm, Some(mpc_account()))))
        .popup_host(host)
        .backend(backend)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_backend_panic_becomes_error_envelope() {
    let (host, _popups) = mpc_wallet_provider::popup::ChannelPopupHost::new();
    let provider = provider_with(Arc::new(ExplodingBackend), host);

    let response = provider
        .request(RpcRequest::new(7, APP, "eth_blockNumber", vec![]))
        .await;
    assert_eq!(response.id, json!(7));
    assert_eq!(code(&response), codes::INTERNAL);

    let ping = provider.request(RpcRequest::new(8, APP, "ping", vec![])).await;
    assert_eq!(ping.result(), Some(&json!("pong")));
}

#[tokio::test]
async fn test_popup_panic_releases_slot() {
    let provider = provider_with(
        Arc::new(mpc_wallet_provider::MemoryBackend::with_defaults(ChainType::Evm)),
        Arc::new(ExplodingHost),
    );

    let response = provider
        .request(RpcRequest::new(1, APP, "eth_requestAccounts", vec![]))
        .await;
    assert_eq!(code(&response), codes::INTERNAL);
    assert!(!provider.coordinator().is_busy());
    assert_eq!(provider.broker().pending_count(), 0);
}

#[tokio::test]
async fn test_missing_backend_is_internal_error() {
    let (host, _popups) = mpc_wallet_provider::popup::ChannelPopupHost::new();
    let provider = provider_with(
        Arc::new(mpc_wallet_provider::MemoryBackend::with_defaults(ChainType::Evm)),
        host,
    );

    let response = provider
        .request(RpcRequest::new(1, APP, "solana_getBalance", vec![json!("pk")]))
        .await;
    assert_eq!(code(&response), codes::INTERNAL);
    assert!(message_of(&response).contains("solana"));
}

#[tokio::test]
async fn test_raw_envelope_round_trip() {
    let h = Harness::new();
    let response = h
        .provider
        .request_value(json!({
            "id": "abc",
            "callerOrigin": APP,
            "method": "ping",
        }))
        .await;
    assert_eq!(response.id, json!("abc"));
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "id": "abc", "result": "pong" })
    );
}
