//! Integration tests for the policy pipeline
//!
//! These tests verify each stage through the full provider:
//! - Hardware restriction before any prompt
//! - Network-type, connection, account and login prompts
//! - Spam warning and blocking
//! - Payload validation before the method popup

use crate::support::*;
use mpc_wallet_provider::{
    ChainType, MemorySession, PopupRoute, ProviderConfig, SpamConfig,
    WalletSession, codes, popup::events,
};
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Hardware Restriction
// ============================================================================

#[tokio::test]
async fn test_hardware_restriction_precedes_network_prompt() {
    // Wrong network family and a hardware signer: the restriction wins
    let mut h = Harness::with_session(MemorySession::new(ChainType::Solana, Some(ledger_account())));
    h.connect_as(APP, &ledger_account());

    let response = h.call(APP, "eth_sign", vec![json!(LEDGER_ACCOUNT), message()]).await;
    assert_eq!(code(&response), codes::UNAUTHORIZED);
    assert!(message_of(&response).contains("eth_sign"));
    assert_eq!(h.host.opened_count(), 0);
    assert!(h.no_popup_waiting());
    assert_eq!(h.session.active_chain(), ChainType::Solana);
}

#[tokio::test]
async fn test_hardware_signer_can_use_supported_methods() {
    let mut h = Harness::with_session(MemorySession::new(ChainType::Evm, Some(ledger_account())));
    h.connect_as(APP, &ledger_account());

    let sign = h.spawn(APP, "personal_sign", vec![message(), json!(LEDGER_ACCOUNT)]);
    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::SignMessage);
    h.approve(&popup, json!({}));
    assert!(sign.await.unwrap().is_success());
}

// ============================================================================
// Network Type
// ============================================================================

#[tokio::test]
async fn test_network_type_prompt_switches_chain() {
    let mut h = Harness::with_session(MemorySession::new(ChainType::Solana, Some(mpc_account())));
    h.connect(APP);

    let sign = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
    let switch = h.next_popup().await;
    assert_eq!(switch.route, PopupRoute::SwitchNetwork);
    assert_eq!(switch.event_name, events::SWITCH_NETWORK);
    assert_eq!(switch.data["to"], json!("evm"));
    h.approve(&switch, json!({ "chainId": "0x89" }));

    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::SignMessage);
    h.approve(&popup, json!({}));

    assert!(sign.await.unwrap().is_success());
    assert_eq!(h.session.active_chain(), ChainType::Evm);
    assert_eq!(h.session.chain_id(), "0x89");
}

#[tokio::test]
async fn test_declined_network_switch_is_wrong_network() {
    let mut h = Harness::with_session(MemorySession::new(ChainType::Evm, Some(mpc_account())));
    h.connect(APP);

    let sign = h.spawn(APP, "solana_signMessage", vec![json!("aGVsbG8=")]);
    let switch = h.next_popup().await;
    assert_eq!(switch.route, PopupRoute::SwitchNetwork);
    h.reject(&switch);

    let response = sign.await.unwrap();
    assert_eq!(code(&response), codes::UNAUTHORIZED);
    assert_eq!(h.session.active_chain(), ChainType::Evm);
    assert_eq!(h.solana.total_calls(), 0);
}

// ============================================================================
// Connection
// ============================================================================

#[tokio::test]
async fn test_connection_prompt_connects_origin() {
    let mut h = Harness::new();

    let sign = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
    let connect = h.next_popup().await;
    assert_eq!(connect.route, PopupRoute::Connect);
    assert_eq!(connect.event_name, events::CONNECT);
    h.approve(&connect, json!({}));

    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::SignMessage);
    h.approve(&popup, json!({}));

    assert!(sign.await.unwrap().is_success());
    let record = h.provider.connections().get(APP).unwrap();
    assert_eq!(record.connected_account_id, MPC_ACCOUNT);
}

#[tokio::test]
async fn test_dismissed_connection_prompt_is_not_connected() {
    let mut h = Harness::new();

    let account = h.spawn(APP, "wallet_getAccount", vec![]);
    let connect = h.next_popup().await;
    h.dismiss(&connect);

    let response = account.await.unwrap();
    assert_eq!(code(&response), codes::UNAUTHORIZED);
    assert!(!h.provider.connections().is_connected(APP));
}

#[tokio::test]
async fn test_connection_approval_may_pick_account() {
    let mut h = Harness::new();

    let account = h.spawn(APP, "wallet_getAccount", vec![]);
    let connect = h.next_popup().await;
    h.approve(
        &connect,
        json!({ "account": { "id": SECOND_ACCOUNT, "kind": "imported" } }),
    );

    let response = account.await.unwrap();
    assert_eq!(response.result().unwrap()["id"], json!(SECOND_ACCOUNT));
}

// ============================================================================
// Account Switching
// ============================================================================

#[tokio::test]
async fn test_account_switch_prompt() {
    let mut h = Harness::new();
    h.connect_as(APP, &second_account());

    let sign = h.spawn(APP, "personal_sign", vec![message(), json!(SECOND_ACCOUNT)]);
    let switch = h.next_popup().await;
    assert_eq!(switch.route, PopupRoute::SwitchAccount);
    assert_eq!(switch.event_name, events::SWITCH_ACCOUNT);
    h.approve(&switch, json!({}));

    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::SignMessage);
    h.approve(&popup, json!({}));

    assert!(sign.await.unwrap().is_success());
    assert_eq!(h.session.active_account().unwrap().id, SECOND_ACCOUNT);
}

#[tokio::test]
async fn test_declined_account_switch_is_unauthorized() {
    let mut h = Harness::new();
    h.connect_as(APP, &second_account());

    let sign = h.spawn(APP, "personal_sign", vec![message(), json!(SECOND_ACCOUNT)]);
    let switch = h.next_popup().await;
    h.reject(&switch);

    assert_eq!(code(&sign.await.unwrap()), codes::UNAUTHORIZED);
    assert_eq!(h.session.active_account().unwrap().id, MPC_ACCOUNT);
}

#[tokio::test]
async fn test_switch_to_hardware_account_rechecks_restriction() {
    let mut h = Harness::new();
    h.connect_as(APP, &ledger_account());

    let sign = h.spawn(APP, "eth_sign", vec![json!(LEDGER_ACCOUNT), message()]);
    let switch = h.next_popup().await;
    assert_eq!(switch.route, PopupRoute::SwitchAccount);
    h.approve(&switch, json!({}));

    let response = sign.await.unwrap();
    assert_eq!(code(&response), codes::UNAUTHORIZED);
    assert_eq!(h.session.active_account().unwrap().id, MPC_ACCOUNT);
    assert_eq!(h.host.opened_count(), 1);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_locked_wallet_prompts_login() {
    let session = MemorySession::new(ChainType::Evm, Some(mpc_account()));
    session.lock();
    let mut h = Harness::with_session(session);
    h.connect(APP);

    let estimate = h.spawn(APP, "eth_estimateGas", vec![transaction()]);
    let login = h.next_popup().await;
    assert_eq!(login.route, PopupRoute::Login);
    assert_eq!(login.event_name, events::LOGIN);
    h.approve(&login, json!({}));

    assert_eq!(estimate.await.unwrap().result(), Some(&json!("0x5208")));
    assert!(!h.session.is_locked());
}

#[tokio::test]
async fn test_cancelled_login_is_user_rejection() {
    let session = MemorySession::new(ChainType::Evm, Some(mpc_account()));
    session.lock();
    let mut h = Harness::with_session(session);
    h.connect(APP);

    let estimate = h.spawn(APP, "eth_estimateGas", vec![transaction()]);
    let login = h.next_popup().await;
    h.dismiss(&login);

    assert_eq!(code(&estimate.await.unwrap()), codes::USER_REJECTED);
    assert!(h.session.is_locked());
    assert_eq!(h.evm.call_count("eth_estimateGas"), 0);
}

#[tokio::test]
async fn test_method_popup_doubles_as_login() {
    let session = MemorySession::new(ChainType::Evm, Some(mpc_account()));
    session.lock();
    let mut h = Harness::with_session(session);

    let connect = h.spawn(APP, "wallet_connect", vec![]);
    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::Connect);
    h.approve(&popup, json!({}));

    assert!(connect.await.unwrap().is_success());
    assert!(!h.session.is_locked());
    assert_eq!(h.host.opened_count(), 1);
}

// ============================================================================
// Spam Filter
// ============================================================================

#[tokio::test]
async fn test_spam_warning_then_block() {
    let mut h = Harness::new();
    h.connect(APP);

    for _ in 0..2 {
        let sign = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
        let popup = h.next_popup().await;
        assert_eq!(popup.route, PopupRoute::SignMessage);
        h.reject(&popup);
        assert_eq!(code(&sign.await.unwrap()), codes::USER_REJECTED);
    }

    let third = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
    let warning = h.next_popup().await;
    assert_eq!(warning.route, PopupRoute::SpamWarning);
    assert_eq!(warning.event_name, events::SPAM_WARNING);
    h.approve(&warning, json!({ "block": true }));
    assert_eq!(code(&third.await.unwrap()), codes::UNAUTHORIZED);

    let fourth = h.call(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]).await;
    assert_eq!(code(&fourth), codes::UNAUTHORIZED);
    assert_eq!(h.host.opened_count(), 3);
    assert!(h.provider.spam().is_blocked(APP));
}

#[tokio::test]
async fn test_spam_warning_can_be_waved_through() {
    let mut h = Harness::new();
    h.connect(APP);

    for _ in 0..2 {
        let sign = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
        let popup = h.next_popup().await;
        h.reject(&popup);
        sign.await.unwrap();
    }

    let third = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
    let warning = h.next_popup().await;
    h.approve(&warning, json!({ "block": false }));

    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::SignMessage);
    h.approve(&popup, json!({}));
    assert!(third.await.unwrap().is_success());
    assert!(!h.provider.spam().is_blocked(APP));
}

#[tokio::test]
async fn test_reads_are_not_spam_tracked() {
    let h = Harness::new();
    for _ in 0..10 {
        assert!(h.call(APP, "eth_blockNumber", vec![]).await.is_success());
    }
    assert_eq!(h.provider.spam().recent_count(APP), 0);
}

#[tokio::test]
async fn test_spam_filter_can_be_disabled() {
    let mut h = Harness::with_config(ProviderConfig::default().with_spam(SpamConfig::disabled()));
    h.connect(APP);

    for _ in 0..4 {
        let sign = h.spawn(APP, "personal_sign", vec![message(), json!(MPC_ACCOUNT)]);
        let popup = h.next_popup().await;
        assert_eq!(popup.route, PopupRoute::SignMessage);
        h.reject(&popup);
        sign.await.unwrap();
    }
}

// ============================================================================
// Payload Validation
// ============================================================================

#[tokio::test]
async fn test_typed_data_missing_field_rejected_before_popup() {
    let mut h = Harness::new();
    h.connect(APP);

    let typed = json!({
        "types": {
            "Pair": [
                { "name": "a", "type": "uint256" },
                { "name": "b", "type": "uint256" }
            ]
        },
        "domain": {},
        "message": { "a": "1" }
    });
    let response = h
        .call(APP, "eth_signTypedData_v4", vec![json!(MPC_ACCOUNT), typed])
        .await;
    assert_eq!(code(&response), codes::INVALID_PARAMS);
    assert!(message_of(&response).contains("Required field b is missing"));
    assert!(h.no_popup_waiting());
}

#[tokio::test]
async fn test_valid_typed_data_reaches_popup() {
    let mut h = Harness::new();
    h.connect(APP);

    let typed = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "chainId", "type": "uint256" }
            ],
            "Mail": [
                { "name": "from", "type": "Person" },
                { "name": "contents", "type": "string" }
            ],
            "Person": [
                { "name": "name", "type": "string" },
                { "name": "wallet", "type": "address" }
            ]
        },
        "domain": { "name": "Ether Mail", "chainId": 1 },
        "message": {
            "from": { "name": "Cow", "wallet": MPC_ACCOUNT },
            "contents": "Hello"
        }
    });
    // Sent as a JSON string, the way most dApps do
    let sign = h.spawn(
        APP,
        "eth_signTypedData_v4",
        vec![json!(MPC_ACCOUNT), json!(typed.to_string())],
    );
    let popup = h.next_popup().await;
    assert_eq!(popup.route, PopupRoute::SignTypedData);
    h.approve(&popup, json!({}));
    assert!(sign.await.unwrap().is_success());
}

#[tokio::test]
async fn test_malformed_message_rejected() {
    let mut h = Harness::new();
    h.connect(APP);

    let response = h
        .call(APP, "personal_sign", vec![json!("0xzz"), json!(MPC_ACCOUNT)])
        .await;
    assert_eq!(code(&response), codes::INVALID_PARAMS);

    let response = h.call(APP, "personal_sign", vec![]).await;
    assert_eq!(code(&response), codes::INVALID_PARAMS);
    assert!(h.no_popup_waiting());
}

// ============================================================================
// Network Readiness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_calls_wait_for_network_switch() {
    let h = Harness::new();
    h.session.begin_network_switch();

    let read = h.spawn(APP, "eth_blockNumber", vec![]);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!read.is_finished());
    assert_eq!(h.evm.total_calls(), 0);

    h.session.finish_network_switch();
    let response = read.await.unwrap();
    assert!(response.is_success());
}
