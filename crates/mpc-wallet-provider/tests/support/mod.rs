//! Shared test harness: a provider wired to in-memory collaborators, with
//! the test playing the user through the popup channel.

#![allow(dead_code)]

use mpc_wallet_provider::{
    Account, AccountKind, ChainType, ConnectionRecord, MemoryBackend,
    MemorySession, PopupOutcome, PopupRequest, ProviderConfig, RpcRequest, RpcResponse,
    WalletProvider, popup::ChannelPopupHost,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const APP: &str = "https://app.example";
pub const OTHER: &str = "https://other.example";

pub const MPC_ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
pub const SECOND_ACCOUNT: &str = "0x2222222222222222222222222222222222222222";
pub const LEDGER_ACCOUNT: &str = "0x3333333333333333333333333333333333333333";

pub fn mpc_account() -> Account {
    Account::new(MPC_ACCOUNT, AccountKind::Mpc)
}

pub fn second_account() -> Account {
    Account::new(SECOND_ACCOUNT, AccountKind::Imported)
}

pub fn ledger_account() -> Account {
    Account::new(LEDGER_ACCOUNT, AccountKind::Hardware)
}

/// Hex for "hello"
pub fn message() -> Value {
    json!("0x68656c6c6f")
}

pub fn transaction() -> Value {
    json!({
        "from": MPC_ACCOUNT,
        "to": SECOND_ACCOUNT,
        "value": "0xde0b6b3a7640000",
    })
}

pub struct Harness {
    pub provider: Arc<WalletProvider>,
    pub host: Arc<ChannelPopupHost>,
    pub popups: mpsc::UnboundedReceiver<PopupRequest>,
    pub session: Arc<MemorySession>,
    pub evm: Arc<MemoryBackend>,
    pub solana: Arc<MemoryBackend>,
    next_id: AtomicU64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            ProviderConfig::default(),
            MemorySession::new(ChainType::Evm, Some(mpc_account())),
        )
    }

    pub fn with_config(config: ProviderConfig) -> Self {
        Self::with(config, MemorySession::new(ChainType::Evm, Some(mpc_account())))
    }

    pub fn with_session(session: MemorySession) -> Self {
        Self::with(ProviderConfig::default(), session)
    }

    pub fn with(config: ProviderConfig, session: MemorySession) -> Self {
        let (host, popups) = ChannelPopupHost::new();
        let session = Arc::new(session);
        let evm = Arc::new(MemoryBackend::with_defaults(ChainType::Evm));
        let solana = Arc::new(MemoryBackend::with_defaults(ChainType::Solana));

        let provider = WalletProvider::builder()
            .config(config)
            .session(session.clone())
            .popup_host(host.clone())
            .backend(evm.clone())
            .backend(solana.clone())
            .build()
            .expect("provider should build");

        Self {
            provider: Arc::new(provider),
            host,
            popups,
            session,
            evm,
            solana,
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect an origin with the active account
    pub fn connect(&self, origin: &str) {
        self.connect_as(origin, &mpc_account());
    }

    pub fn connect_as(&self, origin: &str, account: &Account) {
        self.provider
            .connections()
            .connect(ConnectionRecord::new(origin, account))
            .expect("connect");
    }

    fn request(&self, origin: &str, method: &str, params: Vec<Value>) -> RpcRequest {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        RpcRequest::new(id, origin, method, params)
    }

    /// Issue a call and wait for its response
    pub async fn call(&self, origin: &str, method: &str, params: Vec<Value>) -> RpcResponse {
        self.provider.request(self.request(origin, method, params)).await
    }

    /// Issue a call in the background
    pub fn spawn(&self, origin: &str, method: &str, params: Vec<Value>) -> JoinHandle<RpcResponse> {
        let provider = self.provider.clone();
        let request = self.request(origin, method, params);
        tokio::spawn(async move { provider.request(request).await })
    }

    /// Wait for the next popup to open
    pub async fn next_popup(&mut self) -> PopupRequest {
        tokio::time::timeout(Duration::from_secs(5), self.popups.recv())
            .await
            .expect("a popup should open")
            .expect("popup channel open")
    }

    /// Check that no popup is waiting in the channel
    pub fn no_popup_waiting(&mut self) -> bool {
        self.popups.try_recv().is_err()
    }

    pub fn approve(&self, popup: &PopupRequest, result: Value) {
        self.provider
            .resolve_popup(&popup.event_name, &popup.caller_origin, PopupOutcome::Approved(result))
            .expect("popup should be pending");
    }

    pub fn reject(&self, popup: &PopupRequest) {
        self.provider
            .resolve_popup(&popup.event_name, &popup.caller_origin, PopupOutcome::rejected())
            .expect("popup should be pending");
    }

    pub fn dismiss(&self, popup: &PopupRequest) {
        self.provider
            .popup_closed(&popup.event_name, &popup.caller_origin)
            .expect("popup should be pending");
    }
}

/// Yield until `condition` holds
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was never reached");
}

pub fn code(response: &RpcResponse) -> i64 {
    response.error().expect("expected an error response").code
}

pub fn message_of(response: &RpcResponse) -> String {
    response
        .error()
        .expect("expected an error response")
        .message
        .clone()
}
