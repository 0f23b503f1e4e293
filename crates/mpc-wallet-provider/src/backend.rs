//! Chain backends
//!
//! The thin application layer that turns an authorized call into a
//! chain-specific RPC or signing request. Real backends live outside this
//! crate; [`MemoryBackend`] answers from a table for tests and simulation.

use crate::{Account, ChainType, ProviderError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// A call handed to a backend after policy passed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCall {
    /// Target chain family
    pub chain: ChainType,
    /// Backend method name
    pub method: String,
    /// Positional parameters
    pub params: Vec<Value>,
    /// Caller origin
    pub origin: String,
    /// Account acting for the origin, if any
    pub account: Option<Account>,
    /// Data returned by the approval popup, if one was shown
    pub approval: Option<Value>,
}

impl BackendCall {
    /// Create a call without account or approval data
    pub fn new(chain: ChainType, method: impl Into<String>, params: Vec<Value>, origin: impl Into<String>) -> Self {
        Self {
            chain,
            method: method.into(),
            params,
            origin: origin.into(),
            account: None,
            approval: None,
        }
    }

    /// Attach the acting account
    pub fn with_account(mut self, account: Option<Account>) -> Self {
        self.account = account;
        self
    }

    /// Attach popup approval data
    pub fn with_approval(mut self, approval: Value) -> Self {
        self.approval = Some(approval);
        self
    }
}

/// Executes calls for one chain family
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Chain family served
    fn chain(&self) -> ChainType;

    /// Execute a call
    async fn call(&self, call: BackendCall) -> Result<Value>;
}

/// Backend answering from a method -> result table
pub struct MemoryBackend {
    chain: ChainType,
    responses: DashMap<String, Value>,
    failures: DashMap<String, String>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new(chain: ChainType) -> Self {
        Self {
            chain,
            responses: DashMap::new(),
            failures: DashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a backend with plausible answers for common methods
    pub fn with_defaults(chain: ChainType) -> Self {
        let backend = Self::new(chain);
        let defaults: Vec<(&str, Value)> = match chain {
            ChainType::Evm => vec![
                ("eth_chainId", json!("0x1")),
                ("eth_blockNumber", json!("0x12a05f2")),
                ("eth_gasPrice", json!("0x3b9aca00")),
                ("eth_getBalance", json!("0xde0b6b3a7640000")),
                ("eth_getTransactionCount", json!("0x0")),
                ("eth_getTransactionReceipt", Value::Null),
                ("eth_call", json!("0x")),
                ("eth_estimateGas", json!("0x5208")),
                ("getBalance", json!("0xde0b6b3a7640000")),
                ("eth_sendTransaction", json!(format!("0x{}", "ab".repeat(32)))),
                ("personal_sign", json!(format!("0x{}", "11".repeat(65)))),
                ("eth_sign", json!(format!("0x{}", "22".repeat(65)))),
                ("eth_signTypedData_v4", json!(format!("0x{}", "33".repeat(65)))),
                ("eth_signTypedData_v3", json!(format!("0x{}", "33".repeat(65)))),
                ("eth_signTypedData", json!(format!("0x{}", "33".repeat(65)))),
                ("wallet_addEthereumChain", Value::Null),
            ],
            ChainType::Solana => vec![
                ("solana_getBalance", json!(1_000_000_000u64)),
                ("getBalance", json!(1_000_000_000u64)),
                ("solana_getLatestBlockhash", json!("GHtXQBsoZHVnNFa9YevAzFr17DJjgHXk3ycTKD5xD3Zi")),
                ("solana_signMessage", json!({"signature": "5".repeat(88)})),
                ("solana_signTransaction", json!({"signedTransaction": "AQ=="})),
                ("solana_signAllTransactions", json!({"signedTransactions": ["AQ=="]})),
                ("solana_signAndSendTransaction", json!({"signature": "4".repeat(88)})),
                ("solana_signIn", json!({"signature": "3".repeat(88)})),
            ],
        };
        for (method, value) in defaults {
            backend.set_response(method, value);
        }
        backend
    }

    /// Set the answer for a method
    pub fn set_response(&self, method: impl Into<String>, value: Value) {
        self.responses.insert(method.into(), value);
    }

    /// Builder form of [`MemoryBackend::set_response`]
    pub fn with_response(self, method: impl Into<String>, value: Value) -> Self {
        self.set_response(method, value);
        self
    }

    /// Make a method fail
    pub fn fail_with(&self, method: impl Into<String>, message: impl Into<String>) {
        self.failures.insert(method.into(), message.into());
    }

    /// Number of times a method was executed
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.method == method).count()
    }

    /// Total number of executions
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every call received, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChainBackend for MemoryBackend {
    fn chain(&self) -> ChainType {
        self.chain
    }

    async fn call(&self, call: BackendCall) -> Result<Value> {
        debug!(chain = %self.chain, method = %call.method, origin = %call.origin, "Backend call");
        let method = call.method.clone();
        self.calls.lock().push(call);

        if let Some(message) = self.failures.get(&method) {
            return Err(ProviderError::Chain(message.clone()));
        }
        self.responses
            .get(&method)
            .map(|v| v.clone())
            .ok_or_else(|| ProviderError::Chain(format!("no response configured for {}", method)))
    }
}
