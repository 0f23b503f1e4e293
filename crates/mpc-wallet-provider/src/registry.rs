//! Method Registry
//!
//! Declarative table of every method a dApp may call, with the policy
//! attributes the pipeline enforces for it. The table is static; helper
//! queries filter it on demand.
//!
//! ## Namespaces
//!
//! - **Internal**: bare commands used by the injected provider script
//!   (`ping`, `getVersion`, ...)
//! - **Wallet**: chain-agnostic wallet calls (`wallet_*`)
//! - **EVM**: Ethereum provider calls (`eth_*`, `personal_sign`, ...)
//! - **Solana**: Solana wallet-standard calls (`solana_*`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_wallet_provider::registry;
//!
//! let config = registry::lookup("eth_sendTransaction")?;
//! assert!(config.has_approval_popup());
//! assert!(config.is_blocking_operation);
//! ```

use crate::popup::PopupRoute;
use crate::{ChainType, ProviderError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Handler family a method is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Provider-internal commands
    Internal,
    /// Chain-agnostic wallet calls
    Wallet,
    /// EVM chain calls
    Evm,
    /// Solana chain calls
    Solana,
}

impl Namespace {
    /// Get all namespaces
    pub fn all() -> [Namespace; 4] {
        [
            Namespace::Internal,
            Namespace::Wallet,
            Namespace::Evm,
            Namespace::Solana,
        ]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Internal => write!(f, "internal"),
            Namespace::Wallet => write!(f, "wallet"),
            Namespace::Evm => write!(f, "evm"),
            Namespace::Solana => write!(f, "solana"),
        }
    }
}

/// Chain family a method needs to be active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkRequirement {
    /// Works on any chain family
    Any,
    /// Needs an EVM network active
    Evm,
    /// Needs a Solana network active
    Solana,
}

impl NetworkRequirement {
    /// The chain family required, if any
    pub fn required_chain(&self) -> Option<ChainType> {
        match self {
            NetworkRequirement::Any => None,
            NetworkRequirement::Evm => Some(ChainType::Evm),
            NetworkRequirement::Solana => Some(ChainType::Solana),
        }
    }

    /// Check if the given chain satisfies this requirement
    pub fn is_satisfied_by(&self, chain: ChainType) -> bool {
        self.required_chain().is_none_or(|required| required == chain)
    }
}

/// Approval popup attached to a method.
///
/// Route and event name travel together, so a method either has both or
/// neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupSpec {
    /// Popup flow to open
    pub route: PopupRoute,
    /// Event the popup fires when the user decides
    pub event_name: &'static str,
}

/// Read-result caching for a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    /// Cache key prefix
    pub key: &'static str,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
}

/// Caller-supplied payload that must be validated before any prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadKind {
    /// EIP-712 style typed data (domain + types + message)
    TypedData {
        /// Parameter index holding the payload
        param: usize,
    },
    /// Plain signable message (text or hex)
    Message {
        /// Parameter index holding the payload
        param: usize,
    },
}

impl PayloadKind {
    /// Parameter index holding the payload
    pub fn param(&self) -> usize {
        match self {
            PayloadKind::TypedData { param } | PayloadKind::Message { param } => *param,
        }
    }
}

/// Policy attributes of one method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    /// Method name as sent by the caller
    pub name: &'static str,
    /// Handler family
    pub namespace: Namespace,
    /// Wallet must be unlocked
    pub requires_authentication: bool,
    /// Origin must be connected
    pub requires_connection: bool,
    /// Permitted while a hardware signer is active
    pub allowed_for_hardware_wallet: bool,
    /// Chain family that must be active
    pub network: NetworkRequirement,
    /// Approval popup, if the method has one
    pub popup: Option<PopupSpec>,
    /// Closing the popup counts as an explicit rejection
    pub requires_explicit_accept: bool,
    /// Active account must match the connected account
    pub is_blocking_operation: bool,
    /// Structured payload to validate up front
    pub payload: Option<PayloadKind>,
    /// Read-result caching
    pub cache: Option<CachePolicy>,
}

impl MethodConfig {
    /// Create a method with permissive defaults
    pub const fn new(name: &'static str, namespace: Namespace) -> Self {
        Self {
            name,
            namespace,
            requires_authentication: false,
            requires_connection: false,
            allowed_for_hardware_wallet: true,
            network: NetworkRequirement::Any,
            popup: None,
            requires_explicit_accept: false,
            is_blocking_operation: false,
            payload: None,
            cache: None,
        }
    }

    /// Require an unlocked wallet
    pub const fn authenticated(mut self) -> Self {
        self.requires_authentication = true;
        self
    }

    /// Require a connected origin (implies authentication)
    pub const fn connected(mut self) -> Self {
        self.requires_connection = true;
        self.requires_authentication = true;
        self
    }

    /// Forbid while a hardware signer is active
    pub const fn no_hardware(mut self) -> Self {
        self.allowed_for_hardware_wallet = false;
        self
    }

    /// Require a chain family
    pub const fn on(mut self, network: NetworkRequirement) -> Self {
        self.network = network;
        self
    }

    /// Attach an approval popup
    pub const fn popup(mut self, route: PopupRoute, event_name: &'static str) -> Self {
        self.popup = Some(PopupSpec { route, event_name });
        self
    }

    /// Treat popup dismissal as an explicit rejection
    pub const fn explicit(mut self) -> Self {
        self.requires_explicit_accept = true;
        self
    }

    /// Mark as a blocking operation (requires connection)
    pub const fn blocking(mut self) -> Self {
        self.is_blocking_operation = true;
        self.requires_connection = true;
        self.requires_authentication = true;
        self
    }

    /// Validate a caller-supplied payload before prompting
    pub const fn payload(mut self, kind: PayloadKind) -> Self {
        self.payload = Some(kind);
        self
    }

    /// Cache read results
    pub const fn cached(mut self, key: &'static str, ttl_ms: u64) -> Self {
        self.cache = Some(CachePolicy { key, ttl_ms });
        self
    }

    /// Check if the method opens its own approval popup
    pub fn has_approval_popup(&self) -> bool {
        self.popup.is_some()
    }

    /// Popup route, if any
    pub fn popup_route(&self) -> Option<PopupRoute> {
        self.popup.map(|p| p.route)
    }

    /// Popup event name, if any
    pub fn popup_event_name(&self) -> Option<&'static str> {
        self.popup.map(|p| p.event_name)
    }

    /// Cache key prefix, if cacheable
    pub fn cache_key(&self) -> Option<&'static str> {
        self.cache.map(|c| c.key)
    }

    /// Cache TTL in milliseconds, if cacheable
    pub fn cache_ttl_ms(&self) -> Option<u64> {
        self.cache.map(|c| c.ttl_ms)
    }
}

use Namespace::{Evm, Internal, Solana, Wallet};

const EVM: NetworkRequirement = NetworkRequirement::Evm;
const SOLANA: NetworkRequirement = NetworkRequirement::Solana;

/// The method table
pub static METHODS: &[MethodConfig] = &[
    // ============ Internal ============
    MethodConfig::new("ping", Internal),
    MethodConfig::new("getVersion", Internal).cached("internal:version", 60_000),
    MethodConfig::new("getProviderState", Internal),
    MethodConfig::new("getSupportedMethods", Internal).cached("internal:methods", 60_000),
    // ============ Wallet ============
    MethodConfig::new("wallet_connect", Wallet)
        .authenticated()
        .popup(PopupRoute::Connect, "wallet_connect_response")
        .explicit(),
    MethodConfig::new("wallet_disconnect", Wallet),
    MethodConfig::new("wallet_getPermissions", Wallet),
    MethodConfig::new("wallet_getAccount", Wallet).connected(),
    MethodConfig::new("wallet_getNetwork", Wallet),
    MethodConfig::new("wallet_switchNetwork", Wallet)
        .authenticated()
        .popup(PopupRoute::SwitchNetwork, "wallet_switch_network_response")
        .explicit(),
    MethodConfig::new("wallet_getBalance", Wallet)
        .connected()
        .cached("wallet:balance", 10_000),
    // ============ EVM ============
    MethodConfig::new("eth_requestAccounts", Evm)
        .authenticated()
        .popup(PopupRoute::Connect, "eth_request_accounts_response")
        .explicit(),
    MethodConfig::new("eth_accounts", Evm),
    MethodConfig::new("eth_chainId", Evm).cached("evm:chainId", 5_000),
    MethodConfig::new("net_version", Evm).cached("evm:netVersion", 5_000),
    MethodConfig::new("eth_blockNumber", Evm).cached("evm:blockNumber", 2_000),
    MethodConfig::new("eth_gasPrice", Evm).cached("evm:gasPrice", 5_000),
    MethodConfig::new("eth_getBalance", Evm).cached("evm:balance", 10_000),
    MethodConfig::new("eth_getTransactionCount", Evm),
    MethodConfig::new("eth_getTransactionReceipt", Evm),
    MethodConfig::new("eth_call", Evm),
    MethodConfig::new("eth_estimateGas", Evm).connected().on(EVM),
    MethodConfig::new("eth_sendTransaction", Evm)
        .blocking()
        .on(EVM)
        .popup(PopupRoute::SendTransaction, "eth_send_transaction_response")
        .explicit(),
    MethodConfig::new("personal_sign", Evm)
        .blocking()
        .on(EVM)
        .popup(PopupRoute::SignMessage, "personal_sign_response")
        .explicit()
        .payload(PayloadKind::Message { param: 0 }),
    MethodConfig::new("eth_sign", Evm)
        .blocking()
        .on(EVM)
        .no_hardware()
        .popup(PopupRoute::SignMessage, "eth_sign_response")
        .explicit()
        .payload(PayloadKind::Message { param: 1 }),
    MethodConfig::new("eth_signTypedData_v4", Evm)
        .blocking()
        .on(EVM)
        .popup(PopupRoute::SignTypedData, "eth_sign_typed_data_v4_response")
        .explicit()
        .payload(PayloadKind::TypedData { param: 1 }),
    MethodConfig::new("eth_signTypedData_v3", Evm)
        .blocking()
        .on(EVM)
        .no_hardware()
        .popup(PopupRoute::SignTypedData, "eth_sign_typed_data_v3_response")
        .explicit()
        .payload(PayloadKind::TypedData { param: 1 }),
    MethodConfig::new("eth_signTypedData", Evm)
        .blocking()
        .on(EVM)
        .no_hardware()
        .popup(PopupRoute::SignTypedData, "eth_sign_typed_data_response")
        .explicit(),
    MethodConfig::new("wallet_switchEthereumChain", Evm)
        .authenticated()
        .popup(PopupRoute::SwitchNetwork, "wallet_switch_ethereum_chain_response")
        .explicit(),
    MethodConfig::new("wallet_addEthereumChain", Evm)
        .authenticated()
        .popup(PopupRoute::AddChain, "wallet_add_ethereum_chain_response")
        .explicit(),
    MethodConfig::new("wallet_watchAsset", Evm)
        .connected()
        .on(EVM)
        .popup(PopupRoute::WatchAsset, "wallet_watch_asset_response")
        .explicit(),
    // ============ Solana ============
    MethodConfig::new("solana_connect", Solana)
        .authenticated()
        .popup(PopupRoute::Connect, "solana_connect_response")
        .explicit(),
    MethodConfig::new("solana_disconnect", Solana),
    MethodConfig::new("solana_getAccount", Solana).connected(),
    MethodConfig::new("solana_getBalance", Solana).cached("solana:balance", 10_000),
    MethodConfig::new("solana_getLatestBlockhash", Solana).cached("solana:blockhash", 1_000),
    MethodConfig::new("solana_signMessage", Solana)
        .blocking()
        .on(SOLANA)
        .popup(PopupRoute::SignMessage, "solana_sign_message_response")
        .explicit()
        .payload(PayloadKind::Message { param: 0 }),
    MethodConfig::new("solana_signTransaction", Solana)
        .blocking()
        .on(SOLANA)
        .popup(PopupRoute::SignTransaction, "solana_sign_transaction_response")
        .explicit(),
    MethodConfig::new("solana_signAllTransactions", Solana)
        .blocking()
        .on(SOLANA)
        .no_hardware()
        .popup(PopupRoute::SignTransaction, "solana_sign_all_transactions_response")
        .explicit(),
    MethodConfig::new("solana_signAndSendTransaction", Solana)
        .blocking()
        .on(SOLANA)
        .popup(PopupRoute::SendTransaction, "solana_sign_and_send_transaction_response")
        .explicit(),
    MethodConfig::new("solana_signIn", Solana)
        .authenticated()
        .on(SOLANA)
        .no_hardware()
        .popup(PopupRoute::SignIn, "solana_sign_in_response")
        .explicit(),
];

/// Get the full method table
pub fn all() -> &'static [MethodConfig] {
    METHODS
}

/// Look up a method by name
pub fn get(name: &str) -> Option<&'static MethodConfig> {
    METHODS.iter().find(|m| m.name == name)
}

/// Look up a method by name, failing with `MethodNotFound`
pub fn lookup(name: &str) -> Result<&'static MethodConfig> {
    get(name).ok_or_else(|| ProviderError::MethodNotFound(name.to_string()))
}

/// Check if a method is registered
pub fn contains(name: &str) -> bool {
    get(name).is_some()
}

/// All registered method names, in table order
pub fn names() -> Vec<&'static str> {
    METHODS.iter().map(|m| m.name).collect()
}

fn filtered(predicate: impl Fn(&MethodConfig) -> bool) -> Vec<&'static MethodConfig> {
    METHODS.iter().filter(|m| predicate(m)).collect()
}

/// Methods that open their own approval popup
pub fn popup_methods() -> Vec<&'static MethodConfig> {
    filtered(MethodConfig::has_approval_popup)
}

/// Methods forbidden while a hardware signer is active
pub fn hardware_restricted_methods() -> Vec<&'static MethodConfig> {
    filtered(|m| !m.allowed_for_hardware_wallet)
}

/// Methods permitted while a hardware signer is active
pub fn hardware_allowed_methods() -> Vec<&'static MethodConfig> {
    filtered(|m| m.allowed_for_hardware_wallet)
}

/// Methods routed to one namespace
pub fn by_namespace(namespace: Namespace) -> Vec<&'static MethodConfig> {
    filtered(|m| m.namespace == namespace)
}

/// Methods that require the connected account to be active
pub fn blocking_methods() -> Vec<&'static MethodConfig> {
    filtered(|m| m.is_blocking_operation)
}

/// Methods whose results are cached
pub fn cacheable_methods() -> Vec<&'static MethodConfig> {
    filtered(|m| m.cache.is_some())
}

/// Methods that require a connected origin
pub fn connection_required_methods() -> Vec<&'static MethodConfig> {
    filtered(|m| m.requires_connection)
}

/// Check the table's structural invariants
pub fn validate() -> Result<()> {
    validate_table(METHODS)
}

/// Check structural invariants of an arbitrary method table
pub fn validate_table(methods: &[MethodConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for method in methods {
        if !seen.insert(method.name) {
            return Err(ProviderError::InvalidConfig(format!(
                "duplicate method in registry: {}",
                method.name
            )));
        }
        if let Some(popup) = method.popup {
            if popup.event_name.is_empty() {
                return Err(ProviderError::InvalidConfig(format!(
                    "{} has a popup without an event name",
                    method.name
                )));
            }
        } else if method.requires_explicit_accept {
            return Err(ProviderError::InvalidConfig(format!(
                "{} requires an explicit accept but has no popup",
                method.name
            )));
        }
        if let Some(cache) = method.cache {
            if cache.ttl_ms == 0 {
                return Err(ProviderError::InvalidConfig(format!(
                    "{} has a zero cache TTL",
                    method.name
                )));
            }
            if method.has_approval_popup() {
                return Err(ProviderError::InvalidConfig(format!(
                    "{} caches results of an approval flow",
                    method.name
                )));
            }
        }
        if method.is_blocking_operation && !method.requires_connection {
            return Err(ProviderError::InvalidConfig(format!(
                "{} is blocking but does not require a connection",
                method.name
            )));
        }
    }
    Ok(())
}
