//! Core types for the dApp provider
//!
//! Chain families, accounts, connection records and the JSON-RPC style
//! envelopes exchanged with the caller's transport channel.

use crate::ProviderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Supported chain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Ethereum and EVM-compatible chains (account model)
    Evm,
    /// Solana
    Solana,
}

impl ChainType {
    /// Get all chain families
    pub fn all() -> [ChainType; 2] {
        [ChainType::Evm, ChainType::Solana]
    }

    /// Lowercase identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Evm => "evm",
            ChainType::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::Evm => write!(f, "EVM"),
            ChainType::Solana => write!(f, "Solana"),
        }
    }
}

impl FromStr for ChainType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" | "ethereum" => Ok(ChainType::Evm),
            "solana" | "sol" => Ok(ChainType::Solana),
            other => Err(ProviderError::InvalidParams(format!(
                "unknown chain type: {}",
                other
            ))),
        }
    }
}

/// How an account's key material is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Threshold-shared key held by the wallet
    #[default]
    Mpc,
    /// Imported single key
    Imported,
    /// External hardware signer
    Hardware,
}

/// A wallet account that can be exposed to an origin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier (address or public key)
    pub id: String,
    /// Key custody kind
    #[serde(default)]
    pub kind: AccountKind,
}

impl Account {
    /// Create a new account
    pub fn new(id: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Check if this account is backed by a hardware signer
    pub fn is_hardware(&self) -> bool {
        self.kind == AccountKind::Hardware
    }
}

/// Record of an origin that the user connected to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Caller origin (host string)
    pub caller_origin: String,
    /// Connected account identifier
    pub connected_account_id: String,
    /// Connected account kind
    pub connected_account_type: AccountKind,
    /// When the connection was approved
    pub connected_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Create a connection record stamped with the current time
    pub fn new(origin: impl Into<String>, account: &Account) -> Self {
        Self {
            caller_origin: origin.into(),
            connected_account_id: account.id.clone(),
            connected_account_type: account.kind,
            connected_at: Utc::now(),
        }
    }

    /// The connected account
    pub fn account(&self) -> Account {
        Account::new(&self.connected_account_id, self.connected_account_type)
    }
}

/// Incoming call envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Caller-chosen request ID, echoed back in the response
    pub id: Value,
    /// Caller origin
    #[serde(rename = "callerOrigin", alias = "origin")]
    pub origin: String,
    /// Method name
    pub method: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Create a new request
    pub fn new(
        id: impl Into<Value>,
        origin: impl Into<String>,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Wire code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

impl From<&ProviderError> for RpcErrorObject {
    fn from(err: &ProviderError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Success or failure payload of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    /// Call succeeded
    Result(Value),
    /// Call failed
    Error(RpcErrorObject),
}

/// Outgoing result envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Request ID this response answers
    pub id: Value,
    /// Result or error
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Result(result),
        }
    }

    /// Create an error response
    pub fn failure(id: Value, err: &ProviderError) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Error(err.into()),
        }
    }

    /// Get the result, if successful
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            RpcOutcome::Result(value) => Some(value),
            RpcOutcome::Error(_) => None,
        }
    }

    /// Get the error, if failed
    pub fn error(&self) -> Option<&RpcErrorObject> {
        match &self.outcome {
            RpcOutcome::Result(_) => None,
            RpcOutcome::Error(err) => Some(err),
        }
    }

    /// Check if the call succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Result(_))
    }
}
