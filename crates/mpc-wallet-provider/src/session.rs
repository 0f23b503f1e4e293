//! Wallet session and connection state
//!
//! The provider never owns wallet state. It reads snapshots through
//! [`WalletSession`] and [`ConnectionStore`], and only writes through their
//! explicit transition methods after the user approves a popup.

use crate::{Account, ChainType, ConnectionRecord, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default chain identifier reported for a chain family
pub fn default_chain_id(chain: ChainType) -> &'static str {
    match chain {
        ChainType::Evm => "0x1",
        ChainType::Solana => "solana:mainnet",
    }
}

/// Point-in-time view of the wallet session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Wallet is locked
    pub locked: bool,
    /// A network switch is in progress
    pub switching_network: bool,
    /// Active chain family
    pub chain: ChainType,
    /// Active chain identifier
    pub chain_id: String,
    /// Active account
    pub account: Option<Account>,
}

impl SessionSnapshot {
    /// Create an unlocked snapshot on the given chain
    pub fn new(chain: ChainType, account: Option<Account>) -> Self {
        Self {
            locked: false,
            switching_network: false,
            chain,
            chain_id: default_chain_id(chain).to_string(),
            account,
        }
    }
}

/// Read access to the wallet session, plus user-approved transitions
pub trait WalletSession: Send + Sync {
    /// Wallet is locked
    fn is_locked(&self) -> bool;

    /// A network switch is in progress
    fn is_switching_network(&self) -> bool;

    /// Active chain family
    fn active_chain(&self) -> ChainType;

    /// Active chain identifier
    fn chain_id(&self) -> String;

    /// Active account
    fn active_account(&self) -> Option<Account>;

    /// Active signer is a hardware device
    fn is_hardware_signer(&self) -> bool {
        self.active_account().is_some_and(|a| a.is_hardware())
    }

    /// Full snapshot
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            locked: self.is_locked(),
            switching_network: self.is_switching_network(),
            chain: self.active_chain(),
            chain_id: self.chain_id(),
            account: self.active_account(),
        }
    }

    /// Unlock after the user logged in
    fn apply_unlock(&self) -> Result<()>;

    /// Switch network after the user approved it
    fn apply_chain(&self, chain: ChainType, chain_id: Option<String>) -> Result<()>;

    /// Switch account after the user approved it
    fn apply_account(&self, account: Account) -> Result<()>;
}

/// In-memory session, for tests and simulation
#[derive(Debug)]
pub struct MemorySession {
    state: RwLock<SessionSnapshot>,
}

impl MemorySession {
    /// Create an unlocked session on the given chain
    pub fn new(chain: ChainType, account: Option<Account>) -> Self {
        Self::from_snapshot(SessionSnapshot::new(chain, account))
    }

    /// Create a session from a snapshot
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Lock the wallet
    pub fn lock(&self) {
        self.state.write().locked = true;
    }

    /// Mark a network switch as in progress
    pub fn begin_network_switch(&self) {
        self.state.write().switching_network = true;
    }

    /// Mark the network switch as finished
    pub fn finish_network_switch(&self) {
        self.state.write().switching_network = false;
    }

    /// Change the active account without a prompt
    pub fn set_account(&self, account: Option<Account>) {
        self.state.write().account = account;
    }

    /// Change the active chain without a prompt
    pub fn set_chain(&self, chain: ChainType) {
        let mut state = self.state.write();
        state.chain = chain;
        state.chain_id = default_chain_id(chain).to_string();
    }
}

impl WalletSession for MemorySession {
    fn is_locked(&self) -> bool {
        self.state.read().locked
    }

    fn is_switching_network(&self) -> bool {
        self.state.read().switching_network
    }

    fn active_chain(&self) -> ChainType {
        self.state.read().chain
    }

    fn chain_id(&self) -> String {
        self.state.read().chain_id.clone()
    }

    fn active_account(&self) -> Option<Account> {
        self.state.read().account.clone()
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    fn apply_unlock(&self) -> Result<()> {
        self.state.write().locked = false;
        Ok(())
    }

    fn apply_chain(&self, chain: ChainType, chain_id: Option<String>) -> Result<()> {
        let mut state = self.state.write();
        state.chain = chain;
        state.chain_id = chain_id.unwrap_or_else(|| default_chain_id(chain).to_string());
        state.switching_network = false;
        Ok(())
    }

    fn apply_account(&self, account: Account) -> Result<()> {
        self.state.write().account = Some(account);
        Ok(())
    }
}

/// Origin connection records
pub trait ConnectionStore: Send + Sync {
    /// Connection record for an origin
    fn get(&self, origin: &str) -> Option<ConnectionRecord>;

    /// Check if an origin is connected
    fn is_connected(&self, origin: &str) -> bool {
        self.get(origin).is_some()
    }

    /// Record a connection, replacing any previous one for the origin
    fn connect(&self, record: ConnectionRecord) -> Result<()>;

    /// Remove an origin's connection
    fn disconnect(&self, origin: &str) -> Option<ConnectionRecord>;

    /// All connections
    fn list(&self) -> Vec<ConnectionRecord>;
}

/// In-memory connection store keyed by origin
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    connections: DashMap<String, ConnectionRecord>,
}

impl MemoryConnectionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connected origins
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no origin is connected
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl ConnectionStore for MemoryConnectionStore {
    fn get(&self, origin: &str) -> Option<ConnectionRecord> {
        self.connections.get(origin).map(|r| r.clone())
    }

    fn connect(&self, record: ConnectionRecord) -> Result<()> {
        self.connections.insert(record.caller_origin.clone(), record);
        Ok(())
    }

    fn disconnect(&self, origin: &str) -> Option<ConnectionRecord> {
        self.connections.remove(origin).map(|(_, record)| record)
    }

    fn list(&self) -> Vec<ConnectionRecord> {
        let mut records: Vec<_> = self.connections.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        records
    }
}
