//! # MPC Wallet dApp Provider
//!
//! Request authorization and approval coordination for calls that connected
//! web applications make against the wallet.
//!
//! ## Features
//!
//! - **Method Registry**: Static per-method security and UX configuration
//! - **Policy Pipeline**: Eight ordered checks run before any call executes
//! - **Approval Coordination**: One approval popup at a time, with a queue,
//!   duplicate rejection and a bounded wait
//! - **Namespace Dispatch**: Internal, wallet, EVM and Solana handlers with
//!   a TTL cache for reads
//! - **Typed Data Validation**: Structural checks on EIP-712 payloads
//!
//! ## Request Flow
//!
//! ```text
//! dApp ──► WalletProvider ──► Pipeline (8 stages) ──► Dispatcher ──► Backend
//!               │                    │
//!               │                    ▼
//!               │            ApprovalCoordinator ──► Popup ──► User
//!               │                    │                          │
//!               │                    ◄──────────────────────────┘
//!               ▼
//!        { id, result | error }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mpc_wallet_provider::{
//!     Account, AccountKind, ChainType, ProviderConfig, RpcRequest, WalletProvider,
//!     backend::MemoryBackend, popup::ChannelPopupHost, session::MemorySession,
//! };
//! use std::sync::Arc;
//!
//! let (host, mut popups) = ChannelPopupHost::new();
//! let session = Arc::new(MemorySession::new(
//!     ChainType::Evm,
//!     Some(Account::new("0xabc...", AccountKind::Mpc)),
//! ));
//!
//! let provider = WalletProvider::builder()
//!     .config(ProviderConfig::default())
//!     .session(session)
//!     .popup_host(host)
//!     .backend(Arc::new(MemoryBackend::with_defaults(ChainType::Evm)))
//!     .build()?;
//!
//! let response = provider
//!     .request(RpcRequest::new(1, "https://app.example", "eth_chainId", vec![]))
//!     .await;
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod popup;
pub mod provider;
pub mod registry;
pub mod session;
pub mod spam;
pub mod typed_data;
pub mod types;

pub use backend::{BackendCall, ChainBackend, MemoryBackend};
pub use config::{ProviderConfig, SpamConfig};
pub use context::RequestContext;
pub use coordinator::{ApprovalCoordinator, ApprovalService};
pub use dispatch::{MethodDispatcher, MethodHandler, ResponseCache};
pub use error::{ErrorCategory, ErrorReport, ProviderError, Result, codes};
pub use network::NetworkGate;
pub use pipeline::{Endpoint, Middleware, Next, Pipeline};
pub use popup::{PopupBroker, PopupHandle, PopupHost, PopupOutcome, PopupRequest, PopupRoute};
pub use provider::{WalletProvider, WalletProviderBuilder};
pub use registry::{MethodConfig, Namespace, NetworkRequirement};
pub use session::{ConnectionStore, MemoryConnectionStore, MemorySession, WalletSession};
pub use spam::{SpamTracker, SpamVerdict};
pub use typed_data::{TypedData, TypedDataError};
pub use types::*;

/// Crate version, reported by `getVersion`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
