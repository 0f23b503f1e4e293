//! Error types for the dApp provider
//!
//! Every failure a caller can observe is a [`ProviderError`]. Variants map to a
//! fixed wire code via [`ProviderError::code`] and to one of the coarse
//! [`ErrorCategory`] buckets used for logging and metrics.

use crate::typed_data::TypedDataError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Wire codes surfaced to callers
pub mod codes {
    /// The user declined or dismissed the approval
    pub const USER_REJECTED: i64 = 4001;
    /// The caller is not permitted to perform this call
    pub const UNAUTHORIZED: i64 = 4100;
    /// Another approval for the same route is already open
    pub const DUPLICATE_REQUEST: i64 = -32002;
    /// The request waited too long for the approval surface
    pub const REQUEST_TIMEOUT: i64 = -32008;
    /// Unknown method
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Malformed parameters or payload
    pub const INVALID_PARAMS: i64 = -32602;
    /// Anything else
    pub const INTERNAL: i64 = -32603;
}

/// Coarse classification of provider errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Unauthorized, hardware-restricted, wrong network, spam block
    Policy,
    /// Malformed payload or unknown method
    Validation,
    /// Explicit decline or popup dismissal
    UserRejection,
    /// Duplicate route or queue timeout
    Coordination,
    /// Collaborator or internal failure
    Internal,
}

/// Errors that can occur while authorizing and dispatching a dApp call
#[derive(Debug, Error)]
pub enum ProviderError {
    // ============ Policy Errors ============
    /// Caller origin has no connection to the wallet
    #[error("unauthorized: not connected")]
    NotConnected,

    /// Method needs a different chain family than the active one
    #[error("unauthorized: wrong network type")]
    WrongNetwork,

    /// Method cannot be performed by the active hardware signer
    #[error("unauthorized: method {0} is not supported by hardware wallets")]
    HardwareRestricted(String),

    /// Origin is temporarily blocked; rendered like a generic denial
    #[error("unauthorized: request not permitted")]
    OriginBlocked,

    /// Generic authorization failure
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // ============ User Decisions ============
    /// User declined the approval or closed the window
    #[error("user rejected the request: {0}")]
    UserRejected(String),

    /// User cancelled the login prompt
    #[error("authentication cancelled")]
    AuthenticationCancelled,

    // ============ Validation Errors ============
    /// Method is not in the registry
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters are missing or malformed
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Structured signable payload failed validation
    #[error("invalid params: {0}")]
    InvalidTypedData(#[from] TypedDataError),

    // ============ Coordination Errors ============
    /// An approval for the same route is already open
    #[error("duplicate request: an approval for {0} is already open")]
    DuplicateRequest(String),

    /// Request was queued for longer than the queue timeout
    #[error("request timed out waiting for approval: {0}")]
    RequestTimeout(String),

    /// Drained request must be re-run from scratch. Never surfaced.
    #[doc(hidden)]
    #[error("request replay")]
    Replay {
        /// When the request first joined the approval queue
        queued_at: Instant,
    },

    // ============ Collaborator / Internal Errors ============
    /// The approval surface could not be opened
    #[error("popup unavailable: {0}")]
    PopupUnavailable(String),

    /// A popup event was resolved twice or never opened
    #[error("popup not pending: {0}")]
    PopupNotPending(String),

    /// The chain backend failed
    #[error("chain error: {0}")]
    Chain(String),

    /// Invalid provider configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Get the wire code for this error
    pub fn code(&self) -> i64 {
        match self {
            ProviderError::NotConnected
            | ProviderError::WrongNetwork
            | ProviderError::HardwareRestricted(_)
            | ProviderError::OriginBlocked
            | ProviderError::Unauthorized(_) => codes::UNAUTHORIZED,
            ProviderError::UserRejected(_) | ProviderError::AuthenticationCancelled => {
                codes::USER_REJECTED
            }
            ProviderError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            ProviderError::InvalidParams(_) | ProviderError::InvalidTypedData(_) => {
                codes::INVALID_PARAMS
            }
            ProviderError::DuplicateRequest(_) => codes::DUPLICATE_REQUEST,
            ProviderError::RequestTimeout(_) => codes::REQUEST_TIMEOUT,
            ProviderError::Replay { .. }
            | ProviderError::PopupUnavailable(_)
            | ProviderError::PopupNotPending(_)
            | ProviderError::Chain(_)
            | ProviderError::InvalidConfig(_)
            | ProviderError::Internal(_) => codes::INTERNAL,
        }
    }

    /// Get the taxonomy bucket for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::NotConnected
            | ProviderError::WrongNetwork
            | ProviderError::HardwareRestricted(_)
            | ProviderError::OriginBlocked
            | ProviderError::Unauthorized(_) => ErrorCategory::Policy,
            ProviderError::UserRejected(_) | ProviderError::AuthenticationCancelled => {
                ErrorCategory::UserRejection
            }
            ProviderError::MethodNotFound(_)
            | ProviderError::InvalidParams(_)
            | ProviderError::InvalidTypedData(_) => ErrorCategory::Validation,
            ProviderError::DuplicateRequest(_)
            | ProviderError::RequestTimeout(_)
            | ProviderError::Replay { .. } => ErrorCategory::Coordination,
            ProviderError::PopupUnavailable(_)
            | ProviderError::PopupNotPending(_)
            | ProviderError::Chain(_)
            | ProviderError::InvalidConfig(_)
            | ProviderError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if the caller may reasonably try again later.
    ///
    /// Only a queue timeout qualifies. Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RequestTimeout(_))
    }

    /// Coordination outcomes must pass through policy stages untouched
    pub(crate) fn is_coordination(&self) -> bool {
        self.category() == ErrorCategory::Coordination
    }

    /// Variant name, used as the `name` of an [`ErrorReport`]
    pub fn name(&self) -> &'static str {
        match self {
            ProviderError::NotConnected => "NotConnected",
            ProviderError::WrongNetwork => "WrongNetwork",
            ProviderError::HardwareRestricted(_) => "HardwareRestricted",
            ProviderError::OriginBlocked => "OriginBlocked",
            ProviderError::Unauthorized(_) => "Unauthorized",
            ProviderError::UserRejected(_) => "UserRejected",
            ProviderError::AuthenticationCancelled => "AuthenticationCancelled",
            ProviderError::MethodNotFound(_) => "MethodNotFound",
            ProviderError::InvalidParams(_) => "InvalidParams",
            ProviderError::InvalidTypedData(_) => "InvalidTypedData",
            ProviderError::DuplicateRequest(_) => "DuplicateRequest",
            ProviderError::RequestTimeout(_) => "RequestTimeout",
            ProviderError::Replay { .. } => "Replay",
            ProviderError::PopupUnavailable(_) => "PopupUnavailable",
            ProviderError::PopupNotPending(_) => "PopupNotPending",
            ProviderError::Chain(_) => "Chain",
            ProviderError::InvalidConfig(_) => "InvalidConfig",
            ProviderError::Internal(_) => "Internal",
        }
    }

    /// Build a loggable report of this error
    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.name(), self)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidParams(err.to_string())
    }
}

/// Error summary for cross-boundary logging.
///
/// Never placed in the outgoing envelope; callers only see `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error type name
    pub name: String,
    /// Top-level message
    pub message: String,
    /// Source chain, one cause per line
    pub stack: String,
}

impl ErrorReport {
    /// Build a report from any error, walking its source chain
    pub fn new(name: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            name: name.into(),
            message: err.to_string(),
            stack: causes.join("\n"),
        }
    }
}
