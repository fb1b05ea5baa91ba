/*
[INPUT]:  Error sources (provider RPC, verifier HTTP, storage, lifecycle preconditions)
[OUTPUT]: Structured error types grouped by kind with recovery hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

use crate::types::{ChainNamespace, ConnectorStatus};

/// EIP-1193 "user rejected request" code.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Coarse grouping of [`ConnectError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing provider, bad configuration, unsupported namespace
    Initialization,
    /// Rejected/cancelled connections and lifecycle precondition failures
    Login,
    /// Signature, verification, and token failures
    Auth,
    /// Plugin precondition failures
    Plugin,
    /// Transport and serialization failures
    Transport,
}

/// Main error type for walletgate connectors
#[derive(Error, Debug)]
pub enum ConnectError {
    // Initialization
    /// Wallet provider is not installed or could not be created
    #[error("Wallet provider not found: {0}")]
    ProviderNotFound(String),

    /// Configuration or call parameters are invalid
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Namespace cannot be used for the requested operation
    #[error("Invalid chain namespace: {0}")]
    InvalidNamespace(ChainNamespace),

    /// Connector name is not registered
    #[error("Unknown connector: {0}")]
    UnknownConnector(String),

    /// Connector name registered twice
    #[error("Connector already registered: {0}")]
    DuplicateConnector(String),

    // Login
    /// Connector must be initialized first
    #[error("Connector {connector} is not ready (status {status:?})")]
    NotReady {
        connector: String,
        status: ConnectorStatus,
    },

    /// A transition is already in flight on this connector
    #[error("Connector {connector} is busy: {status:?} in progress")]
    Busy {
        connector: String,
        status: ConnectorStatus,
    },

    /// Operation requires a connected session
    #[error("Not connected")]
    NotConnected,

    /// Another connector holds the active slot
    #[error("Already connected to {active}")]
    AlreadyConnected { active: String },

    /// User cancelled or wallet refused the connection
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    /// Provider could not be disconnected cleanly
    #[error("Disconnection failed: {0}")]
    DisconnectionFailed(String),

    // Auth
    /// User declined the signature prompt
    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    /// Verification service refused or failed the challenge
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Identity token is past its expiry
    #[error("Identity token expired, please re-authenticate")]
    TokenExpired,

    /// Identity token could not be decoded
    #[error("Invalid identity token: {0}")]
    InvalidToken(String),

    // Plugin
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin {0} is not initialized")]
    PluginNotInitialized(String),

    #[error("Plugin {0} is not connected")]
    PluginNotConnected(String),

    // Transport
    /// Provider answered a request with an error
    #[error("Provider RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    /// Operation not offered by this connector
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Persistent store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::ProviderNotFound(_)
            | ConnectError::InvalidParams(_)
            | ConnectError::InvalidNamespace(_)
            | ConnectError::UnknownConnector(_)
            | ConnectError::DuplicateConnector(_) => ErrorKind::Initialization,
            ConnectError::NotReady { .. }
            | ConnectError::Busy { .. }
            | ConnectError::NotConnected
            | ConnectError::AlreadyConnected { .. }
            | ConnectError::ConnectionRejected(_)
            | ConnectError::DisconnectionFailed(_) => ErrorKind::Login,
            ConnectError::SignatureRejected(_)
            | ConnectError::VerificationFailed(_)
            | ConnectError::TokenExpired
            | ConnectError::InvalidToken(_) => ErrorKind::Auth,
            ConnectError::PluginNotFound(_)
            | ConnectError::PluginNotInitialized(_)
            | ConnectError::PluginNotConnected(_) => ErrorKind::Plugin,
            ConnectError::Rpc { .. }
            | ConnectError::Unsupported(_)
            | ConnectError::Storage(_)
            | ConnectError::Http(_)
            | ConnectError::Serialization(_)
            | ConnectError::UrlParse(_) => ErrorKind::Transport,
        }
    }

    /// Auth failures are cured by running the challenge flow again.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Check if the user declined a prompt
    pub fn is_user_rejection(&self) -> bool {
        match self {
            ConnectError::Rpc { code, .. } => *code == USER_REJECTED_CODE,
            ConnectError::ConnectionRejected(_) | ConnectError::SignatureRejected(_) => true,
            _ => false,
        }
    }

    /// Map a user rejection during `connect()` into a login error.
    pub(crate) fn into_connect_error(self) -> Self {
        match self {
            ConnectError::Rpc { code, message } if code == USER_REJECTED_CODE => {
                ConnectError::ConnectionRejected(message)
            }
            other => other,
        }
    }

    /// Map a user rejection during signing into an auth error.
    pub(crate) fn into_signing_error(self) -> Self {
        match self {
            ConnectError::Rpc { code, message } if code == USER_REJECTED_CODE => {
                ConnectError::SignatureRejected(message)
            }
            other => other,
        }
    }

    /// Create a verification error from a service status code and body
    pub fn verification(status: StatusCode, message: impl Into<String>) -> Self {
        ConnectError::VerificationFailed(format!("status {}: {}", status.as_u16(), message.into()))
    }
}

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ConnectError::NotConnected.kind(), ErrorKind::Login);
        assert_eq!(ConnectError::TokenExpired.kind(), ErrorKind::Auth);
        assert_eq!(
            ConnectError::ProviderNotFound("metamask".into()).kind(),
            ErrorKind::Initialization
        );
        assert_eq!(
            ConnectError::PluginNotConnected("wallet-services".into()).kind(),
            ErrorKind::Plugin
        );
    }

    #[test]
    fn test_recoverable_only_for_auth() {
        assert!(ConnectError::SignatureRejected("no".into()).is_recoverable());
        assert!(ConnectError::VerificationFailed("bad".into()).is_recoverable());
        assert!(!ConnectError::NotConnected.is_recoverable());
    }

    #[test]
    fn test_user_rejection_mapping() {
        let rpc = ConnectError::Rpc {
            code: USER_REJECTED_CODE,
            message: "User rejected the request".into(),
        };
        assert!(rpc.is_user_rejection());
        assert!(matches!(
            rpc.into_signing_error(),
            ConnectError::SignatureRejected(_)
        ));

        let other = ConnectError::Rpc {
            code: -32603,
            message: "internal".into(),
        };
        assert!(matches!(
            other.into_connect_error(),
            ConnectError::Rpc { code: -32603, .. }
        ));
    }

    #[test]
    fn test_verification_error_creation() {
        let err = ConnectError::verification(StatusCode::UNAUTHORIZED, "bad signature");
        match err {
            ConnectError::VerificationFailed(message) => {
                assert!(message.contains("401"));
                assert!(message.contains("bad signature"));
            }
            _ => panic!("Expected VerificationFailed variant"),
        }
    }
}
