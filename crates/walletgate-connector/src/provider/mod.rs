/*
[INPUT]:  JSON-RPC style requests from connectors and the authenticator
[OUTPUT]: Provider trait, request/event types, and concrete providers
[POS]:    Provider layer - minimal contract every wallet provider satisfies
[UPDATE]: When the request contract or provider event set changes
*/

pub mod evm_wallet;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod signer;
pub mod solana_wallet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::ChainNamespace;

pub use evm_wallet::EvmWalletProvider;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockProvider;
pub use signer::Ed25519Signer;
pub use solana_wallet::SolanaWalletProvider;

/// Capacity of provider event channels.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// EIP-1193 style request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Request without params
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, serde_json::Value::Null)
    }
}

/// Events a provider pushes to its subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Connect { chain_id: String },
    Disconnect,
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

/// Contract for wallet/chain providers.
///
/// Everything above this layer is generic over any implementation; the
/// trait is async because every request may wait on a wallet prompt or an
/// RPC round-trip.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Perform a request and return the raw JSON result
    async fn request(&self, args: RequestArguments) -> Result<serde_json::Value>;

    /// Subscribe to provider events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Perform a request and decode the result into `T`.
pub async fn request_as<T: DeserializeOwned>(
    provider: &dyn Provider,
    method: &str,
    params: serde_json::Value,
) -> Result<T> {
    let value = provider
        .request(RequestArguments::new(method, params))
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// Read the accounts currently exposed by the provider.
pub async fn accounts(provider: &dyn Provider, namespace: ChainNamespace) -> Result<Vec<String>> {
    request_as(provider, namespace.accounts_method(), serde_json::Value::Null).await
}

pub(crate) fn same_address(namespace: ChainNamespace, a: &str, b: &str) -> bool {
    match namespace {
        ChainNamespace::Eip155 => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => a.trim() == b.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_arguments_serde() {
        let args = RequestArguments::bare("eth_accounts");
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(value["method"], "eth_accounts");
        assert!(value["params"].is_null());

        let parsed: RequestArguments =
            serde_json::from_value(serde_json::json!({"method": "eth_chainId"})).unwrap();
        assert_eq!(parsed, RequestArguments::bare("eth_chainId"));
    }

    #[test]
    fn test_same_address() {
        assert!(same_address(ChainNamespace::Eip155, "0xABcd", "0xabcd"));
        assert!(!same_address(ChainNamespace::Solana, "AbC", "abc"));
    }
}
