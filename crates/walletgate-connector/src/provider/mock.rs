/*
[INPUT]:  Scripted accounts, chain id, and rejection switches
[OUTPUT]: Deterministic provider responses plus a request log
[POS]:    Provider layer - test double for connectors and the authenticator
[UPDATE]: When new provider methods need scripting
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::{EVENT_CHANNEL_CAPACITY, Provider, ProviderEvent, RequestArguments};
use crate::error::{ConnectError, Result, USER_REJECTED_CODE};
use crate::types::ChainNamespace;

/// Fixed signature returned for EVM signing requests.
pub const MOCK_EVM_SIGNATURE: &str = "0xmock_signature";

/// Mock provider for testing
#[derive(Debug)]
pub struct MockProvider {
    namespace: ChainNamespace,
    accounts: Mutex<Vec<String>>,
    chain_id: Mutex<String>,
    reject_connect: AtomicBool,
    reject_signatures: AtomicBool,
    calls: Mutex<Vec<RequestArguments>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl MockProvider {
    /// Create a mock exposing a single account
    pub fn new(namespace: ChainNamespace, address: &str) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            namespace,
            accounts: Mutex::new(vec![address.to_string()]),
            chain_id: Mutex::new("0x1".to_string()),
            reject_connect: AtomicBool::new(false),
            reject_signatures: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        *self.accounts.lock().unwrap_or_else(PoisonError::into_inner) = accounts;
    }

    /// Make account requests fail as if the user closed the prompt
    pub fn set_reject_connect(&self, reject: bool) {
        self.reject_connect.store(reject, Ordering::SeqCst);
    }

    /// Make signing requests fail as if the user declined
    pub fn set_reject_signatures(&self, reject: bool) {
        self.reject_signatures.store(reject, Ordering::SeqCst);
    }

    /// Push an event to subscribers
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    /// Every request received so far
    pub fn calls(&self) -> Vec<RequestArguments> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests received for `method`
    pub fn request_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Number of live event subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn accounts(&self) -> Value {
        json!(*self.accounts.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn rejected(message: &str) -> ConnectError {
        ConnectError::Rpc {
            code: USER_REJECTED_CODE,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.clone());

        match args.method.as_str() {
            "eth_accounts" | "getAccounts" => Ok(self.accounts()),
            "eth_requestAccounts" | "connect" => {
                if self.reject_connect.load(Ordering::SeqCst) {
                    return Err(Self::rejected("User rejected the request."));
                }
                Ok(self.accounts())
            }
            "personal_sign" | "signMessage" => {
                if self.reject_signatures.load(Ordering::SeqCst) {
                    return Err(Self::rejected("User denied message signature."));
                }
                match self.namespace {
                    ChainNamespace::Solana => Ok(json!({ "signature": vec![7u8; 64] })),
                    _ => Ok(json!(MOCK_EVM_SIGNATURE)),
                }
            }
            "eth_chainId" | "solana_chainId" => Ok(json!(
                *self.chain_id.lock().unwrap_or_else(PoisonError::into_inner)
            )),
            "wallet_switchEthereumChain" => {
                if let Some(chain_id) = args
                    .params
                    .get(0)
                    .and_then(|value| value.get("chainId"))
                    .and_then(Value::as_str)
                {
                    *self.chain_id.lock().unwrap_or_else(PoisonError::into_inner) =
                        chain_id.to_string();
                }
                Ok(Value::Null)
            }
            _ => Ok(Value::Null),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_records_calls() {
        let provider = MockProvider::new(ChainNamespace::Eip155, "0x1234567890abcdef");

        let accounts = provider
            .request(RequestArguments::bare("eth_accounts"))
            .await
            .unwrap();
        assert_eq!(accounts, json!(["0x1234567890abcdef"]));

        let signature = provider
            .request(RequestArguments::new("personal_sign", json!(["0x00", "0x12"])))
            .await
            .unwrap();
        assert_eq!(signature, json!(MOCK_EVM_SIGNATURE));
        assert_eq!(provider.request_count("personal_sign"), 1);
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_rejections() {
        let provider = MockProvider::new(ChainNamespace::Solana, "So1ana");
        provider.set_reject_signatures(true);
        let err = provider
            .request(RequestArguments::bare("signMessage"))
            .await
            .unwrap_err();
        assert!(err.is_user_rejection());
    }
}
