/*
[INPUT]:  Solana private key (base58) and wallet-adapter style requests
[OUTPUT]: Account disclosure and raw Ed25519 message signatures
[POS]:    Provider layer - key-backed Solana wallet provider
[UPDATE]: When supported wallet methods or signature output change
*/

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::debug;

use super::{EVENT_CHANNEL_CAPACITY, Ed25519Signer, Provider, ProviderEvent, RequestArguments};
use crate::error::{ConnectError, Result, USER_REJECTED_CODE};

/// Solana wallet provider backed by a local Ed25519 key
pub struct SolanaWalletProvider {
    signer: Ed25519Signer,
    address: String,
    chain_id: String,
    authorized: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
}

impl SolanaWalletProvider {
    /// Create a new provider from a base58-encoded private key
    /// Supports 64-byte keypair or 32-byte seed
    pub fn new(private_key_base58: &str, chain_id: &str) -> Result<Self> {
        let signer = Ed25519Signer::from_base58(private_key_base58)?;
        Ok(Self::from_signer(signer, chain_id))
    }

    pub fn from_signer(signer: Ed25519Signer, chain_id: &str) -> Self {
        let address = signer.public_key_base58();
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            signer,
            address,
            chain_id: chain_id.to_string(),
            authorized: AtomicBool::new(false),
            events,
        }
    }

    /// Mark the wallet as already trusted by this site.
    pub fn with_existing_session(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn visible_accounts(&self) -> Value {
        if self.authorized.load(Ordering::SeqCst) {
            json!([self.address])
        } else {
            json!([])
        }
    }

    fn sign_message(&self, params: &Value) -> Result<Value> {
        if !self.authorized.load(Ordering::SeqCst) {
            return Err(ConnectError::Rpc {
                code: USER_REJECTED_CODE,
                message: "Wallet not connected".to_string(),
            });
        }

        let message: Vec<u8> = params
            .get("message")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| ConnectError::Rpc {
                code: -32602,
                message: "signMessage expects { message: bytes }".to_string(),
            })?;

        let signature = self.signer.sign(&message);
        Ok(json!({
            "signature": signature.to_bytes().to_vec(),
            "publicKey": self.address,
        }))
    }
}

#[async_trait]
impl Provider for SolanaWalletProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        debug!(method = %args.method, "solana wallet request");
        match args.method.as_str() {
            "getAccounts" => Ok(self.visible_accounts()),
            "connect" | "requestAccounts" => {
                if !self.authorized.swap(true, Ordering::SeqCst) {
                    let _ = self.events.send(ProviderEvent::Connect {
                        chain_id: self.chain_id.clone(),
                    });
                }
                Ok(self.visible_accounts())
            }
            "solana_chainId" => Ok(json!(self.chain_id)),
            "signMessage" => self.sign_message(&args.params),
            "disconnect" => {
                if self.authorized.swap(false, Ordering::SeqCst) {
                    let _ = self.events.send(ProviderEvent::Disconnect);
                }
                Ok(Value::Null)
            }
            other => Err(ConnectError::Rpc {
                code: -32601,
                message: format!("Method {other} not supported"),
            }),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
