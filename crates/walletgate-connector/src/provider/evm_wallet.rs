/*
[INPUT]:  EVM private key (hex string) and JSON-RPC wallet requests
[OUTPUT]: EIP-1193 style responses, personal_sign signatures, chain events
[POS]:    Provider layer - key-backed EVM wallet provider
[UPDATE]: When supported wallet methods or signature encoding change
*/

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::debug;

use super::{EVENT_CHANNEL_CAPACITY, Provider, ProviderEvent, RequestArguments};
use crate::error::{ConnectError, Result, USER_REJECTED_CODE};

const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
const METHOD_NOT_FOUND_CODE: i64 = -32601;
const INVALID_PARAMS_CODE: i64 = -32602;

/// Wallet provider for EVM-compatible chains backed by a local key.
///
/// Behaves like an injected wallet: accounts are hidden until
/// `eth_requestAccounts` is approved.
pub struct EvmWalletProvider {
    signer: PrivateKeySigner,
    address: String,
    chain_id: RwLock<String>,
    known_chains: RwLock<Vec<String>>,
    authorized: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
}

impl EvmWalletProvider {
    /// Create a new provider from a hex-encoded private key
    ///
    /// Supports both "0x"-prefixed and non-prefixed hex strings.
    pub fn new(private_key_hex: &str, chain_id: &str) -> Result<Self> {
        let private_key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());
        let signer = PrivateKeySigner::from_str(private_key_hex)
            .map_err(|e| ConnectError::InvalidParams(format!("Invalid EVM private key: {e}")))?;

        let address = signer.address().to_checksum(None);
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let chain_id = chain_id.to_ascii_lowercase();

        Ok(Self {
            signer,
            address,
            chain_id: RwLock::new(chain_id.clone()),
            known_chains: RwLock::new(vec![chain_id]),
            authorized: AtomicBool::new(false),
            events,
        })
    }

    /// Mark accounts as already approved, as after a previous visit.
    pub fn with_existing_session(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    /// Checksummed wallet address
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain_id(&self) -> String {
        self.chain_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn visible_accounts(&self) -> Value {
        if self.authorized.load(Ordering::SeqCst) {
            json!([self.address])
        } else {
            json!([])
        }
    }

    async fn personal_sign(&self, params: &Value) -> Result<Value> {
        let message_hex = params
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(INVALID_PARAMS_CODE, "personal_sign expects [message, address]"))?;
        let address = params.get(1).and_then(Value::as_str).unwrap_or_default();

        if !self.authorized.load(Ordering::SeqCst) {
            return Err(rpc_error(USER_REJECTED_CODE, "Account access not granted"));
        }
        if !address.eq_ignore_ascii_case(&self.address) {
            return Err(rpc_error(
                INVALID_PARAMS_CODE,
                &format!("Unknown signing address {address}"),
            ));
        }

        let message = decode_hex_message(message_hex);
        let signature = self
            .signer
            .sign_message(&message)
            .await
            .map_err(|e| rpc_error(-32603, &format!("Failed to sign EVM message: {e}")))?;

        // alloy's Signature as_bytes() returns [r, s, v]
        Ok(json!(format!("0x{}", hex::encode(signature.as_bytes()))))
    }

    fn add_chain(&self, params: &Value) -> Result<Value> {
        let chain_id = chain_id_param(params)?;
        let mut known = self
            .known_chains
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !known.contains(&chain_id) {
            known.push(chain_id);
        }
        Ok(Value::Null)
    }

    fn switch_chain(&self, params: &Value) -> Result<Value> {
        let chain_id = chain_id_param(params)?;
        let known = self
            .known_chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&chain_id);
        if !known {
            return Err(rpc_error(
                UNRECOGNIZED_CHAIN_CODE,
                &format!("Unrecognized chain ID {chain_id}"),
            ));
        }

        let changed = {
            let mut current = self.chain_id.write().unwrap_or_else(PoisonError::into_inner);
            let changed = *current != chain_id;
            *current = chain_id.clone();
            changed
        };
        if changed {
            let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
        }
        Ok(Value::Null)
    }
}

#[async_trait]
impl Provider for EvmWalletProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        debug!(method = %args.method, "evm wallet request");
        match args.method.as_str() {
            "eth_chainId" => Ok(json!(self.chain_id())),
            "eth_accounts" => Ok(self.visible_accounts()),
            "eth_requestAccounts" => {
                let was_authorized = self.authorized.swap(true, Ordering::SeqCst);
                if !was_authorized {
                    let _ = self.events.send(ProviderEvent::Connect {
                        chain_id: self.chain_id(),
                    });
                }
                Ok(self.visible_accounts())
            }
            "personal_sign" => self.personal_sign(&args.params).await,
            "wallet_addEthereumChain" => self.add_chain(&args.params),
            "wallet_switchEthereumChain" => self.switch_chain(&args.params),
            "wallet_revokePermissions" => {
                self.authorized.store(false, Ordering::SeqCst);
                Ok(Value::Null)
            }
            other => Err(rpc_error(
                METHOD_NOT_FOUND_CODE,
                &format!("Method {other} not supported"),
            )),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

fn rpc_error(code: i64, message: &str) -> ConnectError {
    ConnectError::Rpc {
        code,
        message: message.to_string(),
    }
}

fn chain_id_param(params: &Value) -> Result<String> {
    params
        .get(0)
        .and_then(|value| value.get("chainId"))
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| rpc_error(INVALID_PARAMS_CODE, "expected [{ chainId }]"))
}

/// personal_sign messages arrive hex encoded; anything else is signed as UTF-8.
fn decode_hex_message(message: &str) -> Vec<u8> {
    message
        .strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec())
}
