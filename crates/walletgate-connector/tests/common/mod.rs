/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for walletgate-connector tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use tokio::sync::{Notify, broadcast};
use walletgate_connector::{
    Authenticator, ChainConfig, ChainNamespace, ChallengeVerifier, GuardedStore, MockProvider,
    Provider, ProviderEvent, RequestArguments, Result, SdkConfig, TokenStore, VerifyRequest,
    WalletConnector, WalletSource,
};
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// JWT-shaped token carrying `exp`
pub fn mock_jwt_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"ES256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"iss":"walletgate"}}"#));
    format!("{header}.{payload}.signature")
}

/// Token valid for the next hour
pub fn valid_jwt_token() -> String {
    mock_jwt_token(chrono::Utc::now().timestamp() + 3600)
}

pub fn sdk_config() -> SdkConfig {
    let mut config = SdkConfig::new("test-client");
    config.uri = "https://app.example.com".to_string();
    config
}

pub fn evm_chain() -> ChainConfig {
    ChainConfig::new(ChainNamespace::Eip155, "0x1", "https://rpc.example.com")
}

pub fn solana_chain() -> ChainConfig {
    ChainConfig::solana_mainnet("https://api.mainnet-beta.solana.com")
}

/// Verifier that answers every request with a fresh valid token
#[derive(Default)]
pub struct CountingVerifier {
    calls: AtomicUsize,
}

impl CountingVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeVerifier for CountingVerifier {
    async fn verify(&self, _request: &VerifyRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(valid_jwt_token())
    }
}

/// Verifier that holds each request until `release` is called
#[derive(Default)]
pub struct GatedVerifier {
    entered: Notify,
    gate: Notify,
}

impl GatedVerifier {
    /// Wait until a verification request is pending
    pub async fn entered(&self) {
        tokio::time::timeout(Duration::from_secs(1), self.entered.notified())
            .await
            .expect("verifier was never called");
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl ChallengeVerifier for GatedVerifier {
    async fn verify(&self, _request: &VerifyRequest) -> Result<String> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(valid_jwt_token())
    }
}

pub fn authenticator(store: GuardedStore, verifier: Arc<dyn ChallengeVerifier>) -> Arc<Authenticator> {
    let config = sdk_config();
    let tokens = TokenStore::new(store, &config.storage_key_prefix);
    Arc::new(Authenticator::new(config, verifier, tokens).unwrap())
}

/// External connector wired to an injected mock wallet
pub fn mock_connector(
    name: &str,
    chain: ChainConfig,
    address: &str,
    authenticator: Arc<Authenticator>,
) -> (Arc<MockProvider>, WalletConnector) {
    let namespace = chain.chain_namespace;
    let provider = Arc::new(MockProvider::new(namespace, address));
    let source = Arc::new(WalletSource::injected(namespace, provider.clone()));
    let connector = WalletConnector::external(name, chain, source, authenticator);
    (provider, connector)
}

/// Mock wallet whose account prompt stays open until `approve` is called
pub struct GatedProvider {
    namespace: ChainNamespace,
    inner: MockProvider,
    gate: Notify,
}

impl GatedProvider {
    pub fn new(namespace: ChainNamespace, address: &str) -> Self {
        Self {
            namespace,
            inner: MockProvider::new(namespace, address),
            gate: Notify::new(),
        }
    }

    pub fn approve(&self) {
        self.gate.notify_one();
    }

    pub fn mock(&self) -> &MockProvider {
        &self.inner
    }
}

#[async_trait]
impl Provider for GatedProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        if args.method == self.namespace.request_accounts_method() {
            self.gate.notified().await;
        }
        self.inner.request(args).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.inner.subscribe()
    }
}

/// External connector wired to a gated mock wallet
pub fn gated_connector(
    name: &str,
    chain: ChainConfig,
    address: &str,
    authenticator: Arc<Authenticator>,
) -> (Arc<GatedProvider>, WalletConnector) {
    let namespace = chain.chain_namespace;
    let provider = Arc::new(GatedProvider::new(namespace, address));
    let source = Arc::new(WalletSource::injected(namespace, provider.clone()));
    let connector = WalletConnector::external(name, chain, source, authenticator);
    (provider, connector)
}

/// Receive the next event or fail after a second
pub async fn next_event<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
